//! Chunkhouse Store
//!
//! This crate implements the chunk store - the component responsible for
//! durably writing immutable time-series chunks and answering range +
//! label-matcher queries over them.
//!
//! ## What is the Chunk Store?
//!
//! The store sits between ingesters (which produce chunks) and the query
//! engine (which asks for them). It fuses three pieces that must agree
//! bit-for-bit:
//!
//! 1. **Content store**: chunk bodies in any S3-compatible object store,
//!    keyed `(tenant, chunkID)`
//! 2. **Inverted index**: label → chunk rows in a hash+range KV store,
//!    sharded into time buckets
//! 3. **Bucket planner**: the deterministic mapping from a time range to
//!    the index shards that cover it
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────┐
//! │  Ingesters  │
//! └──────┬──────┘
//!        │ chunks
//!        ▼
//! ┌─────────────────┐     ┌──────────────────┐
//! │   ChunkStore    │────▶│  Indexed KV      │
//! │  put / get      │     │  (hash + range)  │
//! └───┬────────┬────┘     └──────────────────┘
//!     │        │
//!     ▼        ▼
//! ┌───────┐ ┌────────────┐
//! │ Cache │ │ Blob store │
//! └───────┘ └────────────┘
//! ```
//!
//! ## Main Components
//!
//! - [`ChunkStore`]: the put/get orchestration
//! - [`BlobClient`]: timed chunk-body I/O against the object store
//! - [`ChunkCache`]: optional best-effort LRU of encoded bodies

pub mod blob;
pub mod cache;
pub mod error;
pub mod store;

pub use blob::BlobClient;
pub use cache::ChunkCache;
pub use error::{Error, Result};
pub use store::ChunkStore;
