//! Chunkhouse Core Types
//!
//! Shared vocabulary for the chunk store and ruler: chunks and their IDs,
//! label sets and matchers, and the per-request context that carries tenant
//! identity and cancellation.

pub mod chunk;
pub mod context;
pub mod error;
pub mod labels;

pub use chunk::{Chunk, ChunkIdParts};
pub use context::RequestContext;
pub use error::{Error, Result};
pub use labels::{LabelSet, MatchOp, Matcher, METRIC_NAME};
