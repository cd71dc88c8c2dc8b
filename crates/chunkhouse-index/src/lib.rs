//! Chunkhouse Index Layer
//!
//! Everything between the chunk store and the external KV store that holds
//! the inverted index:
//!
//! - [`codec`]: order-preserving tuple encoding for range keys
//! - [`bucket`]: maps time ranges to `(table, bucketID)` shards
//! - [`kv`]: the `KvClient` trait plus an in-memory implementation
//! - [`backoff`]: batch chunking, throttle retries, pagination driving

pub mod backoff;
pub mod bucket;
pub mod codec;
pub mod error;
pub mod kv;

pub use backoff::{BackoffKvClient, RetryPolicy};
pub use bucket::{BucketConfig, BucketSpec};
pub use error::{Error, Result};
pub use kv::{
    BatchWriteOutput, IndexRow, KvClient, MemoryKvClient, PutRequest, QueryInput, QueryPage,
    WriteBatch, MAX_BATCH_SIZE,
};
