//! Chunk Store Error Types
//!
//! ## Error Categories
//!
//! ### Request Errors
//! - `NoTenant`: No tenant ID in the request context
//! - `Cancelled`: The request was cancelled mid-operation
//!
//! ### Query Errors
//! - `NoMetricName`: No `__name__` matcher in the query
//! - `MatcherTypeForMetricName`: The `__name__` matcher is not an equality
//!   matcher
//!
//! ### Data Errors
//! - `IndexDecode`: An index row's range value or inlined metadata is
//!   malformed
//! - `ChunkDecode`: A chunk body failed envelope validation
//!
//! ### I/O Errors
//! - `Blob`: Blob store operation failed (never retried internally;
//!   callers retry `put`/`get` wholesale)
//! - `Kv`: Index store operation failed after internal backoff

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("no tenant ID in request context")]
    NoTenant,

    #[error("query must contain a metric name matcher")]
    NoMetricName,

    #[error("metric name matcher must use equality")]
    MatcherTypeForMetricName,

    #[error("invalid index entry: {0}")]
    IndexDecode(String),

    #[error("blob store error: {0}")]
    Blob(#[from] object_store::Error),

    #[error("KV store error: {0}")]
    Kv(#[source] chunkhouse_index::Error),

    #[error("chunk decode failed: {0}")]
    ChunkDecode(String),

    #[error("request cancelled")]
    Cancelled,
}

impl From<chunkhouse_index::Error> for Error {
    fn from(e: chunkhouse_index::Error) -> Self {
        match e {
            chunkhouse_index::Error::Cancelled => Error::Cancelled,
            chunkhouse_index::Error::Codec(msg) => Error::IndexDecode(msg),
            other => Error::Kv(other),
        }
    }
}
