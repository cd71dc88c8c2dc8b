//! Index Error Types
//!
//! ## Error Categories
//!
//! - `Codec`: A range value failed order-preserving decode (truncated
//!   element, dangling escape, trailing bytes)
//! - `Io`: The KV provider reported an error; propagated verbatim
//! - `RetriesExhausted`: Batch-write retry budget ran out while items were
//!   still unprocessed
//! - `Cancelled`: The request context was cancelled between attempts

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("range value decode failed: {0}")]
    Codec(String),

    #[error("KV store error: {0}")]
    Io(String),

    #[error("batch write retry budget exhausted after {attempts} attempts")]
    RetriesExhausted { attempts: usize },

    #[error("request cancelled")]
    Cancelled,
}
