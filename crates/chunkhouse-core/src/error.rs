//! Core Error Types
//!
//! Errors shared by every layer that touches chunks, label sets, or the
//! request context.
//!
//! ## Error Categories
//!
//! ### Request Errors
//! - `NoTenant`: The request context carries no tenant ID
//! - `Cancelled`: The request context was cancelled mid-operation
//!
//! ### Data Errors
//! - `InvalidChunkId`: A chunk ID string does not follow the
//!   `<fingerprint>/<from>/<through>` shape
//! - `ChunkDecode`: A chunk body failed envelope validation (truncated,
//!   CRC mismatch, malformed metadata JSON)
//!
//! ### Matcher Errors
//! - `InvalidRegex`: A regex matcher pattern failed to compile

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("no tenant ID in request context")]
    NoTenant,

    #[error("request cancelled")]
    Cancelled,

    #[error("invalid chunk ID: {0}")]
    InvalidChunkId(String),

    #[error("chunk decode failed: {0}")]
    ChunkDecode(String),

    #[error("invalid regex matcher: {0}")]
    InvalidRegex(#[from] regex::Error),
}
