//! Ruler Error Types
//!
//! ## Error Categories
//!
//! - `ConfigsApi`: The rule-configs HTTP API request failed
//! - `InvalidConfigsUrl`: The configured configs API URL does not parse
//! - `NoWorkers`: The server was configured with zero workers
//! - `Lifecycle`: `run` was called on a server that already ran; the
//!   run/stop lifecycle is single-shot

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("configs API request failed: {0}")]
    ConfigsApi(#[from] reqwest::Error),

    #[error("invalid configs API URL: {0}")]
    InvalidConfigsUrl(String),

    #[error("must have at least 1 worker, got {0}")]
    NoWorkers(usize),

    #[error("ruler server lifecycle is single-shot: {0}")]
    Lifecycle(&'static str),
}
