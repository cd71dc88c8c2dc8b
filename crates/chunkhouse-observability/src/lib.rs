//! Chunkhouse Observability
//!
//! Prometheus metrics for the chunk store and ruler, plus an axum router
//! exposing them at `/metrics`. Metrics are defined once in a global
//! registry; call [`metrics::init`] during startup (idempotent) before
//! serving the exporter.

pub mod exporter;
pub mod metrics;

pub use exporter::create_metrics_router;
