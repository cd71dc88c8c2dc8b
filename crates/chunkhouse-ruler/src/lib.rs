//! Chunkhouse Ruler
//!
//! Distributed evaluation of per-tenant recording rules. A scheduler polls
//! the configs API and keeps a timed queue of work items; a pool of
//! workers pops them, evaluates each tenant's rules against the query
//! engine, and appends the results via the sample appender.
//!
//! ```text
//! configs API ──poll──▶ Scheduler ──work items──▶ Workers ──▶ QueryEngine
//!                                                    │
//!                                                    └──────▶ SampleAppender
//! ```
//!
//! Fairness: one tenant never occupies two workers at once, and a tenant
//! evaluated at `t` is reconsidered at `t + evaluation_interval` no matter
//! how busy the other tenants keep the pool.

pub mod configs;
pub mod error;
pub mod ruler;
pub mod rules;
pub mod scheduler;
pub mod server;
mod worker;

pub use configs::{ConfigsClient, RulesProvider};
pub use error::{Error, Result};
pub use ruler::Ruler;
pub use rules::{GroupOptions, QueryEngine, Rule, RuleGroup, Sample, SampleAppender};
pub use scheduler::{Scheduler, WorkItem};
pub use server::{RulerConfig, RulerServer};
