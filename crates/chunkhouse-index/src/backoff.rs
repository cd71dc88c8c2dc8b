//! Backoff KV Client
//!
//! Wraps a [`KvClient`] with the two behaviors every index caller needs:
//!
//! - **Batched writes with retry.** Writes are split into provider-sized
//!   batches. When the provider throttles part of a batch (unprocessed
//!   items), the unprocessed subset is retried with jittered exponential
//!   backoff - 100ms initial, doubling, capped at 50s - until it drains or
//!   the retry budget runs out. Non-retriable provider errors propagate
//!   immediately.
//! - **Driven pagination.** `query_pages` feeds each page to a visitor and
//!   follows continuation tokens until the visitor declines or the last
//!   page is reached.
//!
//! Consumed capacity and retry counts are reported to metrics.
//! Cancellation is observed before every provider call and during every
//! backoff sleep.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chunkhouse_core::RequestContext;
use chunkhouse_observability::metrics::{INDEX_BATCH_WRITE_RETRIES, INDEX_CONSUMED_CAPACITY};
use rand::Rng;
use tokio::time::sleep;
use tracing::warn;

use crate::error::{Error, Result};
use crate::kv::{KvClient, PutRequest, QueryInput, QueryPage, WriteBatch, MAX_BATCH_SIZE};

/// Retry policy for throttled batch writes.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum number of retry attempts per batch
    pub max_retries: usize,

    /// Initial backoff duration
    pub initial_backoff: Duration,

    /// Maximum backoff duration
    pub max_backoff: Duration,

    /// Backoff multiplier for exponential growth
    pub backoff_multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 15,
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_secs(50),
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    /// Backoff for a given attempt: `min(initial * multiplier^attempt, max)`.
    pub fn backoff(&self, attempt: usize) -> Duration {
        let backoff_ms = self.initial_backoff.as_millis() as f64
            * self.backoff_multiplier.powi(attempt as i32);
        Duration::from_millis(backoff_ms as u64).min(self.max_backoff)
    }

    /// Backoff with ±25% jitter to avoid thundering-herd retries.
    pub fn jittered_backoff(&self, attempt: usize) -> Duration {
        let base = self.backoff(attempt);
        let jitter = 0.75 + (rand::thread_rng().gen::<f64>() * 0.5); // 0.75-1.25x
        Duration::from_millis((base.as_millis() as f64 * jitter) as u64)
    }
}

/// [`KvClient`] wrapper adding batch chunking, throttle retries, and
/// pagination driving.
pub struct BackoffKvClient {
    kv: Arc<dyn KvClient>,
    policy: RetryPolicy,
}

impl BackoffKvClient {
    pub fn new(kv: Arc<dyn KvClient>) -> Self {
        Self::with_policy(kv, RetryPolicy::default())
    }

    pub fn with_policy(kv: Arc<dyn KvClient>, policy: RetryPolicy) -> Self {
        Self { kv, policy }
    }

    /// Write all items, splitting into provider-sized batches and retrying
    /// throttled subsets until drained or the retry budget is exhausted.
    pub async fn batch_write(&self, ctx: &RequestContext, writes: WriteBatch) -> Result<()> {
        let mut outstanding = flatten(writes);

        while !outstanding.is_empty() {
            let rest = outstanding.split_off(outstanding.len().min(MAX_BATCH_SIZE));
            let mut batch = outstanding;
            outstanding = rest;

            let mut attempt = 0;
            loop {
                ctx.ensure_active().map_err(|_| Error::Cancelled)?;

                let out = self.kv.batch_write(group(batch.clone())).await?;
                INDEX_CONSUMED_CAPACITY.inc_by(out.consumed_capacity);

                let unprocessed = flatten(out.unprocessed);
                if unprocessed.is_empty() {
                    break;
                }
                if attempt >= self.policy.max_retries {
                    return Err(Error::RetriesExhausted {
                        attempts: attempt + 1,
                    });
                }

                let delay = self.policy.jittered_backoff(attempt);
                warn!(
                    unprocessed = unprocessed.len(),
                    attempt = attempt + 1,
                    backoff_ms = delay.as_millis() as u64,
                    "Index batch write throttled, backing off"
                );
                INDEX_BATCH_WRITE_RETRIES.inc();

                tokio::select! {
                    _ = sleep(delay) => {}
                    _ = ctx.cancelled() => return Err(Error::Cancelled),
                }

                batch = unprocessed;
                attempt += 1;
            }
        }

        Ok(())
    }

    /// Drive a paginated query. `visit(page, last_page)` returns whether to
    /// continue; pagination stops on a `false` or once no continuation
    /// token remains. Provider errors propagate verbatim.
    pub async fn query_pages<F>(
        &self,
        ctx: &RequestContext,
        mut input: QueryInput,
        mut visit: F,
    ) -> Result<()>
    where
        F: FnMut(&QueryPage, bool) -> bool,
    {
        loop {
            ctx.ensure_active().map_err(|_| Error::Cancelled)?;

            let page = self.kv.query(input.clone()).await?;
            INDEX_CONSUMED_CAPACITY.inc_by(page.consumed_capacity);

            let last_page = page.last_evaluated.is_none();
            let proceed = visit(&page, last_page);
            if last_page || !proceed {
                return Ok(());
            }
            input.exclusive_start = page.last_evaluated;
        }
    }
}

fn flatten(writes: WriteBatch) -> Vec<(String, PutRequest)> {
    let mut flat: Vec<(String, PutRequest)> = writes
        .into_iter()
        .flat_map(|(table, puts)| puts.into_iter().map(move |p| (table.clone(), p)))
        .collect();
    // HashMap iteration order is arbitrary; keep batches deterministic.
    flat.sort_by(|(ta, pa), (tb, pb)| (ta, &pa.hash_key, &pa.range_key).cmp(&(tb, &pb.hash_key, &pb.range_key)));
    flat
}

fn group(items: Vec<(String, PutRequest)>) -> WriteBatch {
    let mut grouped: WriteBatch = HashMap::new();
    for (table, put) in items {
        grouped.entry(table).or_default().push(put);
    }
    grouped
}
