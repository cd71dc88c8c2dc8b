//! Chunk Store
//!
//! The orchestration layer that fuses the blob store, the inverted index,
//! and the bucket planner into one durable, queryable chunk repository.
//!
//! ## Write Path
//!
//! ```text
//! put(chunks)
//!     ↓
//! blob put × N (parallel, all awaited)   ← first error wins, after all finish
//!     ↓
//! cache store (best effort)
//!     ↓
//! index writes (deterministic)           ← one row per bucket × label
//!     ↓
//! batch write with backoff
//! ```
//!
//! A successful `put` means the blob and every index row are durable. If
//! the blob write fails, no index rows are written; if the index write
//! partially fails, the caller retries `put` - every key is derived from
//! chunk content, so retries are idempotent.
//!
//! ## Read Path
//!
//! ```text
//! get(from, through, matchers)
//!     ↓
//! plan buckets → lookup × bucket (parallel)
//!     ↓              └─ query × matcher (parallel) → intersect
//! union, time-filter by chunk ID
//!     ↓
//! cache split → blob get × miss (parallel) → decode
//!     ↓
//! cache store (best effort), sort by ID
//! ```
//!
//! Per-bucket lookup failures degrade the result rather than fail it: the
//! store logs them and serves what the healthy buckets returned, failing
//! only when every bucket failed. Blob fetch failures always fail the
//! `get` - a silently missing body would be wrong data, not degraded data.

use std::collections::HashMap;
use std::sync::Arc;

use chunkhouse_core::{
    chunk::{dedup_by_id, intersect_sorted, merge_sorted, sort_by_id},
    Chunk, ChunkIdParts, LabelSet, Matcher, RequestContext, METRIC_NAME,
};
use chunkhouse_index::{
    codec, BackoffKvClient, BucketConfig, BucketSpec, IndexRow, KvClient, PutRequest, QueryInput,
    RetryPolicy, WriteBatch,
};
use chunkhouse_observability::metrics::{
    INDEX_ENTRIES_PER_CHUNK, QUERY_CHUNKS, QUERY_INDEX_DROPPED_MATCHES, QUERY_INDEX_LOOKUPS,
    QUERY_INDEX_REQUEST_PAGES,
};
use futures::future::join_all;
use object_store::ObjectStore;
use serde::Deserialize;
use tracing::warn;

use crate::blob::BlobClient;
use crate::cache::ChunkCache;
use crate::error::{Error, Result};

/// Multi-tenant chunk store over a blob store and an indexed KV store.
pub struct ChunkStore {
    cfg: BucketConfig,
    blob: BlobClient,
    kv: BackoffKvClient,
    cache: Option<Arc<ChunkCache>>,
}

impl ChunkStore {
    pub fn new(
        cfg: BucketConfig,
        object_store: Arc<dyn ObjectStore>,
        kv: Arc<dyn KvClient>,
        cache: Option<Arc<ChunkCache>>,
    ) -> Self {
        Self {
            cfg,
            blob: BlobClient::new(object_store),
            kv: BackoffKvClient::new(kv),
            cache,
        }
    }

    /// Override the index retry policy (tests use tighter budgets).
    pub fn with_retry_policy(
        cfg: BucketConfig,
        object_store: Arc<dyn ObjectStore>,
        kv: Arc<dyn KvClient>,
        cache: Option<Arc<ChunkCache>>,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            cfg,
            blob: BlobClient::new(object_store),
            kv: BackoffKvClient::with_policy(kv, policy),
            cache,
        }
    }

    // ------------------------------------------------------------------
    // Write path
    // ------------------------------------------------------------------

    /// Store chunks durably: bodies to the blob store, index rows to the
    /// KV store.
    pub async fn put(&self, ctx: &RequestContext, chunks: &[Chunk]) -> Result<()> {
        let tenant = ctx.tenant().map_err(|_| Error::NoTenant)?.to_string();

        self.put_chunks(ctx, &tenant, chunks).await?;
        self.update_index(ctx, &tenant, chunks).await
    }

    /// Write all chunk bodies in parallel. Every write runs to completion;
    /// the first error (in input order) is returned afterwards.
    async fn put_chunks(&self, ctx: &RequestContext, tenant: &str, chunks: &[Chunk]) -> Result<()> {
        let results = join_all(
            chunks
                .iter()
                .map(|chunk| self.put_chunk(ctx, tenant, chunk)),
        )
        .await;

        results.into_iter().find(|r| r.is_err()).unwrap_or(Ok(()))
    }

    async fn put_chunk(&self, ctx: &RequestContext, tenant: &str, chunk: &Chunk) -> Result<()> {
        let body = chunk
            .to_bytes()
            .map_err(|e| Error::ChunkDecode(e.to_string()))?;

        self.blob
            .put_chunk(ctx, tenant, &chunk.id, body.clone())
            .await?;

        if let Some(cache) = &self.cache {
            cache.put(tenant, &chunk.id, body).await;
        }
        Ok(())
    }

    async fn update_index(
        &self,
        ctx: &RequestContext,
        tenant: &str,
        chunks: &[Chunk],
    ) -> Result<()> {
        let writes = self.index_writes(tenant, chunks)?;
        self.kv.batch_write(ctx, writes).await?;
        Ok(())
    }

    /// One index row per overlapping bucket per non-name label, derived
    /// entirely from chunk content so retries produce identical rows.
    fn index_writes(&self, tenant: &str, chunks: &[Chunk]) -> Result<WriteBatch> {
        let mut writes: WriteBatch = HashMap::new();
        for chunk in chunks {
            let metric_name = chunk.metric.metric_name().ok_or(Error::NoMetricName)?;

            let mut entries = 0;
            for bucket in self.cfg.plan_buckets(chunk.from, chunk.through) {
                let hash_key = hash_value(tenant, &bucket.bucket_id, metric_name);
                for (label, value) in chunk.metric.iter() {
                    if label == METRIC_NAME {
                        continue;
                    }
                    entries += 1;
                    writes
                        .entry(bucket.table.clone())
                        .or_default()
                        .push(PutRequest {
                            hash_key: hash_key.clone(),
                            range_key: codec::encode(&[label, value, &chunk.id]),
                            metadata: None,
                        });
                }
            }
            INDEX_ENTRIES_PER_CHUNK.observe(entries as f64);
        }
        Ok(writes)
    }

    // ------------------------------------------------------------------
    // Read path
    // ------------------------------------------------------------------

    /// Fetch all chunks overlapping `[from, through]` (milliseconds) whose
    /// label sets satisfy every matcher. One matcher must bind `__name__`
    /// with equality. Results are sorted by chunk ID.
    pub async fn get(
        &self,
        ctx: &RequestContext,
        from: i64,
        through: i64,
        matchers: &[Matcher],
    ) -> Result<Vec<Chunk>> {
        let tenant = ctx.tenant().map_err(|_| Error::NoTenant)?.to_string();

        let stubs = self
            .lookup_chunks(ctx, &tenant, from, through, matchers)
            .await?;
        QUERY_CHUNKS.observe(stubs.len() as f64);

        let (from_cache, missing) = match &self.cache {
            Some(cache) => cache.fetch_chunks(&tenant, stubs).await,
            None => (Vec::new(), stubs),
        };

        let fetched = self.fetch_chunk_data(ctx, &tenant, missing).await?;

        if let Some(cache) = &self.cache {
            for chunk in &fetched {
                cache.store_chunk(&tenant, chunk).await;
            }
        }

        let mut chunks = from_cache;
        chunks.extend(fetched);
        sort_by_id(&mut chunks);
        Ok(chunks)
    }

    /// Resolve matchers to chunk stubs via the index: one parallel lookup
    /// per bucket, merged by ID, then time-filtered on the bounds embedded
    /// in each chunk ID.
    async fn lookup_chunks(
        &self,
        ctx: &RequestContext,
        tenant: &str,
        from: i64,
        through: i64,
        matchers: &[Matcher],
    ) -> Result<Vec<Chunk>> {
        let (metric_name, matchers) = extract_metric_name(matchers)?;
        let buckets = self.cfg.plan_buckets(from, through);

        let results = join_all(buckets.iter().map(|bucket| {
            self.lookup_chunks_for(ctx, tenant, bucket, &metric_name, &matchers)
        }))
        .await;

        let mut chunks: Vec<Chunk> = Vec::new();
        let mut last_err = None;
        let mut total_lookups = 0usize;
        for (bucket, result) in buckets.iter().zip(results) {
            match result {
                Ok((incoming, lookups)) => {
                    total_lookups += lookups;
                    chunks = merge_sorted(chunks, incoming);
                }
                Err(e) => {
                    warn!(
                        table = %bucket.table,
                        bucket = %bucket.bucket_id,
                        error = %e,
                        "Index lookup failed for bucket"
                    );
                    last_err = Some(e);
                }
            }
        }
        QUERY_INDEX_LOOKUPS.observe(total_lookups as f64);

        let mut filtered = Vec::with_capacity(chunks.len());
        for chunk in chunks {
            let parts =
                ChunkIdParts::parse(&chunk.id).map_err(|e| Error::IndexDecode(e.to_string()))?;
            if parts.through < from || parts.from > through {
                continue;
            }
            filtered.push(chunk);
        }

        // Serve partial results when at least one bucket answered; fail
        // only when the lookup produced nothing but errors.
        match last_err {
            Some(e) if filtered.is_empty() => Err(e),
            _ => Ok(filtered),
        }
    }

    /// Look up one bucket. With no matchers beyond the metric name, a
    /// single hash-only query suffices; otherwise one range-prefix query
    /// per matcher, intersected. Returns the stubs plus the number of
    /// index lookups issued.
    async fn lookup_chunks_for(
        &self,
        ctx: &RequestContext,
        tenant: &str,
        bucket: &BucketSpec,
        metric_name: &str,
        matchers: &[Matcher],
    ) -> Result<(Vec<Chunk>, usize)> {
        if matchers.is_empty() {
            let chunks = self
                .lookup_by_metric_name(ctx, tenant, bucket, metric_name)
                .await?;
            return Ok((chunks, 1));
        }

        let results = join_all(matchers.iter().map(|matcher| {
            self.lookup_by_matcher(ctx, tenant, bucket, metric_name, matcher)
        }))
        .await;

        // A failed matcher would make the intersection spuriously large,
        // so any matcher failure fails the bucket.
        let mut sets = Vec::with_capacity(results.len());
        for result in results {
            sets.push(result?);
        }
        Ok((intersect_sorted(sets), matchers.len()))
    }

    async fn lookup_by_metric_name(
        &self,
        ctx: &RequestContext,
        tenant: &str,
        bucket: &BucketSpec,
        metric_name: &str,
    ) -> Result<Vec<Chunk>> {
        let input = QueryInput {
            table: bucket.table.clone(),
            hash_key: hash_value(tenant, &bucket.bucket_id, metric_name),
            range_prefix: None,
            exclusive_start: None,
        };
        self.run_index_query(ctx, input, None).await
    }

    async fn lookup_by_matcher(
        &self,
        ctx: &RequestContext,
        tenant: &str,
        bucket: &BucketSpec,
        metric_name: &str,
        matcher: &Matcher,
    ) -> Result<Vec<Chunk>> {
        // Equality matchers narrow the scan to one value; the rest scan the
        // whole label and filter in memory.
        let range_prefix = if matcher.is_equality() {
            codec::encode(&[&matcher.name, &matcher.value])
        } else {
            codec::encode(&[&matcher.name])
        };

        let input = QueryInput {
            table: bucket.table.clone(),
            hash_key: hash_value(tenant, &bucket.bucket_id, metric_name),
            range_prefix: Some(range_prefix),
            exclusive_start: None,
        };
        self.run_index_query(ctx, input, Some(matcher)).await
    }

    /// Drive one paginated index query, decoding rows into chunk stubs and
    /// applying the matcher in memory. Returns stubs sorted by ID with
    /// duplicates removed.
    async fn run_index_query(
        &self,
        ctx: &RequestContext,
        input: QueryInput,
        matcher: Option<&Matcher>,
    ) -> Result<Vec<Chunk>> {
        let mut chunks = Vec::new();
        let mut pages = 0usize;
        let mut dropped = 0usize;
        let mut processing_error: Option<Error> = None;

        self.kv
            .query_pages(ctx, input, |page, _last| {
                pages += 1;
                match process_rows(&page.items, matcher, &mut chunks) {
                    Ok(d) => {
                        dropped += d;
                        true
                    }
                    Err(e) => {
                        processing_error = Some(e);
                        false
                    }
                }
            })
            .await?;

        QUERY_INDEX_REQUEST_PAGES.observe(pages as f64);
        QUERY_INDEX_DROPPED_MATCHES.observe(dropped as f64);

        if let Some(e) = processing_error {
            return Err(e);
        }

        sort_by_id(&mut chunks);
        dedup_by_id(&mut chunks);
        Ok(chunks)
    }

    /// Fetch and decode all missing chunk bodies in parallel. Every fetch
    /// runs to completion; any failure fails the whole read.
    async fn fetch_chunk_data(
        &self,
        ctx: &RequestContext,
        tenant: &str,
        stubs: Vec<Chunk>,
    ) -> Result<Vec<Chunk>> {
        let results = join_all(stubs.iter().map(|stub| async move {
            let body = self.blob.get_chunk(ctx, tenant, &stub.id).await?;
            let chunk = Chunk::from_bytes(&body).map_err(|e| Error::ChunkDecode(e.to_string()))?;
            if chunk.id != stub.id {
                return Err(Error::ChunkDecode(format!(
                    "body ID {} does not match object key {}",
                    chunk.id, stub.id
                )));
            }
            Ok(chunk)
        }))
        .await;

        let mut chunks = Vec::with_capacity(results.len());
        for result in results {
            chunks.push(result?);
        }
        Ok(chunks)
    }
}

fn hash_value(tenant: &str, bucket_id: &str, metric_name: &str) -> String {
    format!("{tenant}:{bucket_id}:{metric_name}")
}

/// Pull the required equality `__name__` matcher out of the matcher list.
fn extract_metric_name(matchers: &[Matcher]) -> Result<(String, Vec<Matcher>)> {
    let Some(position) = matchers.iter().position(|m| m.name == METRIC_NAME) else {
        return Err(Error::NoMetricName);
    };
    if !matchers[position].is_equality() {
        return Err(Error::MatcherTypeForMetricName);
    }

    let metric_name = matchers[position].value.clone();
    let rest = matchers
        .iter()
        .enumerate()
        .filter(|(i, _)| *i != position)
        .map(|(_, m)| m.clone())
        .collect();
    Ok((metric_name, rest))
}

/// Inlined chunk metadata carried on an index row.
#[derive(Deserialize)]
struct InlineChunkMeta {
    metric: LabelSet,
    from: i64,
    through: i64,
}

/// Decode index rows into chunk stubs, applying the matcher in memory and
/// counting dropped rows.
fn process_rows(
    rows: &[IndexRow],
    matcher: Option<&Matcher>,
    out: &mut Vec<Chunk>,
) -> Result<usize> {
    let mut dropped = 0;
    for row in rows {
        let mut fields = codec::decode(&row.range_key, 3)
            .map_err(|e| Error::IndexDecode(e.to_string()))?
            .into_iter();
        let (Some(label), Some(value), Some(chunk_id)) =
            (fields.next(), fields.next(), fields.next())
        else {
            return Err(Error::IndexDecode(
                "range value must carry three fields".to_string(),
            ));
        };

        let mut chunk = Chunk::stub(chunk_id);
        if let Some(raw) = &row.metadata {
            let meta: InlineChunkMeta = serde_json::from_slice(raw)
                .map_err(|e| Error::IndexDecode(format!("inlined metadata: {e}")))?;
            chunk.metric = meta.metric;
            chunk.from = meta.from;
            chunk.through = meta.through;
            chunk.metadata_in_index = true;
        }

        if let Some(matcher) = matcher {
            if label != matcher.name || !matcher.matches(&value) {
                dropped += 1;
                continue;
            }
        }
        out.push(chunk);
    }
    Ok(dropped)
}
