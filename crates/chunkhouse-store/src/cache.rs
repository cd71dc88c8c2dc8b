//! Chunk Cache
//!
//! Optional read-through/write-through cache of encoded chunk bodies,
//! keyed by `(tenant, chunkID)`. Entries are immutable (chunks never
//! change), so there is no invalidation - only byte-budgeted LRU eviction.
//!
//! The cache is strictly best-effort: the store logs and swallows anything
//! that goes wrong here, and a hit that fails to decode is demoted to a
//! miss. Losing the cache can never lose data, only latency.

use std::num::NonZeroUsize;
use std::sync::Arc;

use bytes::Bytes;
use chunkhouse_core::Chunk;
use chunkhouse_observability::metrics::{CACHE_HITS_TOTAL, CACHE_MISSES_TOTAL};
use lru::LruCache;
use tokio::sync::Mutex;
use tracing::warn;

/// Tracked LRU entries; the byte budget is the real constraint.
const MAX_ENTRIES: usize = 10_000;

/// In-memory LRU cache of encoded chunk bodies.
pub struct ChunkCache {
    max_size_bytes: u64,
    inner: Arc<Mutex<CacheInner>>,
}

struct CacheInner {
    current_size: u64,
    lru: LruCache<String, Bytes>,
}

impl ChunkCache {
    pub fn new(max_size_bytes: u64) -> Self {
        let capacity = NonZeroUsize::new(MAX_ENTRIES).unwrap();
        Self {
            max_size_bytes,
            inner: Arc::new(Mutex::new(CacheInner {
                current_size: 0,
                lru: LruCache::new(capacity),
            })),
        }
    }

    fn cache_key(tenant: &str, chunk_id: &str) -> String {
        format!("{tenant}/{chunk_id}")
    }

    /// Get an encoded chunk body. Updates LRU order on hit.
    pub async fn get(&self, tenant: &str, chunk_id: &str) -> Option<Bytes> {
        let mut inner = self.inner.lock().await;
        match inner.lru.get(&Self::cache_key(tenant, chunk_id)) {
            Some(body) => {
                CACHE_HITS_TOTAL.inc();
                Some(body.clone())
            }
            None => {
                CACHE_MISSES_TOTAL.inc();
                None
            }
        }
    }

    /// Insert an encoded chunk body, evicting LRU entries to stay within
    /// the byte budget. Bodies larger than the whole budget are skipped.
    pub async fn put(&self, tenant: &str, chunk_id: &str, body: Bytes) {
        let size = body.len() as u64;
        if size > self.max_size_bytes {
            warn!(
                chunk_id = %chunk_id,
                size,
                max_size = self.max_size_bytes,
                "Cannot cache: chunk larger than max cache size"
            );
            return;
        }

        let mut inner = self.inner.lock().await;
        let key = Self::cache_key(tenant, chunk_id);

        if let Some(old) = inner.lru.pop(&key) {
            inner.current_size -= old.len() as u64;
        }
        while inner.current_size + size > self.max_size_bytes {
            match inner.lru.pop_lru() {
                Some((_, evicted)) => inner.current_size -= evicted.len() as u64,
                None => break,
            }
        }

        inner.current_size += size;
        inner.lru.put(key, body);
    }

    /// Encode and cache a chunk. Encoding failures are logged, not
    /// returned; the cache never fails its caller.
    pub async fn store_chunk(&self, tenant: &str, chunk: &Chunk) {
        match chunk.to_bytes() {
            Ok(body) => self.put(tenant, &chunk.id, body).await,
            Err(e) => warn!(
                chunk_id = %chunk.id,
                error = %e,
                "Could not encode chunk for cache"
            ),
        }
    }

    /// Split stubs into decoded cache hits and remaining misses, both
    /// preserving input order.
    pub async fn fetch_chunks(&self, tenant: &str, stubs: Vec<Chunk>) -> (Vec<Chunk>, Vec<Chunk>) {
        let mut hits = Vec::new();
        let mut misses = Vec::new();
        for stub in stubs {
            match self.get(tenant, &stub.id).await {
                Some(body) => match Chunk::from_bytes(&body) {
                    Ok(chunk) => hits.push(chunk),
                    Err(e) => {
                        warn!(
                            chunk_id = %stub.id,
                            error = %e,
                            "Discarding undecodable cached chunk"
                        );
                        misses.push(stub);
                    }
                },
                None => misses.push(stub),
            }
        }
        (hits, misses)
    }

    /// Number of cached entries.
    pub async fn len(&self) -> usize {
        self.inner.lock().await.lru.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}
