//! Indexed KV Interface
//!
//! The inverted index lives in an external wide-column KV store with a
//! two-part primary key: a string hash key and a binary range key. The
//! store supports batched writes (which may return a throttled/unprocessed
//! subset) and paginated queries by hash-key equality plus an optional
//! `BEGINS_WITH` condition on the range key.
//!
//! [`KvClient`] abstracts that store; [`MemoryKvClient`] is an ordered
//! in-memory implementation used throughout the tests, with injectable
//! unprocessed-item behavior so retry handling is testable.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::ops::Bound;
use std::sync::Mutex;

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::{Error, Result};

/// Provider limit on items per batch-write call.
pub const MAX_BATCH_SIZE: usize = 25;

/// A single index row to write.
#[derive(Debug, Clone)]
pub struct PutRequest {
    pub hash_key: String,
    pub range_key: Bytes,
    /// Optional inlined chunk metadata JSON.
    pub metadata: Option<Bytes>,
}

/// Writes grouped by table.
pub type WriteBatch = HashMap<String, Vec<PutRequest>>;

/// Result of a batch write.
#[derive(Debug, Default)]
pub struct BatchWriteOutput {
    /// Items the provider throttled; the caller retries these.
    pub unprocessed: WriteBatch,
    /// Capacity units the call consumed.
    pub consumed_capacity: f64,
}

/// A query by hash key, optionally narrowed by a range-key prefix.
#[derive(Debug, Clone)]
pub struct QueryInput {
    pub table: String,
    pub hash_key: String,
    pub range_prefix: Option<Bytes>,
    /// Resume after this range key (pagination token).
    pub exclusive_start: Option<Bytes>,
}

/// One index row returned from a query.
#[derive(Debug, Clone)]
pub struct IndexRow {
    pub range_key: Bytes,
    pub metadata: Option<Bytes>,
}

/// One page of query results.
#[derive(Debug)]
pub struct QueryPage {
    pub items: Vec<IndexRow>,
    /// Pagination token; `None` on the last page.
    pub last_evaluated: Option<Bytes>,
    pub consumed_capacity: f64,
}

/// The external indexed KV store.
#[async_trait]
pub trait KvClient: Send + Sync {
    /// Write up to [`MAX_BATCH_SIZE`] items in one call. Throttled items
    /// come back in `unprocessed`; exceeding the batch limit is an error.
    async fn batch_write(&self, writes: WriteBatch) -> Result<BatchWriteOutput>;

    /// Fetch one page of rows matching the hash key (and range prefix, if
    /// set), ordered by range key.
    async fn query(&self, input: QueryInput) -> Result<QueryPage>;
}

type Table = HashMap<String, BTreeMap<Bytes, Option<Bytes>>>;

/// In-memory [`KvClient`] for tests. Rows are ordered by range key per
/// hash key; tables that were never written read as empty. Unprocessed
/// fractions can be injected to exercise the backoff path.
pub struct MemoryKvClient {
    tables: Mutex<HashMap<String, Table>>,
    page_size: usize,
    unprocessed_fractions: Mutex<VecDeque<f64>>,
}

impl MemoryKvClient {
    pub fn new() -> Self {
        Self {
            tables: Mutex::new(HashMap::new()),
            page_size: 100,
            unprocessed_fractions: Mutex::new(VecDeque::new()),
        }
    }

    pub fn with_page_size(page_size: usize) -> Self {
        Self {
            page_size,
            ..Self::new()
        }
    }

    /// Queue an unprocessed fraction for the next `batch_write` call: that
    /// fraction of the batch (rounded up) is returned unprocessed.
    pub fn inject_unprocessed(&self, fraction: f64) {
        self.unprocessed_fractions.lock().unwrap().push_back(fraction);
    }

    /// Total rows in a table.
    pub fn row_count(&self, table: &str) -> usize {
        let tables = self.tables.lock().unwrap();
        tables
            .get(table)
            .map(|t| t.values().map(BTreeMap::len).sum())
            .unwrap_or(0)
    }
}

#[async_trait]
impl KvClient for MemoryKvClient {
    async fn batch_write(&self, writes: WriteBatch) -> Result<BatchWriteOutput> {
        let total: usize = writes.values().map(Vec::len).sum();
        if total > MAX_BATCH_SIZE {
            return Err(Error::Io(format!(
                "batch of {total} items exceeds limit of {MAX_BATCH_SIZE}"
            )));
        }

        let drop_fraction = self
            .unprocessed_fractions
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(0.0);

        let mut unprocessed: WriteBatch = HashMap::new();
        let mut written = 0usize;
        let mut tables = self.tables.lock().unwrap();
        for (table_name, puts) in writes {
            let keep = ((puts.len() as f64) * (1.0 - drop_fraction)).floor() as usize;
            let table = tables.entry(table_name.clone()).or_default();
            for (i, put) in puts.into_iter().enumerate() {
                if i < keep {
                    table
                        .entry(put.hash_key.clone())
                        .or_default()
                        .insert(put.range_key, put.metadata);
                    written += 1;
                } else {
                    unprocessed.entry(table_name.clone()).or_default().push(put);
                }
            }
        }

        Ok(BatchWriteOutput {
            unprocessed,
            consumed_capacity: written as f64,
        })
    }

    async fn query(&self, input: QueryInput) -> Result<QueryPage> {
        let tables = self.tables.lock().unwrap();
        let rows = tables
            .get(&input.table)
            .and_then(|t| t.get(&input.hash_key));

        let Some(rows) = rows else {
            return Ok(QueryPage {
                items: Vec::new(),
                last_evaluated: None,
                consumed_capacity: 1.0,
            });
        };

        let start = match &input.exclusive_start {
            Some(key) => Bound::Excluded(key.clone()),
            None => Bound::Unbounded,
        };

        let mut items = Vec::new();
        let mut last_evaluated = None;
        for (range_key, metadata) in rows.range((start, Bound::Unbounded)) {
            if let Some(prefix) = &input.range_prefix {
                if !range_key.starts_with(prefix) {
                    // Rows are ordered; once past the prefix there is
                    // nothing left to match.
                    if range_key.as_ref() > prefix.as_ref() {
                        break;
                    }
                    continue;
                }
            }
            if items.len() == self.page_size {
                last_evaluated = items.last().map(|row: &IndexRow| row.range_key.clone());
                break;
            }
            items.push(IndexRow {
                range_key: range_key.clone(),
                metadata: metadata.clone(),
            });
        }

        Ok(QueryPage {
            consumed_capacity: items.len().max(1) as f64,
            items,
            last_evaluated,
        })
    }
}
