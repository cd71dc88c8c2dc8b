use lazy_static::lazy_static;
use prometheus::{
    Counter, Histogram, HistogramOpts, HistogramVec, IntCounter, Opts, Registry,
};
use std::sync::Once;

static INIT: Once = Once::new();

lazy_static! {
    /// Global Prometheus metrics registry
    pub static ref REGISTRY: Registry = Registry::new();

    // ============================================================================
    // Chunk Store Metrics
    // ============================================================================

    /// Index entries written per chunk
    pub static ref INDEX_ENTRIES_PER_CHUNK: Histogram = Histogram::with_opts(
        HistogramOpts::new(
            "chunkhouse_chunk_store_index_entries_per_chunk",
            "Number of index entries written per chunk",
        )
        .buckets(prometheus::exponential_buckets(1.0, 2.0, 5).unwrap())
    ).expect("metric can be created");

    /// Blob store request latency, by operation and status code
    pub static ref S3_REQUEST_DURATION: HistogramVec = HistogramVec::new(
        HistogramOpts::new(
            "chunkhouse_s3_request_duration_seconds",
            "Time spent doing blob store requests",
        )
        .buckets(vec![0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.0]),
        &["operation", "status_code"]
    ).expect("metric can be created");

    // ============================================================================
    // Query Metrics
    // ============================================================================

    /// Chunks loaded per query
    pub static ref QUERY_CHUNKS: Histogram = Histogram::with_opts(
        HistogramOpts::new("chunkhouse_query_chunks", "Number of chunks loaded per query")
            .buckets(prometheus::exponential_buckets(1.0, 4.0, 5).unwrap())
    ).expect("metric can be created");

    /// Index lookups issued per query
    pub static ref QUERY_INDEX_LOOKUPS: Histogram = Histogram::with_opts(
        HistogramOpts::new(
            "chunkhouse_query_index_lookups",
            "Number of index lookups per query",
        )
        .buckets(prometheus::exponential_buckets(1.0, 4.0, 5).unwrap())
    ).expect("metric can be created");

    /// Pages fetched per index query
    pub static ref QUERY_INDEX_REQUEST_PAGES: Histogram = Histogram::with_opts(
        HistogramOpts::new(
            "chunkhouse_query_index_request_pages",
            "Number of pages per index query",
        )
        .buckets(prometheus::exponential_buckets(1.0, 2.0, 5).unwrap())
    ).expect("metric can be created");

    /// Rows fetched from the index but dropped for not matching, per query
    pub static ref QUERY_INDEX_DROPPED_MATCHES: Histogram = Histogram::with_opts(
        HistogramOpts::new(
            "chunkhouse_query_index_dropped_matches_total",
            "Chunk IDs fetched from the index but dropped for not matching, per query",
        )
        .buckets(prometheus::exponential_buckets(1.0, 2.0, 5).unwrap())
    ).expect("metric can be created");

    // ============================================================================
    // Index Write Metrics
    // ============================================================================

    /// Capacity units consumed by index operations
    pub static ref INDEX_CONSUMED_CAPACITY: Counter = Counter::with_opts(
        Opts::new(
            "chunkhouse_index_consumed_capacity_total",
            "Capacity units consumed by index operations",
        )
    ).expect("metric can be created");

    /// Batch-write retries caused by unprocessed items
    pub static ref INDEX_BATCH_WRITE_RETRIES: IntCounter = IntCounter::new(
        "chunkhouse_index_batch_write_retries_total",
        "Index batch-write retries caused by unprocessed items",
    ).expect("metric can be created");

    // ============================================================================
    // Chunk Cache Metrics
    // ============================================================================

    /// Cache hits
    pub static ref CACHE_HITS_TOTAL: IntCounter = IntCounter::new(
        "chunkhouse_chunk_cache_hits_total",
        "Total chunk cache hits",
    ).expect("metric can be created");

    /// Cache misses
    pub static ref CACHE_MISSES_TOTAL: IntCounter = IntCounter::new(
        "chunkhouse_chunk_cache_misses_total",
        "Total chunk cache misses",
    ).expect("metric can be created");

    // ============================================================================
    // Ruler Metrics
    // ============================================================================

    /// Duration of rule-group evaluations
    pub static ref GROUP_EVALUATION_DURATION: Histogram = Histogram::with_opts(
        HistogramOpts::new(
            "chunkhouse_group_evaluation_duration_seconds",
            "The duration for a rule group to execute",
        )
    ).expect("metric can be created");

    /// Rules processed
    pub static ref RULES_PROCESSED: IntCounter = IntCounter::new(
        "chunkhouse_rules_processed_total",
        "How many rules have been processed",
    ).expect("metric can be created");
}

/// Initialize metrics registry
/// Can be called multiple times safely (idempotent)
pub fn init() {
    INIT.call_once(|| {
        REGISTRY
            .register(Box::new(INDEX_ENTRIES_PER_CHUNK.clone()))
            .expect("index_entries_per_chunk can be registered");
        REGISTRY
            .register(Box::new(S3_REQUEST_DURATION.clone()))
            .expect("s3_request_duration can be registered");
        REGISTRY
            .register(Box::new(QUERY_CHUNKS.clone()))
            .expect("query_chunks can be registered");
        REGISTRY
            .register(Box::new(QUERY_INDEX_LOOKUPS.clone()))
            .expect("query_index_lookups can be registered");
        REGISTRY
            .register(Box::new(QUERY_INDEX_REQUEST_PAGES.clone()))
            .expect("query_index_request_pages can be registered");
        REGISTRY
            .register(Box::new(QUERY_INDEX_DROPPED_MATCHES.clone()))
            .expect("query_index_dropped_matches can be registered");
        REGISTRY
            .register(Box::new(INDEX_CONSUMED_CAPACITY.clone()))
            .expect("index_consumed_capacity can be registered");
        REGISTRY
            .register(Box::new(INDEX_BATCH_WRITE_RETRIES.clone()))
            .expect("index_batch_write_retries can be registered");
        REGISTRY
            .register(Box::new(CACHE_HITS_TOTAL.clone()))
            .expect("cache_hits_total can be registered");
        REGISTRY
            .register(Box::new(CACHE_MISSES_TOTAL.clone()))
            .expect("cache_misses_total can be registered");
        REGISTRY
            .register(Box::new(GROUP_EVALUATION_DURATION.clone()))
            .expect("group_evaluation_duration can be registered");
        REGISTRY
            .register(Box::new(RULES_PROCESSED.clone()))
            .expect("rules_processed can be registered");
    });
}
