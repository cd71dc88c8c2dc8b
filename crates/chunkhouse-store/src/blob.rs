//! Blob Client
//!
//! Timed `put`/`get` of chunk bodies against any
//! [`object_store::ObjectStore`]. Keys are `"<tenant>/<chunkID>"`, so every
//! object is namespaced by tenant. Each request is observed into the
//! request-duration histogram labelled `(operation, status_code)`.
//!
//! Blob operations are not retried here; callers retry whole store
//! operations, which are idempotent.

use std::sync::Arc;
use std::time::Instant;

use bytes::Bytes;
use chunkhouse_core::RequestContext;
use chunkhouse_observability::metrics::S3_REQUEST_DURATION;
use object_store::{path::Path, ObjectStore};

use crate::error::{Error, Result};

pub struct BlobClient {
    store: Arc<dyn ObjectStore>,
}

impl BlobClient {
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self { store }
    }

    /// The object key for a chunk.
    pub fn chunk_key(tenant: &str, chunk_id: &str) -> Path {
        Path::from(format!("{tenant}/{chunk_id}"))
    }

    /// Upload a chunk body.
    pub async fn put_chunk(
        &self,
        ctx: &RequestContext,
        tenant: &str,
        chunk_id: &str,
        body: Bytes,
    ) -> Result<()> {
        ctx.ensure_active().map_err(|_| Error::Cancelled)?;

        let location = Self::chunk_key(tenant, chunk_id);
        let start = Instant::now();
        let result = self.store.put(&location, body).await;
        observe("put", &result.as_ref().map(|_| ()), start);

        result?;
        Ok(())
    }

    /// Download a chunk body.
    pub async fn get_chunk(
        &self,
        ctx: &RequestContext,
        tenant: &str,
        chunk_id: &str,
    ) -> Result<Bytes> {
        ctx.ensure_active().map_err(|_| Error::Cancelled)?;

        let location = Self::chunk_key(tenant, chunk_id);
        let start = Instant::now();
        let result = match self.store.get(&location).await {
            Ok(response) => response.bytes().await,
            Err(e) => Err(e),
        };
        observe("get", &result.as_ref().map(|_| ()), start);

        Ok(result?)
    }
}

fn observe(operation: &str, result: &std::result::Result<(), &object_store::Error>, start: Instant) {
    let status_code = match result {
        Ok(()) => "200",
        Err(object_store::Error::NotFound { .. }) => "404",
        Err(_) => "500",
    };
    S3_REQUEST_DURATION
        .with_label_values(&[operation, status_code])
        .observe(start.elapsed().as_secs_f64());
}
