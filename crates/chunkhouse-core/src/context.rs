//! Request Context
//!
//! Every store and ruler operation takes a [`RequestContext`]. It carries
//! the tenant ID that partitions all keys, plus a cancellation token that
//! propagates across every task spawned on behalf of the request. The
//! context is cheap to clone; clones share the same token.

use tokio_util::sync::{CancellationToken, WaitForCancellationFuture};

use crate::error::{Error, Result};

/// Ambient per-request state: tenant identity and cancellation.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    tenant: Option<String>,
    cancel: CancellationToken,
}

impl RequestContext {
    /// A context with no tenant. Tenant-scoped operations will fail with
    /// [`Error::NoTenant`].
    pub fn new() -> Self {
        Self::default()
    }

    /// A context bound to a tenant.
    pub fn with_tenant(tenant: impl Into<String>) -> Self {
        Self {
            tenant: Some(tenant.into()),
            cancel: CancellationToken::new(),
        }
    }

    /// The tenant ID, or `NoTenant` if the context carries none.
    pub fn tenant(&self) -> Result<&str> {
        self.tenant.as_deref().ok_or(Error::NoTenant)
    }

    /// Cancel the request. All clones observe the cancellation.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Resolves once the request is cancelled. Used in `select!` arms at
    /// suspension points.
    pub fn cancelled(&self) -> WaitForCancellationFuture<'_> {
        self.cancel.cancelled()
    }

    /// Fail fast if the request has been cancelled. Called before every
    /// network round trip.
    pub fn ensure_active(&self) -> Result<()> {
        if self.cancel.is_cancelled() {
            Err(Error::Cancelled)
        } else {
            Ok(())
        }
    }
}
