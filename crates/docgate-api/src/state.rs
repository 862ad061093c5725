//! Shared application state handed to every handler.

use std::{future::Future, sync::Arc, time::Duration};

use docgate_core::{Clock, CoreError, DocumentStore};

use crate::{middleware::auth::ApiKeyAuth, sources::SourceRegistry};

/// Request limits and deadlines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limits {
    /// Deadline for a whole request, enforced by the router
    pub request_timeout: Duration,
    /// Deadline for a single storage call
    pub storage_timeout: Duration,
    /// Maximum accepted request body size
    pub max_body_bytes: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(30),
            storage_timeout: Duration::from_secs(10),
            max_body_bytes: 1024 * 1024,
        }
    }
}

/// State shared by all routes. Cheap to clone.
#[derive(Clone)]
pub struct AppState {
    /// Document store
    pub store: Arc<dyn DocumentStore>,
    /// Time source for write stamps and health timing
    pub clock: Arc<dyn Clock>,
    /// Registered integration sources
    pub sources: Arc<SourceRegistry>,
    /// Shared-secret authorizer
    pub auth: Arc<ApiKeyAuth>,
    /// Request limits
    pub limits: Limits,
}

impl AppState {
    /// Assembles application state.
    pub fn new(
        store: Arc<dyn DocumentStore>,
        clock: Arc<dyn Clock>,
        sources: SourceRegistry,
        auth: ApiKeyAuth,
        limits: Limits,
    ) -> Self {
        Self { store, clock, sources: Arc::new(sources), auth: Arc::new(auth), limits }
    }

    /// Runs a storage call under the per-call deadline.
    ///
    /// # Errors
    ///
    /// Returns the call's own error, or `CoreError::Timeout` when the
    /// deadline passes first. The pending call is dropped, which releases
    /// any pooled connection it held.
    pub async fn with_deadline<T, F>(&self, operation: F) -> docgate_core::Result<T>
    where
        F: Future<Output = docgate_core::Result<T>>,
    {
        let deadline = self.limits.storage_timeout;
        tokio::time::timeout(deadline, operation).await.map_err(|_| CoreError::Timeout(deadline))?
    }
}
