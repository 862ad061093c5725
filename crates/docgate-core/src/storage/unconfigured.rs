//! Store used when no connection string is configured.
//!
//! The process still starts and serves health and auth responses; every
//! storage call fails with `CoreError::Configuration`, which the HTTP layer
//! reports as a server error.

use chrono::{DateTime, Utc};

use super::{DocumentStore, StoreFuture};
use crate::{
    error::CoreError,
    models::{CollectionName, Document, DocumentId, StoredDocument, UpsertOutcome},
};

/// Store that rejects every operation with a configuration error.
#[derive(Debug, Clone)]
pub struct UnconfiguredStore {
    setting: &'static str,
}

impl UnconfiguredStore {
    /// Creates a store reporting that `setting` is not defined.
    pub fn new(setting: &'static str) -> Self {
        Self { setting }
    }

    fn error(&self) -> CoreError {
        CoreError::Configuration(format!("{} is not defined", self.setting))
    }
}

impl DocumentStore for UnconfiguredStore {
    fn insert(
        &self,
        _collection: CollectionName,
        _document: Document,
        _changed_at: DateTime<Utc>,
    ) -> StoreFuture<'_, DocumentId> {
        Box::pin(async move { Err(self.error()) })
    }

    fn upsert(
        &self,
        _collection: CollectionName,
        _key_field: String,
        _document: Document,
        _changed_at: DateTime<Utc>,
    ) -> StoreFuture<'_, UpsertOutcome> {
        Box::pin(async move { Err(self.error()) })
    }

    fn find_changed_since(
        &self,
        _collection: CollectionName,
        _since: Option<DateTime<Utc>>,
    ) -> StoreFuture<'_, Vec<StoredDocument>> {
        Box::pin(async move { Err(self.error()) })
    }

    fn health_check(&self) -> StoreFuture<'_, ()> {
        Box::pin(async move { Err(self.error()) })
    }
}
