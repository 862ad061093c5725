//! Document storage behind a single trait.
//!
//! The HTTP layer only ever talks to `dyn DocumentStore`. Production wires
//! in [`postgres::PostgresDocumentStore`]; tests use
//! [`memory::MemoryDocumentStore`]; a process started without a connection
//! string runs on [`unconfigured::UnconfiguredStore`], which fails every
//! call with a configuration error instead of crashing at startup.

use std::{future::Future, pin::Pin};

use chrono::{DateTime, Utc};

use crate::{
    error::Result,
    models::{CollectionName, Document, DocumentId, StoredDocument, UpsertOutcome},
};

pub mod memory;
pub mod postgres;
pub mod unconfigured;

pub use memory::MemoryDocumentStore;
pub use postgres::PostgresDocumentStore;
pub use unconfigured::UnconfiguredStore;

/// Boxed future returned by store operations.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + Send + 'a>>;

/// Storage operations required by the ingest handlers.
///
/// Every method is one round trip to the store. In particular `upsert` must
/// match and write in a single atomic step so that concurrent callers
/// targeting the same key are linearized by the store itself.
pub trait DocumentStore: Send + Sync + 'static {
    /// Persists `document` as a new record in `collection`.
    ///
    /// No deduplication: identical bodies produce distinct records.
    fn insert(
        &self,
        collection: CollectionName,
        document: Document,
        changed_at: DateTime<Utc>,
    ) -> StoreFuture<'_, DocumentId>;

    /// Creates or updates the record in `collection` whose `key_field`
    /// equals the value carried by `document`.
    ///
    /// Fields in `document` are merged over the existing record. When the
    /// merge changes nothing the record, including its timestamp, is left
    /// untouched and the outcome reports `modified_count == 0`.
    fn upsert(
        &self,
        collection: CollectionName,
        key_field: String,
        document: Document,
        changed_at: DateTime<Utc>,
    ) -> StoreFuture<'_, UpsertOutcome>;

    /// Returns records in `collection` changed strictly after `since` (all
    /// records when `None`), oldest change first.
    fn find_changed_since(
        &self,
        collection: CollectionName,
        since: Option<DateTime<Utc>>,
    ) -> StoreFuture<'_, Vec<StoredDocument>>;

    /// Verifies the store is reachable.
    fn health_check(&self) -> StoreFuture<'_, ()>;
}
