//! In-memory document store for tests.
//!
//! Mirrors the PostgreSQL store's semantics (merge-on-upsert, unchanged
//! detection, strict `>` filtering, insertion order as tie-breaker) without
//! a database. Supports injecting failures and latency, and counts the
//! operations it served so tests can assert that rejected requests never
//! reached storage.

use std::{
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use super::{DocumentStore, StoreFuture};
use crate::{
    error::CoreError,
    models::{
        encode_natural_key, upsert_key_value, CollectionName, Document, DocumentId,
        StoredDocument, UpsertOutcome,
    },
};

#[derive(Debug, Clone)]
struct MemoryRecord {
    collection: CollectionName,
    natural_key: Option<String>,
    document: StoredDocument,
}

/// Document store holding records in process memory.
#[derive(Debug, Clone, Default)]
pub struct MemoryDocumentStore {
    records: Arc<RwLock<Vec<MemoryRecord>>>,
    injected_error: Arc<RwLock<Option<String>>>,
    latency: Arc<RwLock<Option<Duration>>>,
    operations: Arc<AtomicUsize>,
}

impl MemoryDocumentStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next data operation fail with a database error.
    pub async fn inject_error(&self, message: impl Into<String>) {
        *self.injected_error.write().await = Some(message.into());
    }

    /// Delays every subsequent data operation by `delay`.
    pub async fn inject_latency(&self, delay: Duration) {
        *self.latency.write().await = Some(delay);
    }

    /// Number of insert, upsert and query calls served so far.
    pub fn operation_count(&self) -> usize {
        self.operations.load(Ordering::Acquire)
    }

    /// Returns every record in `collection` in insertion order.
    pub async fn records(&self, collection: &str) -> Vec<StoredDocument> {
        self.records
            .read()
            .await
            .iter()
            .filter(|r| r.collection.as_str() == collection)
            .map(|r| r.document.clone())
            .collect()
    }

    /// Total number of records across all collections.
    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    /// Returns true when no record has been stored.
    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }

    async fn begin_operation(&self) -> crate::Result<()> {
        self.operations.fetch_add(1, Ordering::AcqRel);

        let latency = *self.latency.read().await;
        if let Some(delay) = latency {
            tokio::time::sleep(delay).await;
        }

        match self.injected_error.write().await.take() {
            Some(message) => Err(CoreError::Database(message)),
            None => Ok(()),
        }
    }
}

impl DocumentStore for MemoryDocumentStore {
    fn insert(
        &self,
        collection: CollectionName,
        document: Document,
        changed_at: DateTime<Utc>,
    ) -> StoreFuture<'_, DocumentId> {
        Box::pin(async move {
            self.begin_operation().await?;

            let id = DocumentId::new();
            self.records.write().await.push(MemoryRecord {
                collection,
                natural_key: None,
                document: StoredDocument { id, data: document, last_changed_at: changed_at },
            });
            Ok(id)
        })
    }

    fn upsert(
        &self,
        collection: CollectionName,
        key_field: String,
        document: Document,
        changed_at: DateTime<Utc>,
    ) -> StoreFuture<'_, UpsertOutcome> {
        Box::pin(async move {
            let natural_key = upsert_key_value(&document, &key_field)
                .map(|value| encode_natural_key(&key_field, value))
                .ok_or_else(|| CoreError::InvalidInput(format!("{key_field} is required for upsert")))?;

            self.begin_operation().await?;

            // Match and write under one lock, like the single SQL statement.
            let mut records = self.records.write().await;
            let existing = records.iter_mut().find(|r| {
                r.collection == collection && r.natural_key.as_deref() == Some(&natural_key)
            });

            let outcome = match existing {
                Some(record) => {
                    let mut merged = record.document.data.clone();
                    merged.extend(document);
                    if merged == record.document.data {
                        UpsertOutcome::unchanged()
                    } else {
                        record.document.data = merged;
                        record.document.last_changed_at = changed_at;
                        UpsertOutcome::modified()
                    }
                },
                None => {
                    let id = DocumentId::new();
                    records.push(MemoryRecord {
                        collection,
                        natural_key: Some(natural_key),
                        document: StoredDocument {
                            id,
                            data: document,
                            last_changed_at: changed_at,
                        },
                    });
                    UpsertOutcome::created(id)
                },
            };
            Ok(outcome)
        })
    }

    fn find_changed_since(
        &self,
        collection: CollectionName,
        since: Option<DateTime<Utc>>,
    ) -> StoreFuture<'_, Vec<StoredDocument>> {
        Box::pin(async move {
            self.begin_operation().await?;

            let mut matching: Vec<StoredDocument> = self
                .records
                .read()
                .await
                .iter()
                .filter(|r| r.collection == collection)
                .filter(|r| since.map_or(true, |threshold| r.document.last_changed_at > threshold))
                .map(|r| r.document.clone())
                .collect();

            // Stable sort keeps insertion order for equal timestamps.
            matching.sort_by_key(|d| d.last_changed_at);
            Ok(matching)
        })
    }

    fn health_check(&self) -> StoreFuture<'_, ()> {
        Box::pin(async { Ok(()) })
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration as ChronoDuration;
    use serde_json::json;

    use super::*;

    fn doc(value: serde_json::Value) -> Document {
        value.as_object().cloned().unwrap()
    }

    fn collection(name: &str) -> CollectionName {
        CollectionName::parse(name).unwrap()
    }

    #[tokio::test]
    async fn inserts_never_deduplicate() {
        let store = MemoryDocumentStore::new();
        let now = Utc::now();

        let a = store.insert(collection("leads"), doc(json!({"x": 1})), now).await.unwrap();
        let b = store.insert(collection("leads"), doc(json!({"x": 1})), now).await.unwrap();

        assert_ne!(a, b);
        assert_eq!(store.records("leads").await.len(), 2);
    }

    #[tokio::test]
    async fn upsert_creates_then_modifies_then_reports_unchanged() {
        let store = MemoryDocumentStore::new();
        let t0 = Utc::now();
        let t1 = t0 + ChronoDuration::seconds(1);
        let t2 = t0 + ChronoDuration::seconds(2);

        let created = store
            .upsert(collection("sap"), "sku".into(), doc(json!({"sku": "A1", "price": 1})), t0)
            .await
            .unwrap();
        assert!(created.upserted_id.is_some());

        let modified = store
            .upsert(collection("sap"), "sku".into(), doc(json!({"sku": "A1", "price": 2})), t1)
            .await
            .unwrap();
        assert_eq!(modified, UpsertOutcome::modified());

        let unchanged = store
            .upsert(collection("sap"), "sku".into(), doc(json!({"sku": "A1", "price": 2})), t2)
            .await
            .unwrap();
        assert_eq!(unchanged, UpsertOutcome::unchanged());

        let records = store.records("sap").await;
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].last_changed_at, t1);
        assert_eq!(records[0].id, created.upserted_id.unwrap());
    }

    #[tokio::test]
    async fn upsert_keys_are_scoped_to_collection() {
        let store = MemoryDocumentStore::new();
        let now = Utc::now();

        for name in ["sap", "sap_eu"] {
            let outcome = store
                .upsert(collection(name), "sku".into(), doc(json!({"sku": "A1"})), now)
                .await
                .unwrap();
            assert!(outcome.upserted_id.is_some());
        }
    }

    #[tokio::test]
    async fn upsert_keys_are_scoped_to_key_field() {
        let store = MemoryDocumentStore::new();
        let now = Utc::now();

        let by_sku = store
            .upsert(collection("items"), "sku".into(), doc(json!({"sku": "A1", "code": "A1"})), now)
            .await
            .unwrap();
        let by_code = store
            .upsert(collection("items"), "code".into(), doc(json!({"sku": "A1", "code": "A1"})), now)
            .await
            .unwrap();

        assert!(by_sku.upserted_id.is_some());
        assert!(by_code.upserted_id.is_some());
        assert_eq!(store.records("items").await.len(), 2);
    }

    #[tokio::test]
    async fn upsert_does_not_match_inserted_records() {
        let store = MemoryDocumentStore::new();
        let now = Utc::now();

        store.insert(collection("sap"), doc(json!({"sku": "A1"})), now).await.unwrap();
        let outcome = store
            .upsert(collection("sap"), "sku".into(), doc(json!({"sku": "A1"})), now)
            .await
            .unwrap();

        assert!(outcome.upserted_id.is_some());
        assert_eq!(store.records("sap").await.len(), 2);
    }

    #[tokio::test]
    async fn find_changed_since_is_strict_and_ordered() {
        let store = MemoryDocumentStore::new();
        let t1 = Utc::now();
        let t2 = t1 + ChronoDuration::seconds(1);
        let t3 = t1 + ChronoDuration::seconds(2);

        store.insert(collection("c"), doc(json!({"n": 3})), t3).await.unwrap();
        store.insert(collection("c"), doc(json!({"n": 1})), t1).await.unwrap();
        store.insert(collection("c"), doc(json!({"n": 2})), t2).await.unwrap();

        let after_t1 = store.find_changed_since(collection("c"), Some(t1)).await.unwrap();
        let ns: Vec<_> = after_t1.iter().map(|d| d.data["n"].clone()).collect();
        assert_eq!(ns, vec![json!(2), json!(3)]);

        let all = store.find_changed_since(collection("c"), None).await.unwrap();
        let ns: Vec<_> = all.iter().map(|d| d.data["n"].clone()).collect();
        assert_eq!(ns, vec![json!(1), json!(2), json!(3)]);
    }

    #[tokio::test]
    async fn injected_error_fails_once() {
        let store = MemoryDocumentStore::new();
        store.inject_error("disk on fire").await;

        let err = store.insert(collection("c"), Document::new(), Utc::now()).await.unwrap_err();
        assert!(matches!(err, CoreError::Database(ref m) if m == "disk on fire"));

        assert!(store.insert(collection("c"), Document::new(), Utc::now()).await.is_ok());
        assert_eq!(store.operation_count(), 2);
    }
}
