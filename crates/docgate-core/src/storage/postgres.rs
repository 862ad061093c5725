//! PostgreSQL-backed document store.
//!
//! All namespaces share one `documents` table. The namespace is a plain
//! column, never an identifier spliced into SQL, and upsert keys live in a
//! `natural_key` column covered by a unique index so that the conditional
//! write is a single `INSERT ... ON CONFLICT` statement.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use sqlx::{types::Json, PgPool, Row};
use tokio::sync::OnceCell;
use tracing::{debug, info};
use uuid::Uuid;

use super::{DocumentStore, StoreFuture};
use crate::{
    error::{CoreError, Result},
    models::{
        encode_natural_key, upsert_key_value, CollectionName, Document, DocumentId,
        StoredDocument, UpsertOutcome,
    },
};

const SCHEMA: [&str; 3] = [
    r"
    CREATE TABLE IF NOT EXISTS documents (
        seq BIGSERIAL NOT NULL,
        id UUID PRIMARY KEY,
        collection TEXT NOT NULL,
        natural_key TEXT,
        doc JSONB NOT NULL,
        last_changed_at TIMESTAMPTZ NOT NULL
    )
    ",
    r"
    CREATE UNIQUE INDEX IF NOT EXISTS idx_documents_natural_key
    ON documents(collection, natural_key)
    ",
    r"
    CREATE INDEX IF NOT EXISTS idx_documents_changed
    ON documents(collection, last_changed_at, seq)
    ",
];

/// Document store over a shared connection pool.
///
/// Each operation borrows a pooled connection for the duration of one
/// statement; the connection returns to the pool when the query future
/// completes or is dropped.
#[derive(Clone)]
pub struct PostgresDocumentStore {
    pool: Arc<PgPool>,
    schema: Arc<OnceCell<()>>,
}

impl PostgresDocumentStore {
    /// Creates a store over `pool`. The schema is created on first use.
    pub fn new(pool: PgPool) -> Self {
        Self { pool: Arc::new(pool), schema: Arc::new(OnceCell::new()) }
    }

    /// Returns a reference to the database pool.
    pub fn pool(&self) -> Arc<PgPool> {
        self.pool.clone()
    }

    /// Creates the `documents` table and its indexes if they do not exist.
    ///
    /// Runs at most once per store; concurrent first callers wait on the
    /// same initialization.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::Database` if any DDL statement fails.
    pub async fn ensure_schema(&self) -> Result<()> {
        self.schema
            .get_or_try_init(|| async {
                for statement in SCHEMA {
                    sqlx::query(statement).execute(&*self.pool).await?;
                }
                info!("Document schema ready");
                Ok::<(), CoreError>(())
            })
            .await?;
        Ok(())
    }

    async fn insert_impl(
        &self,
        collection: CollectionName,
        document: Document,
        changed_at: DateTime<Utc>,
    ) -> Result<DocumentId> {
        self.ensure_schema().await?;

        let id = DocumentId::new();
        sqlx::query(
            r"
            INSERT INTO documents (id, collection, doc, last_changed_at)
            VALUES ($1, $2, $3, $4)
            ",
        )
        .bind(id.0)
        .bind(collection.as_str())
        .bind(Json(&document))
        .bind(changed_at)
        .execute(&*self.pool)
        .await?;

        debug!(collection = %collection, id = %id, "Inserted document");
        Ok(id)
    }

    async fn upsert_impl(
        &self,
        collection: CollectionName,
        key_field: String,
        document: Document,
        changed_at: DateTime<Utc>,
    ) -> Result<UpsertOutcome> {
        let natural_key = upsert_key_value(&document, &key_field)
            .map(|value| encode_natural_key(&key_field, value))
            .ok_or_else(|| CoreError::InvalidInput(format!("{key_field} is required for upsert")))?;

        self.ensure_schema().await?;

        // No row back means the conflict matched but the WHERE clause found
        // nothing to change.
        let id = DocumentId::new();
        let row = sqlx::query(
            r"
            INSERT INTO documents (id, collection, natural_key, doc, last_changed_at)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (collection, natural_key) DO UPDATE
            SET doc = documents.doc || EXCLUDED.doc,
                last_changed_at = EXCLUDED.last_changed_at
            WHERE (documents.doc || EXCLUDED.doc) IS DISTINCT FROM documents.doc
            RETURNING id, (xmax = 0) AS inserted
            ",
        )
        .bind(id.0)
        .bind(collection.as_str())
        .bind(&natural_key)
        .bind(Json(&document))
        .bind(changed_at)
        .fetch_optional(&*self.pool)
        .await?;

        let outcome = match row {
            Some(row) => {
                let inserted: bool = row.try_get("inserted")?;
                if inserted {
                    UpsertOutcome::created(DocumentId(row.try_get::<Uuid, _>("id")?))
                } else {
                    UpsertOutcome::modified()
                }
            },
            None => UpsertOutcome::unchanged(),
        };

        debug!(
            collection = %collection,
            natural_key = %natural_key,
            matched = outcome.matched_count,
            modified = outcome.modified_count,
            "Upserted document"
        );
        Ok(outcome)
    }

    async fn find_changed_since_impl(
        &self,
        collection: CollectionName,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<StoredDocument>> {
        self.ensure_schema().await?;

        let rows = sqlx::query_as::<_, (Uuid, Json<Document>, DateTime<Utc>)>(
            r"
            SELECT id, doc, last_changed_at
            FROM documents
            WHERE collection = $1
              AND ($2::timestamptz IS NULL OR last_changed_at > $2)
            ORDER BY last_changed_at ASC, seq ASC
            ",
        )
        .bind(collection.as_str())
        .bind(since)
        .fetch_all(&*self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(id, Json(data), last_changed_at)| StoredDocument {
                id: DocumentId(id),
                data,
                last_changed_at,
            })
            .collect())
    }
}

impl DocumentStore for PostgresDocumentStore {
    fn insert(
        &self,
        collection: CollectionName,
        document: Document,
        changed_at: DateTime<Utc>,
    ) -> StoreFuture<'_, DocumentId> {
        Box::pin(self.insert_impl(collection, document, changed_at))
    }

    fn upsert(
        &self,
        collection: CollectionName,
        key_field: String,
        document: Document,
        changed_at: DateTime<Utc>,
    ) -> StoreFuture<'_, UpsertOutcome> {
        Box::pin(self.upsert_impl(collection, key_field, document, changed_at))
    }

    fn find_changed_since(
        &self,
        collection: CollectionName,
        since: Option<DateTime<Utc>>,
    ) -> StoreFuture<'_, Vec<StoredDocument>> {
        Box::pin(self.find_changed_since_impl(collection, since))
    }

    fn health_check(&self) -> StoreFuture<'_, ()> {
        Box::pin(async move {
            let _: (i32,) = sqlx::query_as("SELECT 1").fetch_one(&*self.pool).await?;
            Ok(())
        })
    }
}
