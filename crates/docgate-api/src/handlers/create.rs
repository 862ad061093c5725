//! Write handler shared by every source.
//!
//! Append-only sources insert a new record per call. Catalog sources upsert
//! on their natural key, storing only the projected fields. Both stamp
//! `last_changed_at` from the server clock.

use axum::{
    extract::{Path, State},
    response::{IntoResponse, Response},
    Json,
};
use bytes::Bytes;
use chrono::SubsecRound;
use docgate_core::{
    models::{upsert_key_value, CollectionName, DocumentId},
    Clock,
};
use serde::Serialize;
use tracing::{info, instrument, warn};

use super::parse_object;
use crate::{
    error::ApiError,
    sources::{prepare_insert, project_fields, WriteMode},
    state::AppState,
};

/// Response from a successful insert.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InsertResponse {
    /// Always true
    pub success: bool,
    /// Collection the record was written to
    pub collection: CollectionName,
    /// Identifier of the new record
    pub inserted_id: DocumentId,
}

/// Response from a successful upsert.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpsertResponse {
    /// Always true
    pub success: bool,
    /// Collection the record was written to
    pub collection: CollectionName,
    /// Identifier of the record created by this call, `null` on update
    pub upserted_id: Option<DocumentId>,
    /// Existing records matched on the key (0 or 1)
    pub matched_count: u64,
    /// Matched records whose data changed (0 or 1)
    pub modified_count: u64,
}

/// Writes one record for `source`.
///
/// # Errors
///
/// - 400: body is not a JSON object, collection name is invalid, or the
///   upsert key is missing
/// - 404: unknown source
/// - 500: storage or configuration failure
#[instrument(
    name = "create_record",
    skip(state, body),
    fields(source = %source_name, body_bytes = body.len())
)]
pub async fn create_record(
    Path(source_name): Path<String>,
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Response, ApiError> {
    let source =
        state.sources.get(&source_name).ok_or_else(|| ApiError::UnknownSource(source_name.clone()))?;

    let mut body = parse_object(&body)?;
    let collection = source.resolve_write_collection(&mut body)?;
    // Stamps carry the millisecond precision reads render, so a returned
    // `last_changed_at` is an exact threshold for the next poll.
    let changed_at = state.clock.now_utc().trunc_subsecs(3);

    match &source.write {
        WriteMode::Insert => {
            let document = prepare_insert(body);
            let inserted_id =
                state.with_deadline(state.store.insert(collection.clone(), document, changed_at)).await?;

            info!(collection = %collection, inserted_id = %inserted_id, "Record inserted");
            Ok(Json(InsertResponse { success: true, collection, inserted_id }).into_response())
        },
        WriteMode::Upsert { key, fields } => {
            if upsert_key_value(&body, key).is_none() {
                warn!(collection = %collection, key = %key, "Upsert rejected without key");
                return Err(ApiError::MissingUpsertKey { key: key.clone() });
            }

            let document = project_fields(&body, fields);
            let outcome = state
                .with_deadline(state.store.upsert(collection.clone(), key.clone(), document, changed_at))
                .await?;

            info!(
                collection = %collection,
                created = outcome.upserted_id.is_some(),
                modified = outcome.modified_count,
                "Record upserted"
            );
            Ok(Json(UpsertResponse {
                success: true,
                collection,
                upserted_id: outcome.upserted_id,
                matched_count: outcome.matched_count,
                modified_count: outcome.modified_count,
            })
            .into_response())
        },
    }
}
