//! Changed-since reads for incremental synchronization.
//!
//! Reads are separate operations from writes: `GET` takes the threshold as
//! a query parameter, `POST .../query` takes it in a JSON body. A request
//! without a threshold returns the whole collection. Results are always
//! ordered by `last_changed_at` ascending.

use std::collections::HashMap;

use axum::{
    extract::{Path, Query, State},
    response::{IntoResponse, Response},
    Json,
};
use bytes::Bytes;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use docgate_core::models::{Document, LAST_CHANGED_AT_FIELD};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, instrument};

use super::parse_object;
use crate::{error::ApiError, state::AppState};

/// Response from a successful read.
#[derive(Debug, Serialize)]
pub struct QueryResponse {
    /// Always true
    pub success: bool,
    /// Number of records in `data`
    pub count: usize,
    /// Matching records, oldest change first
    pub data: Vec<Value>,
}

/// Reads records using query-string parameters.
///
/// # Errors
///
/// See [`run_query`].
#[instrument(name = "query_records", skip(state, params), fields(source = %source_name))]
pub async fn query_records(
    Path(source_name): Path<String>,
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Response, ApiError> {
    let params: Document = params.into_iter().map(|(k, v)| (k, Value::String(v))).collect();
    run_query(&state, &source_name, &params).await
}

/// Reads records using a JSON body. An empty body means "no filter".
///
/// # Errors
///
/// See [`run_query`].
#[instrument(name = "query_records_by_body", skip(state, body), fields(source = %source_name))]
pub async fn query_records_by_body(
    Path(source_name): Path<String>,
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Response, ApiError> {
    let params = if body.is_empty() { Document::new() } else { parse_object(&body)? };
    run_query(&state, &source_name, &params).await
}

/// Looks up the source, resolves collection and threshold, and reads.
///
/// # Errors
///
/// - 400: invalid collection name or threshold
/// - 404: unknown source
/// - 405: source does not expose reads
/// - 500: storage or configuration failure
async fn run_query(
    state: &AppState,
    source_name: &str,
    params: &Document,
) -> Result<Response, ApiError> {
    let source = state
        .sources
        .get(source_name)
        .ok_or_else(|| ApiError::UnknownSource(source_name.to_string()))?;

    if !source.supports_read {
        return Err(ApiError::ReadUnsupported(source.name.clone()));
    }

    let collection = source.resolve_read_collection(params)?;
    let since = parse_threshold(params.get(LAST_CHANGED_AT_FIELD))?;

    let records =
        state.with_deadline(state.store.find_changed_since(collection.clone(), since)).await?;

    debug!(collection = %collection, since = ?since, count = records.len(), "Query completed");

    let data: Vec<Value> = records.into_iter().map(|r| r.into_json()).collect();
    Ok(Json(QueryResponse { success: true, count: data.len(), data }).into_response())
}

/// Interprets a changed-since threshold.
///
/// Absent, `null`, `false` and blank strings mean "no threshold". Strings
/// are parsed by [`parse_timestamp`]; integers are epoch milliseconds.
///
/// # Errors
///
/// Returns `ApiError::InvalidTimestamp` for any other value.
pub fn parse_threshold(value: Option<&Value>) -> Result<Option<DateTime<Utc>>, ApiError> {
    match value {
        None | Some(Value::Null) | Some(Value::Bool(false)) => Ok(None),
        Some(Value::String(s)) if s.trim().is_empty() => Ok(None),
        Some(Value::String(s)) => parse_timestamp(s.trim())
            .map(Some)
            .ok_or_else(|| ApiError::InvalidTimestamp(s.clone())),
        Some(Value::Number(n)) => n
            .as_i64()
            .and_then(DateTime::from_timestamp_millis)
            .map(Some)
            .ok_or_else(|| ApiError::InvalidTimestamp(n.to_string())),
        Some(other) => Err(ApiError::InvalidTimestamp(other.to_string())),
    }
}

/// Parses a timestamp string.
///
/// Accepts RFC 3339, `YYYY-MM-DDTHH:MM:SS[.fff]` and `YYYY-MM-DD` (both
/// taken as UTC), or an integer count of epoch milliseconds.
pub fn parse_timestamp(input: &str) -> Option<DateTime<Utc>> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(input) {
        return Some(parsed.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(input, "%Y-%m-%dT%H:%M:%S%.f") {
        return Some(naive.and_utc());
    }
    if let Ok(date) = NaiveDate::parse_from_str(input, "%Y-%m-%d") {
        return date.and_hms_opt(0, 0, 0).map(|naive| naive.and_utc());
    }
    input.parse::<i64>().ok().and_then(DateTime::from_timestamp_millis)
}
