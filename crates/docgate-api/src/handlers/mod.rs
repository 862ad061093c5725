//! HTTP request handlers for the docgate API.
//!
//! Handlers follow one pattern: look up the source descriptor, parse and
//! validate input, run exactly one storage call under its deadline, and
//! answer with a JSON envelope. Authentication has already happened in
//! middleware by the time any handler runs.
//!
//! - `create` - insert and upsert writes
//! - `query` - changed-since reads
//! - `health` - liveness and readiness probes

use docgate_core::models::Document;
use serde_json::Value;

use crate::error::ApiError;

pub mod create;
pub mod health;
pub mod query;

pub use create::create_record;
pub use health::{health_check, liveness_check, readiness_check};
pub use query::{query_records, query_records_by_body};

/// Parses a request body that must be a JSON object.
///
/// Strings holding U+0000 are refused here because the document store
/// cannot persist them.
pub(crate) fn parse_object(body: &[u8]) -> Result<Document, ApiError> {
    match serde_json::from_slice::<Value>(body) {
        Ok(Value::Object(object)) => {
            if object_contains_nul(&object) {
                return Err(ApiError::InvalidBody(
                    "strings must not contain NUL characters".to_string(),
                ));
            }
            Ok(object)
        },
        Ok(_) => Err(ApiError::InvalidBody("expected a JSON object".to_string())),
        Err(e) => Err(ApiError::InvalidBody(e.to_string())),
    }
}

fn contains_nul(value: &Value) -> bool {
    match value {
        Value::String(s) => s.contains('\0'),
        Value::Array(items) => items.iter().any(contains_nul),
        Value::Object(object) => object_contains_nul(object),
        Value::Null | Value::Bool(_) | Value::Number(_) => false,
    }
}

fn object_contains_nul(object: &Document) -> bool {
    object.iter().any(|(key, value)| key.contains('\0') || contains_nul(value))
}
