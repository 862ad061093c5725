//! Target collection resolution for dynamic-namespace sources.
//!
//! Callers pick a namespace with one of several aliasing keys. The keys are
//! routing metadata, so they are removed from the record before it is
//! stored.

use docgate_core::models::{CollectionName, Document};
use serde_json::Value;

use crate::error::ApiError;

/// Aliasing keys naming the target collection, in precedence order.
pub const ROUTING_KEYS: [&str; 3] = ["collection", "table", "collectionName"];

/// Resolves the collection named by `params`, falling back to `default`.
///
/// Aliases that are absent, `null`, or strings that trim to empty are
/// skipped. The first remaining alias decides: a string is trimmed and used,
/// any other JSON value falls back to `default`. The result must be a valid
/// collection name; an invalid caller-supplied name is rejected, never
/// silently replaced.
///
/// # Errors
///
/// Returns `ApiError::InvalidCollection` when the resolved name fails
/// validation.
pub fn resolve_collection(
    params: &Document,
    default: &CollectionName,
) -> Result<CollectionName, ApiError> {
    let chosen = ROUTING_KEYS.iter().filter_map(|key| params.get(*key)).find(|value| match value {
        Value::Null => false,
        Value::String(s) => !s.trim().is_empty(),
        _ => true,
    });

    match chosen {
        Some(Value::String(name)) => CollectionName::parse(name.trim())
            .map_err(|e| ApiError::InvalidCollection(invalid_input_message(e))),
        _ => Ok(default.clone()),
    }
}

/// Removes every aliasing key from `document`.
pub fn strip_routing_keys(document: &mut Document) {
    for key in ROUTING_KEYS {
        document.remove(key);
    }
}

fn invalid_input_message(err: docgate_core::CoreError) -> String {
    match err {
        docgate_core::CoreError::InvalidInput(message) => message,
        other => other.to_string(),
    }
}
