//! Core domain models and strongly-typed identifiers.
//!
//! Defines the record shapes that flow between the HTTP layer and the
//! document store: identifiers, validated collection names, stored records
//! and upsert outcomes.

use std::{fmt, sync::LazyLock};

use chrono::{DateTime, SecondsFormat, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::error::{CoreError, Result};

/// Field carrying the record identifier in read results.
pub const ID_FIELD: &str = "_id";

/// Server-managed change timestamp field.
pub const LAST_CHANGED_AT_FIELD: &str = "last_changed_at";

/// Message returned when a collection name fails validation.
pub const COLLECTION_NAME_RULE: &str =
    "collection must be a non-empty string of letters, numbers, and underscores (max 64 characters)";

static COLLECTION_NAME_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    #[allow(clippy::unwrap_used)]
    Regex::new(r"^[A-Za-z0-9_]{1,64}$").unwrap()
});

/// A caller-supplied JSON object as persisted, minus system fields.
pub type Document = Map<String, Value>;

/// Strongly-typed record identifier.
///
/// # Example
///
/// ```
/// use docgate_core::models::DocumentId;
/// let id = DocumentId::new();
/// println!("Stored record: {}", id);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentId(pub Uuid);

impl DocumentId {
    /// Creates a new random record ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for DocumentId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for DocumentId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

/// Validated namespace name.
///
/// Only ASCII letters, digits and underscores, between 1 and 64 characters.
/// This is the only guard between caller input and the namespace a record
/// lands in, so every storage operation takes this type rather than a raw
/// string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct CollectionName(String);

impl CollectionName {
    /// Validates `name` and wraps it.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::InvalidInput` carrying [`COLLECTION_NAME_RULE`]
    /// when the name is empty, too long, or contains other characters.
    pub fn parse(name: &str) -> Result<Self> {
        if COLLECTION_NAME_PATTERN.is_match(name) {
            Ok(Self(name.to_string()))
        } else {
            Err(CoreError::InvalidInput(COLLECTION_NAME_RULE.to_string()))
        }
    }

    /// Returns the name as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CollectionName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for CollectionName {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        Self::parse(&raw).map_err(serde::de::Error::custom)
    }
}

/// A record as read back from the store.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredDocument {
    /// Record identifier
    pub id: DocumentId,
    /// Caller data without system fields
    pub data: Document,
    /// Time of the last write that changed this record
    pub last_changed_at: DateTime<Utc>,
}

impl StoredDocument {
    /// Renders the record as returned to callers: `_id`, the stored data and
    /// `last_changed_at`.
    pub fn into_json(self) -> Value {
        let mut object = Map::with_capacity(self.data.len() + 2);
        object.insert(ID_FIELD.to_string(), Value::String(self.id.to_string()));
        object.extend(self.data);
        object.insert(
            LAST_CHANGED_AT_FIELD.to_string(),
            Value::String(format_timestamp(self.last_changed_at)),
        );
        Value::Object(object)
    }
}

/// Result of a single atomic upsert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpsertOutcome {
    /// Identifier of the record created by this call, if any
    pub upserted_id: Option<DocumentId>,
    /// Number of existing records matched on the key (0 or 1)
    pub matched_count: u64,
    /// Number of matched records whose data actually changed (0 or 1)
    pub modified_count: u64,
}

impl UpsertOutcome {
    /// No record matched; one was created.
    pub fn created(id: DocumentId) -> Self {
        Self { upserted_id: Some(id), matched_count: 0, modified_count: 0 }
    }

    /// A record matched and at least one field changed.
    pub fn modified() -> Self {
        Self { upserted_id: None, matched_count: 1, modified_count: 1 }
    }

    /// A record matched but the write would not change it.
    pub fn unchanged() -> Self {
        Self { upserted_id: None, matched_count: 1, modified_count: 0 }
    }
}

/// Formats a timestamp the way records expose it: RFC 3339, millisecond
/// precision, `Z` suffix.
pub fn format_timestamp(timestamp: DateTime<Utc>) -> String {
    timestamp.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Removes fields the server owns from caller data.
pub fn strip_system_fields(document: &mut Document) {
    document.remove(ID_FIELD);
    document.remove(LAST_CHANGED_AT_FIELD);
}

/// Returns the upsert key value in `document`, treating `null` and the empty
/// string as absent.
pub fn upsert_key_value<'a>(document: &'a Document, key_field: &str) -> Option<&'a Value> {
    match document.get(key_field) {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) if s.is_empty() => None,
        Some(value) => Some(value),
    }
}

/// Canonical encoding of an upsert key used for matching: the key field
/// name, `=`, then the value's compact JSON form.
///
/// Two sources keyed on different fields never match each other's records
/// in a shared collection, and `"1"` stays distinct from `1`.
pub fn encode_natural_key(key_field: &str, value: &Value) -> String {
    format!("{key_field}={value}")
}
