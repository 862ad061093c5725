//! Per-integration source descriptors.
//!
//! Each external system is described declaratively: which collection it
//! writes to by default, whether callers may pick another one, whether
//! writes append or upsert on a natural key, and whether it exposes reads.
//! One generic handler serves every source by consulting its descriptor.

use std::{
    collections::{BTreeMap, HashSet},
    sync::Arc,
};

use docgate_core::models::{
    strip_system_fields, CollectionName, Document, ID_FIELD, LAST_CHANGED_AT_FIELD,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::{
    collection::{resolve_collection, strip_routing_keys},
    error::ApiError,
};

/// How a source chooses the collection it writes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NamespaceMode {
    /// Callers may name a collection through the aliasing keys
    #[default]
    Dynamic,
    /// Every record goes to the default collection
    Fixed,
}

/// How a source persists records.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "lowercase")]
pub enum WriteMode {
    /// Every call appends a new record
    Insert,
    /// Calls create or update the record matching `key`
    Upsert {
        /// Natural key field
        key: String,
        /// Fields projected into the stored record
        fields: Vec<String>,
    },
}

/// Declarative description of one integration source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Path segment identifying the source (`/api/{name}/...`)
    pub name: String,
    /// Collection used when the caller names none
    pub default_collection: String,
    /// Namespace selection mode
    #[serde(default)]
    pub namespace: NamespaceMode,
    /// Write strategy
    pub write: WriteMode,
    /// Whether the source exposes changed-since reads
    #[serde(default)]
    pub supports_read: bool,
}

/// Built-in descriptors for the email, ERP and CRM integrations.
pub fn default_sources() -> Vec<SourceConfig> {
    vec![
        SourceConfig {
            name: "outlook".to_string(),
            default_collection: "outlook".to_string(),
            namespace: NamespaceMode::Dynamic,
            write: WriteMode::Insert,
            supports_read: false,
        },
        SourceConfig {
            name: "sap".to_string(),
            default_collection: "sap".to_string(),
            namespace: NamespaceMode::Dynamic,
            write: WriteMode::Upsert {
                key: "sku".to_string(),
                fields: ["product_id", "sku", "name", "price", "is_active"]
                    .map(String::from)
                    .to_vec(),
            },
            supports_read: false,
        },
        SourceConfig {
            name: "salesforce".to_string(),
            default_collection: "salesforce".to_string(),
            namespace: NamespaceMode::Fixed,
            write: WriteMode::Insert,
            supports_read: true,
        },
    ]
}

/// Invalid source configuration.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SourceConfigError {
    /// Source name is not a safe path segment.
    #[error("source name {0:?} must be letters, numbers, and underscores (max 64 characters)")]
    InvalidName(String),

    /// Two descriptors share a name.
    #[error("source {0} is defined more than once")]
    Duplicate(String),

    /// Default collection fails validation.
    #[error("source {source_name}: invalid default collection {collection:?}")]
    InvalidDefaultCollection {
        /// Offending source
        source_name: String,
        /// Offending collection name
        collection: String,
    },

    /// Upsert key is empty.
    #[error("source {0}: upsert key must not be empty")]
    EmptyUpsertKey(String),

    /// A projected field collides with a server-managed field.
    #[error("source {source_name}: field {field} is managed by the server")]
    ReservedField {
        /// Offending source
        source_name: String,
        /// Offending field
        field: String,
    },
}

/// A validated source descriptor.
#[derive(Debug, Clone)]
pub struct Source {
    /// Source name
    pub name: String,
    /// Validated default collection
    pub default_collection: CollectionName,
    /// Namespace selection mode
    pub namespace: NamespaceMode,
    /// Write strategy; upsert projections always contain the key
    pub write: WriteMode,
    /// Whether reads are exposed
    pub supports_read: bool,
}

impl Source {
    /// Validates a descriptor.
    ///
    /// # Errors
    ///
    /// Returns `SourceConfigError` describing the first problem found.
    pub fn from_config(config: &SourceConfig) -> Result<Self, SourceConfigError> {
        if CollectionName::parse(&config.name).is_err() {
            return Err(SourceConfigError::InvalidName(config.name.clone()));
        }

        let default_collection = CollectionName::parse(&config.default_collection).map_err(|_| {
            SourceConfigError::InvalidDefaultCollection {
                source_name: config.name.clone(),
                collection: config.default_collection.clone(),
            }
        })?;

        let write = match &config.write {
            WriteMode::Insert => WriteMode::Insert,
            WriteMode::Upsert { key, fields } => {
                if key.trim().is_empty() {
                    return Err(SourceConfigError::EmptyUpsertKey(config.name.clone()));
                }
                let mut projected: Vec<String> = Vec::with_capacity(fields.len() + 1);
                for field in fields.iter().chain(std::iter::once(key)) {
                    if field == ID_FIELD || field == LAST_CHANGED_AT_FIELD {
                        return Err(SourceConfigError::ReservedField {
                            source_name: config.name.clone(),
                            field: field.clone(),
                        });
                    }
                    if !projected.contains(field) {
                        projected.push(field.clone());
                    }
                }
                WriteMode::Upsert { key: key.clone(), fields: projected }
            },
        };

        Ok(Self {
            name: config.name.clone(),
            default_collection,
            namespace: config.namespace,
            write,
            supports_read: config.supports_read,
        })
    }

    /// Picks the collection for a write and removes routing metadata from
    /// the body.
    ///
    /// Fixed-namespace sources ignore the aliasing keys and keep them as
    /// ordinary data.
    ///
    /// # Errors
    ///
    /// Returns `ApiError::InvalidCollection` for an unsafe caller-supplied
    /// name.
    pub fn resolve_write_collection(&self, body: &mut Document) -> Result<CollectionName, ApiError> {
        match self.namespace {
            NamespaceMode::Fixed => Ok(self.default_collection.clone()),
            NamespaceMode::Dynamic => {
                let collection = resolve_collection(body, &self.default_collection)?;
                strip_routing_keys(body);
                Ok(collection)
            },
        }
    }

    /// Picks the collection for a read from query or body parameters.
    ///
    /// # Errors
    ///
    /// Returns `ApiError::InvalidCollection` for an unsafe caller-supplied
    /// name.
    pub fn resolve_read_collection(&self, params: &Document) -> Result<CollectionName, ApiError> {
        match self.namespace {
            NamespaceMode::Fixed => Ok(self.default_collection.clone()),
            NamespaceMode::Dynamic => resolve_collection(params, &self.default_collection),
        }
    }
}

/// Builds the record stored by an upsert: exactly the projected fields,
/// `null` where the body omits one.
pub fn project_fields(body: &Document, fields: &[String]) -> Document {
    fields
        .iter()
        .map(|field| (field.clone(), body.get(field).cloned().unwrap_or(Value::Null)))
        .collect()
}

/// Prepares an insert body: server-managed fields are dropped so the
/// caller cannot set them.
pub fn prepare_insert(mut body: Document) -> Document {
    strip_system_fields(&mut body);
    body
}

/// Lookup table of validated sources by name.
#[derive(Debug, Clone, Default)]
pub struct SourceRegistry {
    sources: BTreeMap<String, Arc<Source>>,
}

impl SourceRegistry {
    /// Validates every descriptor and indexes them by name.
    ///
    /// # Errors
    ///
    /// Returns the first invalid or duplicate descriptor.
    pub fn from_configs(configs: &[SourceConfig]) -> Result<Self, SourceConfigError> {
        let mut seen = HashSet::new();
        let mut sources = BTreeMap::new();

        for config in configs {
            if !seen.insert(config.name.as_str()) {
                return Err(SourceConfigError::Duplicate(config.name.clone()));
            }
            let source = Source::from_config(config)?;
            sources.insert(source.name.clone(), Arc::new(source));
        }

        Ok(Self { sources })
    }

    /// Returns the source registered under `name`.
    pub fn get(&self, name: &str) -> Option<Arc<Source>> {
        self.sources.get(name).cloned()
    }

    /// Registered source names in sorted order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.sources.keys().map(String::as_str)
    }
}
