//! Core domain models and document storage.
//!
//! Provides strongly-typed domain primitives, the storage error taxonomy,
//! the clock abstraction used to stamp writes, and the `DocumentStore`
//! contract with its PostgreSQL and in-memory implementations. The HTTP
//! layer depends on these types for every storage operation.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod error;
pub mod models;
pub mod storage;
pub mod time;

pub use error::{CoreError, Result};
pub use models::{CollectionName, Document, DocumentId, StoredDocument, UpsertOutcome};
pub use storage::DocumentStore;
pub use time::{Clock, RealClock, TestClock};
