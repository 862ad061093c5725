//! Docgate HTTP API.
//!
//! Authenticated write and changed-sync read endpoints that let external
//! integrations (email, ERP, CRM) push JSON records into named collections
//! of a document store.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod collection;
pub mod config;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod server;
pub mod sources;
pub mod state;

pub use config::Config;
pub use error::{ApiError, ErrorBody};
pub use middleware::auth::{ApiKeyAuth, API_KEY_HEADER};
pub use server::{create_router, start_server};
pub use sources::{default_sources, NamespaceMode, SourceConfig, SourceRegistry, WriteMode};
pub use state::{AppState, Limits};
