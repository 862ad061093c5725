//! Error types and result handling for storage operations.
//!
//! Every failure the document store can produce is folded into `CoreError`.
//! The HTTP layer maps these onto status codes and decides how much detail
//! a caller gets to see.

use std::time::Duration;

use thiserror::Error;

/// SQLSTATE raised when text cannot be stored, such as U+0000 in `jsonb`.
const UNTRANSLATABLE_CHARACTER: &str = "22P05";

/// Result type alias using `CoreError`.
pub type Result<T> = std::result::Result<T, CoreError>;

/// Core error type for storage operations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Required configuration is missing or unusable.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Database operation failed.
    #[error("Database error: {0}")]
    Database(String),

    /// Storage call did not finish before its deadline.
    #[error("Storage operation timed out after {0:?}")]
    Timeout(Duration),

    /// Invalid input reached the storage layer.
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl CoreError {
    /// Returns the stable error code reported to callers.
    pub const fn code(&self) -> &'static str {
        match self {
            Self::Configuration(_) => "E3001",
            Self::Database(_) => "E3002",
            Self::Timeout(_) => "E3003",
            Self::InvalidInput(_) => "E1004",
        }
    }
}

impl From<sqlx::Error> for CoreError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Configuration(e) => Self::Configuration(e.to_string()),
            sqlx::Error::PoolTimedOut => {
                Self::Database("timed out acquiring a pooled connection".to_string())
            },
            sqlx::Error::Database(ref db)
                if db.code().as_deref() == Some(UNTRANSLATABLE_CHARACTER) =>
            {
                Self::InvalidInput("document contains characters that cannot be stored".to_string())
            },
            _ => Self::Database(err.to_string()),
        }
    }
}

impl From<serde_json::Error> for CoreError {
    fn from(err: serde_json::Error) -> Self {
        Self::InvalidInput(err.to_string())
    }
}
