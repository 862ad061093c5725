//! HTTP error taxonomy and response envelopes.
//!
//! Every failure a handler can produce maps to one `ApiError` variant with a
//! stable code and status. Client errors carry a specific message; server
//! errors are logged in full and reach the caller only as an opaque message
//! plus code.

use std::time::Duration;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use docgate_core::CoreError;
use serde::Serialize;
use thiserror::Error;
use tracing::error;

/// Message returned to callers for every server-side failure.
pub const INTERNAL_ERROR_MESSAGE: &str = "Internal server error";

/// Failure envelope: `{success: false, error, code}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorBody {
    /// Always false
    pub success: bool,
    /// Human-readable error description
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Stable error code
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<&'static str>,
}

impl ErrorBody {
    /// Envelope with a message and no code.
    pub fn message(message: impl Into<String>) -> Self {
        Self { success: false, error: Some(message.into()), code: None }
    }

    /// Envelope with neither message nor code.
    pub fn bare() -> Self {
        Self { success: false, error: None, code: None }
    }
}

/// Errors returned by the ingest handlers.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Resolved collection name is not a safe identifier (E1001).
    #[error("{0}")]
    InvalidCollection(String),

    /// Upsert body lacks its natural key (E1002).
    #[error("{key} is required for upsert")]
    MissingUpsertKey {
        /// Name of the key field
        key: String,
    },

    /// Changed-since threshold could not be parsed (E1003).
    #[error("invalid last_changed_at: {0}")]
    InvalidTimestamp(String),

    /// Body is not a JSON object (E1004).
    #[error("invalid request body: {0}")]
    InvalidBody(String),

    /// No source is registered under this name (E1005).
    #[error("unknown source: {0}")]
    UnknownSource(String),

    /// Source does not expose reads (E1006).
    #[error("source {0} does not support reads")]
    ReadUnsupported(String),

    /// Request body exceeds the configured limit (E1007).
    #[error("request body exceeds {limit} bytes")]
    PayloadTooLarge {
        /// Configured `max_body_bytes`
        limit: usize,
    },

    /// Route exists but not for this method (E1008).
    #[error("method not allowed")]
    MethodNotAllowed,

    /// No route matches the path (E1009).
    #[error("route not found")]
    RouteNotFound,

    /// Any other framework rejection, keeping its status (E1004).
    #[error("{}", .0.canonical_reason().unwrap_or("request rejected"))]
    Rejected(StatusCode),

    /// Whole request did not finish before the router deadline (E3003).
    #[error("request timed out after {0:?}")]
    RequestTimeout(Duration),

    /// Storage or configuration failure.
    #[error(transparent)]
    Storage(#[from] CoreError),
}

impl ApiError {
    /// Returns the stable error code.
    pub const fn code(&self) -> &'static str {
        match self {
            Self::InvalidCollection(_) => "E1001",
            Self::MissingUpsertKey { .. } => "E1002",
            Self::InvalidTimestamp(_) => "E1003",
            Self::InvalidBody(_) => "E1004",
            Self::UnknownSource(_) => "E1005",
            Self::ReadUnsupported(_) => "E1006",
            Self::PayloadTooLarge { .. } => "E1007",
            Self::MethodNotAllowed => "E1008",
            Self::RouteNotFound => "E1009",
            Self::Rejected(status) if status.as_u16() >= 500 => "E3002",
            Self::Rejected(_) => "E1004",
            Self::RequestTimeout(_) => "E3003",
            Self::Storage(err) => err.code(),
        }
    }

    /// Returns the HTTP status for this error.
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::InvalidCollection(_)
            | Self::MissingUpsertKey { .. }
            | Self::InvalidTimestamp(_)
            | Self::InvalidBody(_)
            | Self::Storage(CoreError::InvalidInput(_)) => StatusCode::BAD_REQUEST,
            Self::UnknownSource(_) | Self::RouteNotFound => StatusCode::NOT_FOUND,
            Self::ReadUnsupported(_) | Self::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            Self::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            Self::Rejected(status) => *status,
            Self::RequestTimeout(_) | Self::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Builds the envelope sent to the caller.
    pub fn body(&self) -> ErrorBody {
        let message = match self {
            Self::Storage(CoreError::InvalidInput(message)) => message.clone(),
            other if other.status().is_server_error() => INTERNAL_ERROR_MESSAGE.to_string(),
            other => other.to_string(),
        };
        ErrorBody { success: false, error: Some(message), code: Some(self.code()) }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(code = self.code(), error = %self, "Request failed");
        }

        (status, Json(self.body())).into_response()
    }
}
