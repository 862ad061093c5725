//! Shared-secret authentication middleware.
//!
//! Callers prove knowledge of the configured secret through the `x-api-key`
//! header. Both sides are hashed with SHA-256 and the digests compared
//! without early exit, so response timing reveals neither the secret's
//! content nor its length.

use axum::{
    body::Body,
    extract::State,
    http::{HeaderMap, Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use sha2::{Digest, Sha256};
use tracing::warn;

use crate::{error::ErrorBody, state::AppState};

/// Header carrying the caller's credential.
pub const API_KEY_HEADER: &str = "x-api-key";

/// Shared-secret authorizer.
#[derive(Debug, Clone)]
pub struct ApiKeyAuth {
    secret_digest: Option<[u8; 32]>,
    include_message: bool,
}

impl ApiKeyAuth {
    /// Creates an authorizer for `secret`.
    ///
    /// A missing or empty secret rejects every request. `include_message`
    /// controls whether 401 bodies carry `error: "Unauthorized"`.
    pub fn new(secret: Option<&str>, include_message: bool) -> Self {
        Self { secret_digest: secret.filter(|s| !s.is_empty()).map(digest), include_message }
    }

    /// Returns true iff `presented` is non-empty and equals the secret.
    pub fn authorize(&self, presented: Option<&str>) -> bool {
        let (Some(expected), Some(presented)) =
            (self.secret_digest.as_ref(), presented.filter(|p| !p.is_empty()))
        else {
            return false;
        };

        timing_safe_eq(expected, &digest(presented))
    }

    /// Builds the 401 response.
    pub fn reject(&self) -> Response {
        let body =
            if self.include_message { ErrorBody::message("Unauthorized") } else { ErrorBody::bare() };
        (StatusCode::UNAUTHORIZED, Json(body)).into_response()
    }
}

/// Extracts the API key from the `x-api-key` header.
fn extract_api_key(headers: &HeaderMap) -> Option<&str> {
    headers.get(API_KEY_HEADER).and_then(|v| v.to_str().ok())
}

fn digest(value: &str) -> [u8; 32] {
    Sha256::digest(value.as_bytes()).into()
}

fn timing_safe_eq(a: &[u8; 32], b: &[u8; 32]) -> bool {
    let mut result = 0u8;
    for (a_byte, b_byte) in a.iter().zip(b.iter()) {
        result |= a_byte ^ b_byte;
    }
    result == 0
}

/// Axum middleware rejecting requests without the shared secret.
pub async fn auth_middleware(
    State(state): State<AppState>,
    req: Request<Body>,
    next: Next,
) -> Response {
    let presented = extract_api_key(req.headers());

    if !state.auth.authorize(presented) {
        warn!(
            path = %req.uri().path(),
            header_present = presented.is_some(),
            "Rejected request with missing or invalid API key"
        );
        return state.auth.reject();
    }

    next.run(req).await
}
