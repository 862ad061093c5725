//! Error envelopes for responses the framework builds itself.
//!
//! Body-limit rejections, method mismatches, unmatched routes and the
//! router-level timeout are produced by axum and tower-http as plain text
//! or empty bodies. This layer rewrites any error response that is not
//! already JSON into the `{success: false, error, code}` envelope.

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};

use crate::{error::ApiError, state::AppState};

/// Rewrites non-JSON error responses into `ErrorBody` envelopes.
///
/// The `Allow` header of a 405 survives the rewrite.
pub async fn envelope_errors(State(state): State<AppState>, response: Response) -> Response {
    let status = response.status();
    if !(status.is_client_error() || status.is_server_error()) || is_json(&response) {
        return response;
    }

    let error = match status {
        StatusCode::PAYLOAD_TOO_LARGE => {
            ApiError::PayloadTooLarge { limit: state.limits.max_body_bytes }
        },
        StatusCode::METHOD_NOT_ALLOWED => ApiError::MethodNotAllowed,
        StatusCode::NOT_FOUND => ApiError::RouteNotFound,
        StatusCode::REQUEST_TIMEOUT => ApiError::RequestTimeout(state.limits.request_timeout),
        other => ApiError::Rejected(other),
    };

    let allow = response.headers().get(header::ALLOW).cloned();
    let mut rewritten = error.into_response();
    if let Some(allow) = allow {
        rewritten.headers_mut().insert(header::ALLOW, allow);
    }
    rewritten
}

fn is_json(response: &Response) -> bool {
    response
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value.starts_with("application/json"))
}
