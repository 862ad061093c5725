//! Test infrastructure for driving the docgate router in-process.
//!
//! A [`TestEnv`] wires the real router to an in-memory document store and a
//! controllable clock, so integration tests exercise routing, middleware,
//! handlers and storage semantics without a database or a socket.

#![warn(missing_docs)]
#![forbid(unsafe_code)]

use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{
    body::{to_bytes, Body},
    http::{header, HeaderMap, Method, Request, StatusCode},
    Router,
};
use docgate_api::{
    create_router, default_sources, ApiKeyAuth, AppState, Limits, SourceConfig, SourceRegistry,
    API_KEY_HEADER,
};
use docgate_core::{storage::MemoryDocumentStore, DocumentStore, TestClock};
use serde_json::Value;
use tower::ServiceExt;

/// API key accepted by environments built with the default secret.
pub const TEST_API_KEY: &str = "test-secret";

/// Builder for configuring a [`TestEnv`].
pub struct TestEnvBuilder {
    sources: Vec<SourceConfig>,
    secret: Option<String>,
    auth_error_message: bool,
    store: Option<Arc<dyn DocumentStore>>,
    limits: Limits,
}

impl Default for TestEnvBuilder {
    fn default() -> Self {
        Self {
            sources: default_sources(),
            secret: Some(TEST_API_KEY.to_string()),
            auth_error_message: true,
            store: None,
            limits: Limits::default(),
        }
    }
}

impl TestEnvBuilder {
    /// Creates a new builder with the built-in sources.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the source descriptors.
    #[must_use]
    pub fn sources(mut self, sources: Vec<SourceConfig>) -> Self {
        self.sources = sources;
        self
    }

    /// Sets the shared secret. `None` leaves the gateway unconfigured.
    #[must_use]
    pub fn secret(mut self, secret: Option<&str>) -> Self {
        self.secret = secret.map(str::to_string);
        self
    }

    /// Omits the `error` field from 401 bodies.
    #[must_use]
    pub fn without_auth_message(mut self) -> Self {
        self.auth_error_message = false;
        self
    }

    /// Serves requests from `store` instead of the in-memory store.
    #[must_use]
    pub fn store(mut self, store: Arc<dyn DocumentStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Overrides request limits and deadlines.
    #[must_use]
    pub fn limits(mut self, limits: Limits) -> Self {
        self.limits = limits;
        self
    }

    /// Builds the environment.
    ///
    /// # Errors
    ///
    /// Fails if a source descriptor is invalid.
    pub fn build(self) -> Result<TestEnv> {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("error")),
            )
            .with_test_writer()
            .try_init();

        let clock = TestClock::new();
        let memory = Arc::new(MemoryDocumentStore::new());
        let store: Arc<dyn DocumentStore> = match self.store {
            Some(store) => store,
            None => Arc::clone(&memory) as Arc<dyn DocumentStore>,
        };
        let sources =
            SourceRegistry::from_configs(&self.sources).context("invalid test source config")?;
        let auth = ApiKeyAuth::new(self.secret.as_deref(), self.auth_error_message);

        let state = AppState::new(store, Arc::new(clock.clone()), sources, auth, self.limits);

        Ok(TestEnv { clock, store: memory, api_key: self.secret, state })
    }
}

/// In-process environment for exercising the HTTP surface.
pub struct TestEnv {
    /// Clock stamping `last_changed_at`; advance it between writes
    pub clock: TestClock,
    /// In-memory store backing the router unless overridden
    pub store: Arc<MemoryDocumentStore>,
    api_key: Option<String>,
    state: AppState,
}

impl TestEnv {
    /// Environment with the built-in sources and [`TEST_API_KEY`].
    ///
    /// # Errors
    ///
    /// See [`TestEnvBuilder::build`].
    pub fn new() -> Result<Self> {
        TestEnvBuilder::new().build()
    }

    /// Starts configuring a custom environment.
    pub fn builder() -> TestEnvBuilder {
        TestEnvBuilder::new()
    }

    /// A fresh router over this environment's state.
    pub fn router(&self) -> Router {
        create_router(self.state.clone())
    }

    /// Request builder carrying the configured API key.
    pub fn authed(&self, method: Method, uri: &str) -> axum::http::request::Builder {
        let builder = Request::builder().method(method).uri(uri);
        match &self.api_key {
            Some(key) => builder.header(API_KEY_HEADER, key.as_str()),
            None => builder,
        }
    }

    /// Authenticated `POST` of a JSON value.
    ///
    /// # Errors
    ///
    /// Fails if the request cannot be built or the body cannot be read.
    pub async fn post_json(&self, uri: &str, body: &Value) -> Result<TestResponse> {
        self.post_raw(uri, serde_json::to_string(body)?).await
    }

    /// Authenticated `POST` of an arbitrary body labelled as JSON.
    ///
    /// # Errors
    ///
    /// Fails if the request cannot be built or the body cannot be read.
    pub async fn post_raw(&self, uri: &str, body: impl Into<Body>) -> Result<TestResponse> {
        let request = self
            .authed(Method::POST, uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(body.into())?;
        self.send(request).await
    }

    /// Authenticated `GET`.
    ///
    /// # Errors
    ///
    /// Fails if the request cannot be built or the body cannot be read.
    pub async fn get(&self, uri: &str) -> Result<TestResponse> {
        let request = self.authed(Method::GET, uri).body(Body::empty())?;
        self.send(request).await
    }

    /// Sends a prepared request through the router.
    ///
    /// # Errors
    ///
    /// Fails if the response body cannot be read.
    pub async fn send(&self, request: Request<Body>) -> Result<TestResponse> {
        let response = self.router().oneshot(request).await?;

        let status = response.status();
        let headers = response.headers().clone();
        let bytes = to_bytes(response.into_body(), usize::MAX).await?;
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes)
                .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()))
        };

        Ok(TestResponse { status, headers, body })
    }
}

/// Captured response.
#[derive(Debug)]
pub struct TestResponse {
    /// Status code
    pub status: StatusCode,
    /// Response headers
    pub headers: HeaderMap,
    /// Parsed JSON body, a string for non-JSON bodies, `null` when empty
    pub body: Value,
}

impl TestResponse {
    /// Asserts the status code, printing the body on mismatch.
    #[track_caller]
    pub fn assert_status(&self, expected: StatusCode) -> &Self {
        assert_eq!(self.status, expected, "unexpected status, body: {}", self.body);
        self
    }

    /// The `error` field of a failure envelope.
    pub fn error_message(&self) -> Option<&str> {
        self.body.get("error").and_then(Value::as_str)
    }

    /// The `code` field of a failure envelope.
    pub fn error_code(&self) -> Option<&str> {
        self.body.get("code").and_then(Value::as_str)
    }
}
