//! HTTP middleware for request authentication and error envelopes.
//!
//! Every `/api` route passes through the shared-secret check before any
//! handler or storage code runs. Error responses built by the framework are
//! rewritten into the JSON envelope on the way out.
pub mod auth;
pub mod envelope;
