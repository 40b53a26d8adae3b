//! # Session Guard Library
//!
//! Authenticated HTTP client session layer: attaches the bearer credential
//! to outgoing requests, detects credential expiry, and renews the
//! credential once for every request that failed concurrently.
//!
//! Modules:
//! - `session` — attacher, classifier, single-flight refresh coordinator, retry, teardown
//! - `cache` — credential store and its durable storage backends
//! - `transport` — request/response types and the reqwest transport
//! - `config` — YAML configuration, defaults and validation

pub mod cache;
pub mod config;
pub mod error;
pub mod helpers;
pub mod observability;
pub mod session;
pub mod transport;
pub mod utils;

#[cfg(test)]
pub mod tests;

pub use crate::cache::credential::{Credential, UserIdentity};
pub use crate::config::session::ServiceConfig;
pub use crate::error::SessionError;
pub use crate::session::SessionClient;
