//! HTTP transport for the remote execution service.
//!
//! Provides:
//! - Wire protocol types for the four session endpoints
//! - Forgery-protection token sourcing (explicit, env, page meta tag)
//! - `HttpTransport`, a reqwest implementation of `ExecutionTransport`

pub mod config;
pub mod csrf;
pub mod http;
pub mod protocol;

pub use config::{Endpoints, TransportConfig};
pub use csrf::{CsrfToken, csrf_token_from_meta};
pub use http::HttpTransport;

/// Error raised while building a transport.
#[derive(Debug, thiserror::Error)]
pub enum ConstructionError {
    #[error("forgery-protection token is missing; refusing to initialize")]
    MissingToken,
    #[error("invalid transport configuration: {0}")]
    InvalidConfig(String),
    #[error("http client error: {0}")]
    Client(#[from] reqwest::Error),
}
