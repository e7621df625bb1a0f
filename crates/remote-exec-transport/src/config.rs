//! Transport configuration: service location, endpoint paths, token header.

use std::net::IpAddr;

use url::Url;

use crate::{ConstructionError, csrf::DEFAULT_TOKEN_HEADER};

/// Environment variable that overrides the service base URL.
pub const BASE_URL_ENV: &str = "REMOTE_EXEC_BASE_URL";

/// Endpoint paths, relative to the base URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    pub start_session: String,
    pub get_output: String,
    pub send_input: String,
    pub end_session: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            start_session: "start-session".into(),
            get_output: "get-output".into(),
            send_input: "send-input".into(),
            end_session: "end-session".into(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct TransportConfig {
    base_url: Url,
    endpoints: Endpoints,
    token_header: String,
}

impl TransportConfig {
    /// Build a config for the service at `base`.
    ///
    /// Bare hosts get `http://` when local and `https://` otherwise.
    ///
    /// # Errors
    /// Returns `InvalidConfig` if `base` is empty or not a URL.
    pub fn new(base: impl AsRef<str>) -> Result<Self, ConstructionError> {
        let mut base = base.as_ref().trim().to_string();
        if base.is_empty() {
            return Err(ConstructionError::InvalidConfig(
                "service base url cannot be empty".into(),
            ));
        }
        if !base.contains("://") {
            base = format!("{}{base}", infer_scheme(&base));
        }
        // Url::join replaces the last segment unless the path ends in '/'.
        if !base.ends_with('/') {
            base.push('/');
        }
        let base_url = Url::parse(&base).map_err(|err| {
            ConstructionError::InvalidConfig(format!("invalid service url: {err}"))
        })?;
        Ok(Self {
            base_url,
            endpoints: Endpoints::default(),
            token_header: DEFAULT_TOKEN_HEADER.to_string(),
        })
    }

    /// Like [`TransportConfig::new`], preferring `REMOTE_EXEC_BASE_URL` when set.
    ///
    /// # Errors
    /// Returns `InvalidConfig` if the chosen URL is invalid.
    pub fn from_env(default_base: impl AsRef<str>) -> Result<Self, ConstructionError> {
        let base = std::env::var(BASE_URL_ENV)
            .ok()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| default_base.as_ref().to_string());
        Self::new(base)
    }

    #[must_use]
    pub fn with_endpoints(mut self, endpoints: Endpoints) -> Self {
        self.endpoints = endpoints;
        self
    }

    #[must_use]
    pub fn with_token_header(mut self, header: impl Into<String>) -> Self {
        self.token_header = header.into();
        self
    }

    #[must_use]
    pub const fn base_url(&self) -> &Url {
        &self.base_url
    }

    #[must_use]
    pub const fn endpoints(&self) -> &Endpoints {
        &self.endpoints
    }

    #[must_use]
    pub fn token_header(&self) -> &str {
        &self.token_header
    }

    /// Resolve an endpoint path against the base URL.
    ///
    /// # Errors
    /// Returns `InvalidConfig` if the path cannot be joined.
    pub fn endpoint(&self, path: &str) -> Result<Url, ConstructionError> {
        self.base_url.join(path).map_err(|err| {
            ConstructionError::InvalidConfig(format!("invalid endpoint {path}: {err}"))
        })
    }
}

fn infer_scheme(base: &str) -> &'static str {
    let authority = base.split(['/', '?', '#']).next().unwrap_or_default();
    let host = match authority.strip_prefix('[') {
        Some(bracketed) => bracketed.split(']').next().unwrap_or_default(),
        None => authority.split(':').next().unwrap_or_default(),
    };
    let local = host.eq_ignore_ascii_case("localhost")
        || host.parse::<IpAddr>().is_ok_and(|ip| match ip {
            IpAddr::V4(v4) => v4.is_loopback() || v4.is_private() || v4.is_unspecified(),
            IpAddr::V6(v6) => v6.is_loopback(),
        });
    if local { "http://" } else { "https://" }
}
