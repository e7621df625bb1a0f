//! Client configuration: polling cadence, retry budget and init retries.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Session client configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Delay between successful polls.
    pub poll_interval: Duration,
    /// Base of the exponential backoff after a failed poll.
    pub retry_base_delay: Duration,
    /// Consecutive poll failures that end the session.
    pub max_retries: u32,
    /// Attempts to locate the UI hooks during `init`.
    pub init_attempts: u32,
    /// Delay between UI hook lookups.
    pub init_retry_delay: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(100),
            retry_base_delay: Duration::from_millis(500),
            max_retries: 5,
            init_attempts: 10,
            init_retry_delay: Duration::from_millis(100),
        }
    }
}

impl ClientConfig {
    /// Defaults overridden by `REMOTE_EXEC_*` environment variables.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Defaults overridden by values from `lookup`.
    ///
    /// Unparseable values are logged and ignored.
    #[must_use]
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();
        if let Some(ms) = parse_var::<u64>(&lookup, "REMOTE_EXEC_POLL_INTERVAL_MS") {
            config.poll_interval = Duration::from_millis(ms);
        }
        if let Some(ms) = parse_var::<u64>(&lookup, "REMOTE_EXEC_RETRY_BASE_MS") {
            config.retry_base_delay = Duration::from_millis(ms);
        }
        if let Some(n) = parse_var::<u32>(&lookup, "REMOTE_EXEC_MAX_RETRIES") {
            config.max_retries = n;
        }
        config
    }

    #[must_use]
    pub const fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    #[must_use]
    pub const fn with_retry_base_delay(mut self, delay: Duration) -> Self {
        self.retry_base_delay = delay;
        self
    }

    #[must_use]
    pub const fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    #[must_use]
    pub const fn with_init_retries(mut self, attempts: u32, delay: Duration) -> Self {
        self.init_attempts = attempts;
        self.init_retry_delay = delay;
        self
    }

    /// Delay before the next poll after `attempt` consecutive failures.
    #[must_use]
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        2u32.checked_pow(attempt)
            .and_then(|factor| self.retry_base_delay.checked_mul(factor))
            .unwrap_or(Duration::MAX)
    }
}

fn parse_var<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
) -> Option<T> {
    let raw = lookup(key)?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!(key, value = %raw, "ignoring unparseable config value");
            None
        }
    }
}
