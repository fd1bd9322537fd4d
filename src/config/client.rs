//! Event collector (client side) configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::collector::{
    DEFAULT_BATCH_SIZE, DEFAULT_RETRY_DELAY, DEFAULT_SEND_INTERVAL, NAVIGATION_EVENT,
};

use super::validation::ConfigError;

/// Upper bound for `send_interval` and `retry_delay`.
pub const MAX_CLIENT_DELAY: Duration = Duration::from_secs(24 * 60 * 60);

fn default_navigation_event() -> String {
    NAVIGATION_EVENT.to_string()
}

fn default_batch_size() -> usize {
    DEFAULT_BATCH_SIZE
}

fn default_send_interval() -> Duration {
    DEFAULT_SEND_INTERVAL
}

fn default_retry_delay() -> Duration {
    DEFAULT_RETRY_DELAY
}

/// Configuration for an event [`Collector`](crate::collector::Collector).
///
/// The endpoint is fixed for the collector's lifetime.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectorConfig {
    /// Absolute URL of the ingest endpoint.
    pub endpoint: String,

    /// Event name that triggers the unload flush (default: "click-link").
    #[serde(default = "default_navigation_event")]
    pub navigation_event: String,

    /// Buffered events that trigger an immediate send (default: 3).
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Minimum spacing between normal-path sends (default: 1s).
    #[serde(default = "default_send_interval", with = "humantime_serde")]
    pub send_interval: Duration,

    /// Wait before retrying a failed batch (default: 1s).
    #[serde(default = "default_retry_delay", with = "humantime_serde")]
    pub retry_delay: Duration,

    /// Per-request timeout; unset leaves the transport default.
    #[serde(default, with = "humantime_serde")]
    pub request_timeout: Option<Duration>,
}

impl CollectorConfig {
    /// Create a configuration with default send policy.
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            navigation_event: default_navigation_event(),
            batch_size: DEFAULT_BATCH_SIZE,
            send_interval: DEFAULT_SEND_INTERVAL,
            retry_delay: DEFAULT_RETRY_DELAY,
            request_timeout: None,
        }
    }

    /// Set the navigation-intent marker.
    pub fn with_navigation_event(mut self, event: impl Into<String>) -> Self {
        self.navigation_event = event.into();
        self
    }

    /// Set the size trigger.
    pub fn with_batch_size(mut self, size: usize) -> Self {
        self.batch_size = size;
        self
    }

    /// Set the time trigger.
    pub fn with_send_interval(mut self, interval: Duration) -> Self {
        self.send_interval = interval;
        self
    }

    /// Set the retry backoff.
    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    /// Set a per-request timeout.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    /// Validate configuration values.
    ///
    /// # Errors
    /// Returns `ConfigError::ValidationError` if the endpoint is not an absolute
    /// http(s) URL, the batch size is zero, or a delay exceeds one day.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let url = reqwest::Url::parse(&self.endpoint).map_err(|e| {
            ConfigError::ValidationError(format!("invalid endpoint '{}': {}", self.endpoint, e))
        })?;

        if !matches!(url.scheme(), "http" | "https") {
            return Err(ConfigError::ValidationError(format!(
                "endpoint must use http or https: '{}'",
                self.endpoint
            )));
        }

        if self.batch_size == 0 {
            return Err(ConfigError::ValidationError(
                "client batch_size must be positive".to_string(),
            ));
        }

        if self.navigation_event.is_empty() {
            return Err(ConfigError::ValidationError(
                "client navigation_event cannot be empty".to_string(),
            ));
        }

        for (name, value) in [
            ("send_interval", self.send_interval),
            ("retry_delay", self.retry_delay),
        ] {
            if value > MAX_CLIENT_DELAY {
                return Err(ConfigError::ValidationError(format!(
                    "client {} must not exceed {}, got {}",
                    name,
                    humantime::format_duration(MAX_CLIENT_DELAY),
                    humantime::format_duration(value)
                )));
            }
        }

        Ok(())
    }
}
