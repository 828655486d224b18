//! Hub connection configuration.
//!
//! Stored as TOML. Every field is optional and falls back to its default:
//!
//! ```toml
//! max_attempts = 5
//! throttle_ms = 5000
//! initial_retry_ms = 1000
//! max_retry_ms = 30000
//! backoff_factor = 2.0
//! poll_interval_secs = 30
//! connect_timeout_secs = 15
//! event_buffer = 64
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::ConfigError;
use crate::types::RetryPolicy;

/// Hub connection configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HubConfig {
    /// Consecutive failures after which automatic retries stop.
    pub max_attempts: u32,
    /// Minimum gap between trigger-started attempts, in milliseconds.
    pub throttle_ms: u64,
    /// First backoff delay, in milliseconds.
    pub initial_retry_ms: u64,
    /// Backoff cap, in milliseconds.
    pub max_retry_ms: u64,
    pub backoff_factor: f64,
    /// Periodic safety-net interval, in seconds.
    pub poll_interval_secs: u64,
    pub connect_timeout_secs: u64,
    /// Capacity of the connection event channel.
    pub event_buffer: usize,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            throttle_ms: 5_000,
            initial_retry_ms: 1_000,
            max_retry_ms: 30_000,
            backoff_factor: 2.0,
            poll_interval_secs: 30,
            connect_timeout_secs: 15,
            event_buffer: 64,
        }
    }
}

impl HubConfig {
    /// Loads configuration from `path`, or the defaults if the file does
    /// not exist.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            debug!(path = ?path, "no hub config found, using defaults");
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        let config = Self::from_toml_str(&content)?;
        debug!(path = ?path, "hub config loaded");
        Ok(config)
    }

    /// Parses and validates a TOML document.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: HubConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Rejects values that would disable the retry or polling machinery.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_attempts == 0 {
            return Err(ConfigError::Invalid("max_attempts must be at least 1".into()));
        }
        if self.initial_retry_ms == 0 {
            return Err(ConfigError::Invalid("initial_retry_ms must be positive".into()));
        }
        if self.max_retry_ms < self.initial_retry_ms {
            return Err(ConfigError::Invalid(
                "max_retry_ms must not be below initial_retry_ms".into(),
            ));
        }
        if self.backoff_factor.is_nan() || self.backoff_factor < 1.0 {
            return Err(ConfigError::Invalid("backoff_factor must be >= 1.0".into()));
        }
        if self.poll_interval_secs == 0 {
            return Err(ConfigError::Invalid("poll_interval_secs must be positive".into()));
        }
        if self.connect_timeout_secs == 0 {
            return Err(ConfigError::Invalid("connect_timeout_secs must be positive".into()));
        }
        if self.event_buffer == 0 {
            return Err(ConfigError::Invalid("event_buffer must be positive".into()));
        }
        Ok(())
    }

    /// Runtime retry policy derived from this configuration.
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            throttle: Duration::from_millis(self.throttle_ms),
            initial_delay: Duration::from_millis(self.initial_retry_ms),
            max_delay: Duration::from_millis(self.max_retry_ms),
            backoff_factor: self.backoff_factor,
            poll_interval: Duration::from_secs(self.poll_interval_secs),
            connect_timeout: Duration::from_secs(self.connect_timeout_secs),
        }
    }
}
