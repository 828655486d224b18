//! Public types for the hub connection manager.

use std::fmt;
use std::time::Duration;

/// Identifier of the authenticated user the hub connection belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct UserId(pub String);

impl UserId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Connection status of the notification hub.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionStatus {
    /// No connection and no attempt in flight.
    #[default]
    Disconnected,
    /// A connect call is in flight.
    Connecting,
    /// Connected to the hub.
    Connected,
}

/// Application lifecycle transitions delivered to the manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleEvent {
    Foreground,
    Background,
}

/// Events emitted by the connection manager.
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionEvent {
    /// The connection status changed.
    StateChanged(ConnectionStatus),
    /// A connect attempt failed and a retry is scheduled.
    RetryScheduled { attempt: u32, delay: Duration },
    /// The attempt cap was reached; no retry is scheduled.
    RetriesExhausted { attempts: u32 },
    /// A fresh unread count was fetched.
    UnreadChanged { count: u64 },
}

/// Point-in-time view of the manager state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionSnapshot {
    pub status: ConnectionStatus,
    pub attempt_count: u32,
    pub retry_pending: bool,
    pub in_flight: bool,
    pub unread: u64,
    pub foreground: bool,
}

/// Retry, throttle and polling policy with exponential backoff.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Consecutive failures after which automatic retries stop.
    pub max_attempts: u32,
    /// Minimum interval between two trigger-started attempts.
    pub throttle: Duration,
    /// Delay before the retry following the first failure.
    pub initial_delay: Duration,
    /// Maximum delay between attempts (backoff cap).
    pub max_delay: Duration,
    /// Multiplier for each subsequent attempt.
    pub backoff_factor: f64,
    /// Interval of the periodic safety-net tick.
    pub poll_interval: Duration,
    /// Upper bound on a single connect call.
    pub connect_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            throttle: Duration::from_secs(5),
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            backoff_factor: 2.0,
            poll_interval: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(15),
        }
    }
}

impl RetryPolicy {
    /// Calculates the retry delay after the given number of consecutive
    /// failures (1-based): `min(initial * factor^(n-1), max)`.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(63) as i32;
        let millis = self.initial_delay.as_millis() as f64 * self.backoff_factor.powi(exp);
        let capped = millis.min(self.max_delay.as_millis() as f64);
        Duration::from_millis(capped as u64)
    }

    /// Whether the cap has been reached after `attempt_count` failures.
    pub fn exhausted(&self, attempt_count: u32) -> bool {
        attempt_count >= self.max_attempts
    }
}
