//! Error types for the hub connection manager.

/// Errors reported by a [`Transport`](crate::Transport) or
/// [`UnreadFetcher`](crate::UnreadFetcher).
///
/// The manager never returns these to its callers: connect errors count as
/// a failed attempt and fetch errors are logged.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("connection failed: {0}")]
    Connect(String),

    #[error("unread fetch failed: {0}")]
    Fetch(String),

    #[error("request timed out")]
    Timeout,

    #[error("transport closed")]
    Closed,
}

/// Errors from loading or validating a [`HubConfig`](crate::HubConfig).
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}
