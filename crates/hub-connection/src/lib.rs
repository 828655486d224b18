//! Notification hub connection manager.
//!
//! Keeps a per-user push-notification connection alive across foreground
//! and background transitions, retries failures with bounded exponential
//! backoff, throttles reconnects and polls for unread items.

pub mod collaborators;
pub mod config;
pub mod error;
pub mod manager;
pub(crate) mod reconnection;
pub(crate) mod state;
pub mod timer;
pub mod types;

pub(crate) mod pumps {
    pub(crate) mod lifecycle;
    pub(crate) mod poll;
}

#[cfg(test)]
pub(crate) mod test_support;

pub use collaborators::{IdentityProvider, Transport, UnreadFetcher};
pub use config::HubConfig;
pub use error::{ConfigError, TransportError};
pub use manager::ConnectionManager;
pub use pumps::lifecycle::Subscription;
pub use timer::{Scheduler, TimerHandle, TokioScheduler};
pub use types::{
    ConnectionEvent, ConnectionSnapshot, ConnectionStatus, LifecycleEvent, RetryPolicy, UserId,
};
