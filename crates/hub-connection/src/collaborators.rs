//! Interfaces the connection manager consumes.
//!
//! Implementations live outside this crate: the session layer provides the
//! identity, the push client provides the transport and the notification
//! API provides the unread count.

use futures_util::future::BoxFuture;

use crate::error::TransportError;
use crate::types::UserId;

/// Source of the currently authenticated user.
///
/// Queried once per trigger before the manager takes its state lock, so
/// implementations may read manager state.
pub trait IdentityProvider: Send + Sync {
    fn current_user_id(&self) -> Option<UserId>;
}

/// Persistent channel to the push-notification backend.
pub trait Transport: Send + Sync {
    /// Opens the connection for `user`. `Ok(false)` and `Err` are both
    /// treated as a failed attempt.
    fn connect<'a>(&'a self, user: &'a UserId) -> BoxFuture<'a, Result<bool, TransportError>>;

    /// Whether the underlying channel is currently open.
    fn is_connected(&self) -> bool;
}

/// Fetches the number of unread notifications. Valid only once connected.
pub trait UnreadFetcher: Send + Sync {
    fn fetch_unread(&self) -> BoxFuture<'_, Result<u64, TransportError>>;
}
