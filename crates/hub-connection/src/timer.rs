//! Clock and delayed-task scheduling.
//!
//! Timers are tokio tasks guarded by a [`CancellationToken`]. Canceling a
//! timer that already fired or was already canceled is a no-op.

use std::time::Duration;

use futures_util::future::BoxFuture;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Handle to a scheduled task.
#[derive(Debug, Clone)]
pub struct TimerHandle {
    cancel: CancellationToken,
}

impl TimerHandle {
    pub fn new(cancel: CancellationToken) -> Self {
        Self { cancel }
    }

    /// Prevents the task from running if it has not started yet.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

/// Clock/timer service used by the manager for throttling and retries.
pub trait Scheduler: Send + Sync {
    /// Current monotonic time.
    fn now(&self) -> Instant;

    /// Runs `task` once after `delay` unless the returned handle is
    /// canceled first.
    fn schedule(&self, delay: Duration, task: BoxFuture<'static, ()>) -> TimerHandle;

    /// Completes once `duration` has elapsed on this clock.
    fn sleep(&self, duration: Duration) -> BoxFuture<'static, ()>;
}

/// [`Scheduler`] backed by `tokio::time`.
///
/// Follows the runtime clock, so paused test runtimes drive it too.
#[derive(Debug, Clone, Default)]
pub struct TokioScheduler;

impl Scheduler for TokioScheduler {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn schedule(&self, delay: Duration, task: BoxFuture<'static, ()>) -> TimerHandle {
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => return,
                _ = tokio::time::sleep(delay) => {}
            }
            if token.is_cancelled() {
                return;
            }
            task.await;
        });
        TimerHandle::new(cancel)
    }

    fn sleep(&self, duration: Duration) -> BoxFuture<'static, ()> {
        Box::pin(tokio::time::sleep(duration))
    }
}
