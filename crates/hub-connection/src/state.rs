//! Connection state owned by the manager and the rules that gate a new
//! connect attempt.

use std::time::Duration;

use tokio::time::Instant;

use crate::timer::TimerHandle;
use crate::types::{ConnectionSnapshot, ConnectionStatus, RetryPolicy};

/// What started a connect attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum AttemptOrigin {
    /// Application start, lifecycle event, periodic tick or a direct call.
    Trigger,
    /// A backoff retry timer firing.
    Retry,
}

/// Why an attempt was not started.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Skip {
    ShutDown,
    Connected,
    InFlight,
    Throttled { remaining: Duration },
    Exhausted { attempts: u32 },
}

#[derive(Debug)]
pub(crate) struct ConnectionState {
    pub(crate) status: ConnectionStatus,
    /// Consecutive failed attempts since the last success or reset.
    pub(crate) attempt_count: u32,
    /// Start of the most recent attempt, used for throttling.
    pub(crate) last_attempt_at: Option<Instant>,
    /// Scheduled backoff retry, keyed by retry id.
    pub(crate) pending_retry: Option<(u64, TimerHandle)>,
    pub(crate) next_retry_id: u64,
    /// Set for the whole duration of a connect call.
    pub(crate) in_flight: bool,
    pub(crate) unread: u64,
    pub(crate) foreground: bool,
    pub(crate) shut_down: bool,
}

impl ConnectionState {
    pub(crate) fn new() -> Self {
        Self {
            status: ConnectionStatus::Disconnected,
            attempt_count: 0,
            last_attempt_at: None,
            pending_retry: None,
            next_retry_id: 0,
            in_flight: false,
            unread: 0,
            foreground: true,
            shut_down: false,
        }
    }

    /// Decides whether a new attempt may start now.
    ///
    /// Retries are exempt from the throttle: their backoff delay already
    /// spaces them out.
    pub(crate) fn admit(
        &self,
        now: Instant,
        policy: &RetryPolicy,
        origin: AttemptOrigin,
    ) -> Result<(), Skip> {
        if self.shut_down {
            return Err(Skip::ShutDown);
        }
        if self.status == ConnectionStatus::Connected {
            return Err(Skip::Connected);
        }
        if self.in_flight {
            return Err(Skip::InFlight);
        }
        if origin == AttemptOrigin::Trigger
            && let Some(last) = self.last_attempt_at
        {
            let elapsed = now.saturating_duration_since(last);
            if elapsed < policy.throttle {
                return Err(Skip::Throttled {
                    remaining: policy.throttle - elapsed,
                });
            }
        }
        if policy.exhausted(self.attempt_count) {
            return Err(Skip::Exhausted {
                attempts: self.attempt_count,
            });
        }
        Ok(())
    }

    /// Marks an attempt as started and returns its 1-based attempt number.
    pub(crate) fn begin_attempt(&mut self, now: Instant) -> u32 {
        self.cancel_pending_retry();
        self.in_flight = true;
        self.last_attempt_at = Some(now);
        self.attempt_count = self.attempt_count.saturating_add(1);
        self.status = ConnectionStatus::Connecting;
        self.attempt_count
    }

    pub(crate) fn record_success(&mut self) {
        self.in_flight = false;
        self.status = ConnectionStatus::Connected;
        self.attempt_count = 0;
        self.cancel_pending_retry();
    }

    pub(crate) fn record_failure(&mut self) {
        self.in_flight = false;
        self.status = ConnectionStatus::Disconnected;
    }

    /// Restarts the failure streak. An attempt still in flight keeps
    /// counting as the first of the new streak.
    pub(crate) fn reset_streak(&mut self) {
        self.attempt_count = u32::from(self.in_flight);
    }

    /// Cancels the scheduled retry, if any. Returns whether one was pending.
    pub(crate) fn cancel_pending_retry(&mut self) -> bool {
        match self.pending_retry.take() {
            Some((_, handle)) => {
                handle.cancel();
                true
            }
            None => false,
        }
    }

    pub(crate) fn snapshot(&self) -> ConnectionSnapshot {
        ConnectionSnapshot {
            status: self.status,
            attempt_count: self.attempt_count,
            retry_pending: self.pending_retry.is_some(),
            in_flight: self.in_flight,
            unread: self.unread,
            foreground: self.foreground,
        }
    }
}
