//! Connection manager keeping the notification hub connected.
//!
//! Every trigger (application start, foreground transition, periodic tick,
//! manual refresh) funnels into the same guarded attempt routine, which
//! applies the in-flight guard, the throttle and the attempt cap before
//! calling the transport. Failures are retried with exponential backoff.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::collaborators::{IdentityProvider, Transport, UnreadFetcher};
use crate::config::HubConfig;
use crate::pumps::lifecycle::{Subscription, lifecycle_pump};
use crate::pumps::poll::poll_pump;
use crate::reconnection::{HubContext, attempt, refresh_unread, spawn_unread_refresh};
use crate::state::{AttemptOrigin, ConnectionState};
use crate::timer::{Scheduler, TokioScheduler};
use crate::types::{ConnectionEvent, ConnectionSnapshot, ConnectionStatus, LifecycleEvent};

/// Connection manager for the per-user notification hub connection.
///
/// Operations never fail: connect errors turn into backoff retries and
/// fetch errors are logged. Dropping the manager shuts it down.
pub struct ConnectionManager {
    ctx: HubContext,
    events_rx: Mutex<Option<mpsc::Receiver<ConnectionEvent>>>,
    poll_started: AtomicBool,
}

impl ConnectionManager {
    /// Creates a new connection manager driven by the tokio clock.
    pub fn new(
        identity: Arc<dyn IdentityProvider>,
        transport: Arc<dyn Transport>,
        fetcher: Arc<dyn UnreadFetcher>,
        config: &HubConfig,
    ) -> Self {
        let (events_tx, events_rx) = mpsc::channel(config.event_buffer.max(1));

        Self {
            ctx: HubContext {
                identity,
                transport,
                fetcher,
                scheduler: Arc::new(TokioScheduler),
                policy: config.policy(),
                state: Arc::new(Mutex::new(ConnectionState::new())),
                events_tx,
                shutdown: CancellationToken::new(),
            },
            events_rx: Mutex::new(Some(events_rx)),
            poll_started: AtomicBool::new(false),
        }
    }

    /// Replaces the clock/timer service: throttle, retry delays, the connect
    /// timeout and the poll interval all follow it. Must be called before
    /// any trigger.
    pub fn with_scheduler(mut self, scheduler: Arc<dyn Scheduler>) -> Self {
        self.ctx.scheduler = scheduler;
        self
    }

    /// Takes the event receiver. Can only be called once.
    pub fn take_events(&self) -> Option<mpsc::Receiver<ConnectionEvent>> {
        self.events_rx
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take()
    }

    /// Application start: spawns the periodic poll pump and makes the
    /// first connect attempt. Later calls only repeat the attempt.
    pub async fn start(&self) {
        if !self.poll_started.swap(true, Ordering::SeqCst) {
            let period = self.ctx.policy.poll_interval;
            tokio::spawn(poll_pump(
                self.ctx.clone(),
                period,
                self.ctx.shutdown.child_token(),
            ));
            info!(poll_secs = period.as_secs(), "notification hub manager started");
        }
        self.ensure_connected().await;
    }

    /// Forwards lifecycle transitions from `events` to the manager until the
    /// returned [`Subscription`] is dropped or the sender closes.
    pub fn attach_lifecycle(&self, events: mpsc::Receiver<LifecycleEvent>) -> Subscription {
        let cancel = self.ctx.shutdown.child_token();
        tokio::spawn(lifecycle_pump(self.ctx.clone(), events, cancel.clone()));
        Subscription::new(cancel)
    }

    /// Connects unless already connected, connecting, throttled, capped or
    /// signed out. Safe to call at any time.
    pub async fn ensure_connected(&self) {
        attempt(self.ctx.clone(), AttemptOrigin::Trigger).await;
    }

    /// Starts a fresh retry cycle: cancels the pending retry, zeroes the
    /// attempt counter, then reconnects if needed. The throttle still
    /// applies to the reconnect.
    ///
    /// Call on sign-in, sign-out and manual refresh.
    pub async fn reset_attempts(&self) {
        let connected = {
            let mut state = self.ctx.lock_state();
            state.cancel_pending_retry();
            state.reset_streak();
            state.status == ConnectionStatus::Connected
        };
        debug!(connected, "connection attempts reset");

        if !connected {
            self.ensure_connected().await;
        }
    }

    /// The application returned to the foreground.
    pub async fn on_foreground(&self) {
        on_foreground(&self.ctx).await;
    }

    /// The application moved to the background.
    pub fn on_background(&self) {
        on_background(&self.ctx);
    }

    /// One tick of the periodic safety net.
    pub async fn on_periodic_tick(&self) {
        on_periodic_tick(&self.ctx).await;
    }

    /// The transport reported that an established connection dropped.
    ///
    /// No reconnect is started here; the next trigger re-evaluates.
    pub fn on_transport_dropped(&self) {
        let mut state = self.ctx.lock_state();
        if state.status == ConnectionStatus::Connected {
            state.status = ConnectionStatus::Disconnected;
            self.ctx
                .emit(ConnectionEvent::StateChanged(ConnectionStatus::Disconnected));
            info!("notification hub connection dropped");
        }
    }

    /// Fetches the unread count now. No-op unless connected.
    pub async fn refresh_unread(&self) {
        refresh_unread(self.ctx.clone()).await;
    }

    /// Whether the hub is connected.
    pub fn is_connected(&self) -> bool {
        let state = self.ctx.lock_state();
        self.ctx.is_connected(&state)
    }

    /// Last fetched unread count.
    pub fn unread_count(&self) -> u64 {
        self.ctx.lock_state().unread
    }

    pub fn status(&self) -> ConnectionStatus {
        self.ctx.lock_state().status
    }

    pub fn snapshot(&self) -> ConnectionSnapshot {
        self.ctx.lock_state().snapshot()
    }

    /// Cancels the pending retry and every pump. Idempotent.
    pub fn shutdown(&self) {
        self.ctx.shutdown.cancel();
        let mut state = self.ctx.lock_state();
        if state.shut_down {
            return;
        }
        state.shut_down = true;
        state.cancel_pending_retry();
        info!("connection manager shut down");
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Foreground return is a fresh opportunity, not a continuation of a
/// failed streak: the counter is zeroed before deciding.
pub(crate) async fn on_foreground(ctx: &HubContext) {
    let connected = {
        let mut state = ctx.lock_state();
        if state.shut_down {
            return;
        }
        state.foreground = true;
        state.reset_streak();
        ctx.is_connected(&state)
    };
    debug!(connected, "application in foreground");

    if connected {
        spawn_unread_refresh(ctx.clone());
    } else {
        attempt(ctx.clone(), AttemptOrigin::Trigger).await;
    }
}

pub(crate) fn on_background(ctx: &HubContext) {
    ctx.lock_state().foreground = false;
    debug!("application in background");
}

/// Refreshes while connected; reconnects only when idle and not backing off.
pub(crate) async fn on_periodic_tick(ctx: &HubContext) {
    let (connected, idle) = {
        let state = ctx.lock_state();
        if state.shut_down {
            return;
        }
        (
            ctx.is_connected(&state),
            !state.in_flight && state.attempt_count == 0,
        )
    };

    if connected {
        spawn_unread_refresh(ctx.clone());
    } else if idle {
        attempt(ctx.clone(), AttemptOrigin::Trigger).await;
    } else {
        debug!("periodic tick skipped, retry cycle in progress");
    }
}
