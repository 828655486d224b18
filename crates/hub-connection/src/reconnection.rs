//! Connect attempts, backoff retries and unread refreshes.
//!
//! Contains the shared [`HubContext`] handed to spawned tasks, the attempt
//! routine every trigger funnels into, and the retry scheduling that
//! follows a failed attempt.

use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::collaborators::{IdentityProvider, Transport, UnreadFetcher};
use crate::error::TransportError;
use crate::state::{AttemptOrigin, ConnectionState};
use crate::timer::Scheduler;
use crate::types::{ConnectionEvent, ConnectionStatus, RetryPolicy};

/// Shared handles passed to spawned tasks (retry timers, pumps, refreshes).
#[derive(Clone)]
pub(crate) struct HubContext {
    pub(crate) identity: Arc<dyn IdentityProvider>,
    pub(crate) transport: Arc<dyn Transport>,
    pub(crate) fetcher: Arc<dyn UnreadFetcher>,
    pub(crate) scheduler: Arc<dyn Scheduler>,
    pub(crate) policy: RetryPolicy,
    pub(crate) state: Arc<Mutex<ConnectionState>>,
    pub(crate) events_tx: mpsc::Sender<ConnectionEvent>,
    /// Parent token of every pump; canceled on shutdown.
    pub(crate) shutdown: CancellationToken,
}

impl HubContext {
    /// Locks the state. The guard must never be held across an `.await`.
    pub(crate) fn lock_state(&self) -> MutexGuard<'_, ConnectionState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Emits an event without blocking; dropped if nobody is listening.
    pub(crate) fn emit(&self, event: ConnectionEvent) {
        if let Err(e) = self.events_tx.try_send(event) {
            trace!("connection event dropped: {e}");
        }
    }

    /// Whether the manager believes it is connected and the transport agrees.
    pub(crate) fn is_connected(&self, state: &ConnectionState) -> bool {
        state.status == ConnectionStatus::Connected && self.transport.is_connected()
    }
}

/// Runs one connect attempt if the current state allows it.
///
/// Returns a boxed future to break the recursive type cycle with
/// [`schedule_retry`], whose timer task calls back into this function.
pub(crate) fn attempt(
    ctx: HubContext,
    origin: AttemptOrigin,
) -> Pin<Box<dyn Future<Output = ()> + Send>> {
    Box::pin(async move {
        // Resolved outside the lock so the provider may query the manager.
        let user = ctx.identity.current_user_id();

        let started = {
            let mut state = ctx.lock_state();

            // A silent transport drop leaves the status stale.
            if state.status == ConnectionStatus::Connected && !ctx.transport.is_connected() {
                info!("transport no longer connected, marking hub disconnected");
                state.status = ConnectionStatus::Disconnected;
                ctx.emit(ConnectionEvent::StateChanged(ConnectionStatus::Disconnected));
            }

            let now = ctx.scheduler.now();
            match (state.admit(now, &ctx.policy, origin), user) {
                (Err(skip), _) => {
                    debug!(?origin, ?skip, "connect attempt skipped");
                    None
                }
                (Ok(()), None) => {
                    debug!(?origin, "no signed-in user, connect attempt skipped");
                    None
                }
                (Ok(()), Some(user)) => {
                    let attempt = state.begin_attempt(now);
                    ctx.emit(ConnectionEvent::StateChanged(ConnectionStatus::Connecting));
                    Some((user, attempt))
                }
            }
        };
        let Some((user, attempt)) = started else {
            return;
        };

        info!(user = %user, attempt, ?origin, "connecting to notification hub");

        let connect = ctx.transport.connect(&user);
        let deadline = ctx.scheduler.sleep(ctx.policy.connect_timeout);
        let outcome = tokio::select! {
            result = connect => Ok(result),
            _ = deadline => Err(TransportError::Timeout),
        };
        let connected = match outcome {
            Ok(Ok(true)) => true,
            Ok(Ok(false)) => {
                warn!(user = %user, attempt, "notification hub refused connection");
                false
            }
            Ok(Err(e)) | Err(e) => {
                warn!(user = %user, attempt, error = %e, "connect attempt failed");
                false
            }
        };

        if connected {
            on_connected(&ctx);
        } else {
            on_failed(&ctx);
        }
    })
}

fn on_connected(ctx: &HubContext) {
    {
        let mut state = ctx.lock_state();
        if state.shut_down {
            state.record_failure();
            debug!("connect finished after shutdown, result discarded");
            return;
        }
        state.record_success();
        ctx.emit(ConnectionEvent::StateChanged(ConnectionStatus::Connected));
    }
    info!("connected to notification hub");

    spawn_unread_refresh(ctx.clone());
}

fn on_failed(ctx: &HubContext) {
    let mut state = ctx.lock_state();
    state.record_failure();
    if state.shut_down {
        return;
    }
    ctx.emit(ConnectionEvent::StateChanged(ConnectionStatus::Disconnected));

    let attempts = state.attempt_count;
    if ctx.policy.exhausted(attempts) {
        info!(attempts, "retry limit reached, waiting for next trigger");
        ctx.emit(ConnectionEvent::RetriesExhausted { attempts });
        return;
    }

    let delay = ctx.policy.delay_for_attempt(attempts);
    schedule_retry(ctx, &mut state, delay);
    ctx.emit(ConnectionEvent::RetryScheduled {
        attempt: attempts,
        delay,
    });
    info!(
        attempt = attempts,
        delay_ms = delay.as_millis() as u64,
        "retry scheduled"
    );
}

/// Replaces any pending retry with a new one firing after `delay`.
fn schedule_retry(ctx: &HubContext, state: &mut ConnectionState, delay: Duration) {
    state.cancel_pending_retry();
    state.next_retry_id += 1;
    let retry_id = state.next_retry_id;

    let retry_ctx = ctx.clone();
    let handle = ctx
        .scheduler
        .schedule(delay, Box::pin(fire_retry(retry_ctx, retry_id)));
    state.pending_retry = Some((retry_id, handle));
}

/// Timer body of a backoff retry. A superseded retry does nothing.
async fn fire_retry(ctx: HubContext, retry_id: u64) {
    {
        let mut state = ctx.lock_state();
        let ours = state
            .pending_retry
            .as_ref()
            .is_some_and(|(id, _)| *id == retry_id);
        if !ours {
            trace!(retry_id, "stale retry timer ignored");
            return;
        }
        state.pending_retry = None;
    }
    attempt(ctx, AttemptOrigin::Retry).await;
}

/// Fire-and-forget unread refresh.
pub(crate) fn spawn_unread_refresh(ctx: HubContext) {
    tokio::spawn(refresh_unread(ctx));
}

/// Fetches the unread count and caches it. Only valid while connected;
/// failures are logged and leave the connection untouched.
pub(crate) async fn refresh_unread(ctx: HubContext) {
    {
        let state = ctx.lock_state();
        if state.shut_down || state.status != ConnectionStatus::Connected {
            debug!("not connected, unread refresh skipped");
            return;
        }
    }

    match ctx.fetcher.fetch_unread().await {
        Ok(count) => {
            let mut state = ctx.lock_state();
            state.unread = count;
            ctx.emit(ConnectionEvent::UnreadChanged { count });
            debug!(count, "unread count refreshed");
        }
        Err(e) => warn!(error = %e, "unread fetch failed"),
    }
}
