//! Scripted collaborators shared by the unit tests.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::time::Duration;

use futures_util::future::BoxFuture;
use tokio::sync::{Semaphore, mpsc, oneshot};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::collaborators::{IdentityProvider, Transport, UnreadFetcher};
use crate::error::TransportError;
use crate::timer::{Scheduler, TimerHandle};
use crate::types::{ConnectionEvent, UserId};

pub(crate) fn user(id: &str) -> UserId {
    UserId::new(id)
}

/// Lets spawned tasks run without firing any pending retry timer.
pub(crate) async fn settle() {
    tokio::time::sleep(Duration::from_millis(1)).await;
}

pub(crate) fn drain(rx: &mut mpsc::Receiver<ConnectionEvent>) -> Vec<ConnectionEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

pub(crate) struct MockIdentity {
    user: Mutex<Option<UserId>>,
}

impl MockIdentity {
    pub(crate) fn signed_in(id: &str) -> Self {
        Self {
            user: Mutex::new(Some(user(id))),
        }
    }

    pub(crate) fn signed_out() -> Self {
        Self {
            user: Mutex::new(None),
        }
    }

    pub(crate) fn sign_in(&self, id: &str) {
        *self.user.lock().unwrap() = Some(user(id));
    }

    pub(crate) fn sign_out(&self) {
        *self.user.lock().unwrap() = None;
    }
}

impl IdentityProvider for MockIdentity {
    fn current_user_id(&self) -> Option<UserId> {
        self.user.lock().unwrap().clone()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Outcome {
    Success,
    /// `connect` resolves to `false`.
    Refused,
    /// `connect` returns an error.
    Error,
}

/// Transport whose connect results follow a script, then a fallback.
///
/// A gated transport parks every connect until [`MockTransport::release`].
pub(crate) struct MockTransport {
    script: Mutex<VecDeque<Outcome>>,
    fallback: Mutex<Outcome>,
    gate: Option<Semaphore>,
    connected: AtomicBool,
    calls: AtomicU32,
    in_flight: AtomicU32,
    max_in_flight: AtomicU32,
    users: Mutex<Vec<UserId>>,
}

impl MockTransport {
    pub(crate) fn scripted(script: impl IntoIterator<Item = Outcome>, fallback: Outcome) -> Self {
        Self {
            script: Mutex::new(script.into_iter().collect()),
            fallback: Mutex::new(fallback),
            gate: None,
            connected: AtomicBool::new(false),
            calls: AtomicU32::new(0),
            in_flight: AtomicU32::new(0),
            max_in_flight: AtomicU32::new(0),
            users: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn always(outcome: Outcome) -> Self {
        Self::scripted([], outcome)
    }

    pub(crate) fn gated(outcome: Outcome) -> Self {
        Self {
            gate: Some(Semaphore::new(0)),
            ..Self::always(outcome)
        }
    }

    pub(crate) fn release(&self, permits: usize) {
        if let Some(gate) = &self.gate {
            gate.add_permits(permits);
        }
    }

    pub(crate) fn set_fallback(&self, outcome: Outcome) {
        *self.fallback.lock().unwrap() = outcome;
    }

    /// Simulates the remote side closing the channel.
    pub(crate) fn drop_connection(&self) {
        self.connected.store(false, Ordering::SeqCst);
    }

    pub(crate) fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    pub(crate) fn max_in_flight(&self) -> u32 {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    pub(crate) fn users(&self) -> Vec<UserId> {
        self.users.lock().unwrap().clone()
    }
}

impl Transport for MockTransport {
    fn connect<'a>(&'a self, user: &'a UserId) -> BoxFuture<'a, Result<bool, TransportError>> {
        Box::pin(async move {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.users.lock().unwrap().push(user.clone());
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);

            if let Some(gate) = &self.gate
                && let Ok(permit) = gate.acquire().await
            {
                permit.forget();
            }
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            let outcome = self
                .script
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| *self.fallback.lock().unwrap());
            let result = match outcome {
                Outcome::Success => Ok(true),
                Outcome::Refused => Ok(false),
                Outcome::Error => Err(TransportError::Connect("host unreachable".into())),
            };
            self.connected
                .store(matches!(result, Ok(true)), Ordering::SeqCst);
            result
        })
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}

pub(crate) struct MockFetcher {
    count: AtomicU64,
    fail: bool,
    calls: AtomicU32,
}

impl MockFetcher {
    pub(crate) fn returning(count: u64) -> Self {
        Self {
            count: AtomicU64::new(count),
            fail: false,
            calls: AtomicU32::new(0),
        }
    }

    pub(crate) fn failing() -> Self {
        Self {
            fail: true,
            ..Self::returning(0)
        }
    }

    pub(crate) fn set_count(&self, count: u64) {
        self.count.store(count, Ordering::SeqCst);
    }

    pub(crate) fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

impl UnreadFetcher for MockFetcher {
    fn fetch_unread(&self) -> BoxFuture<'_, Result<u64, TransportError>> {
        Box::pin(async move {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                Err(TransportError::Fetch("503 service unavailable".into()))
            } else {
                Ok(self.count.load(Ordering::SeqCst))
            }
        })
    }
}

struct ManualTimer {
    due: Duration,
    cancel: CancellationToken,
    task: BoxFuture<'static, ()>,
}

/// Clock that only moves on [`ManualScheduler::advance`].
///
/// Due tasks are spawned onto the runtime, so callers should let them run
/// (e.g. with [`settle`]) before asserting.
pub(crate) struct ManualScheduler {
    origin: Instant,
    elapsed: Mutex<Duration>,
    timers: Mutex<Vec<ManualTimer>>,
}

impl ManualScheduler {
    pub(crate) fn new() -> Self {
        Self {
            origin: Instant::now(),
            elapsed: Mutex::new(Duration::ZERO),
            timers: Mutex::new(Vec::new()),
        }
    }

    /// Moves the clock forward and runs every timer that came due, earliest
    /// first.
    pub(crate) fn advance(&self, by: Duration) {
        let now = {
            let mut elapsed = self.elapsed.lock().unwrap();
            *elapsed += by;
            *elapsed
        };

        let mut due: Vec<ManualTimer> = {
            let mut timers = self.timers.lock().unwrap();
            let (due, pending): (Vec<_>, Vec<_>) =
                timers.drain(..).partition(|t| t.due <= now);
            *timers = pending;
            due
        };
        due.sort_by_key(|t| t.due);

        for timer in due {
            if !timer.cancel.is_cancelled() {
                tokio::spawn(timer.task);
            }
        }
    }
}

impl Scheduler for ManualScheduler {
    fn now(&self) -> Instant {
        self.origin + *self.elapsed.lock().unwrap()
    }

    fn schedule(&self, delay: Duration, task: BoxFuture<'static, ()>) -> TimerHandle {
        let cancel = CancellationToken::new();
        let due = *self.elapsed.lock().unwrap() + delay;
        self.timers.lock().unwrap().push(ManualTimer {
            due,
            cancel: cancel.clone(),
            task,
        });
        TimerHandle::new(cancel)
    }

    fn sleep(&self, duration: Duration) -> BoxFuture<'static, ()> {
        let (tx, rx) = oneshot::channel();
        let _timer = self.schedule(
            duration,
            Box::pin(async move {
                let _ = tx.send(());
            }),
        );
        Box::pin(async move {
            let _ = rx.await;
        })
    }
}
