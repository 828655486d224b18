//! Lifecycle pump: forwards foreground/background transitions to the manager.

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::manager::{on_background, on_foreground};
use crate::reconnection::HubContext;
use crate::types::LifecycleEvent;

/// Handle to an attached lifecycle source. Dropping it detaches the source.
#[derive(Debug)]
pub struct Subscription {
    cancel: CancellationToken,
}

impl Subscription {
    pub(crate) fn new(cancel: CancellationToken) -> Self {
        Self { cancel }
    }

    /// Stops forwarding lifecycle events.
    pub fn unsubscribe(self) {
        self.cancel.cancel();
    }

    pub fn is_active(&self) -> bool {
        !self.cancel.is_cancelled()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Dispatches lifecycle events until the sender closes or the pump is canceled.
pub(crate) async fn lifecycle_pump(
    ctx: HubContext,
    mut events: mpsc::Receiver<LifecycleEvent>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            event = events.recv() => match event {
                Some(LifecycleEvent::Foreground) => on_foreground(&ctx).await,
                Some(LifecycleEvent::Background) => on_background(&ctx),
                None => break,
            },
        }
    }

    debug!("lifecycle pump stopped");
}
