//! Periodic poll pump: the low-frequency safety net behind lifecycle events.

use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::manager::on_periodic_tick;
use crate::reconnection::HubContext;

/// Ticks the manager every `period` on the manager's clock until canceled.
///
/// The first tick comes one full period after start; a slow tick delays
/// the next one instead of bursting.
pub(crate) async fn poll_pump(ctx: HubContext, period: Duration, cancel: CancellationToken) {
    loop {
        let tick = ctx.scheduler.sleep(period);
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tick => on_periodic_tick(&ctx).await,
        }
    }

    debug!("poll pump stopped");
}
