//! Background sync on a fixed cadence with backoff after failures.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Notify, watch};
use tokio::task::JoinHandle;

use crate::engine::{CycleOutcome, SyncEngine};
use crate::transport::Transport;

/// Default cadence between cycles.
pub const DEFAULT_SYNC_INTERVAL: Duration = Duration::from_secs(15 * 60);
/// Backoff ceiling as a multiple of the base interval.
const MAX_BACKOFF_FACTOR: u32 = 8;

/// Delay before the next cycle.
///
/// Failures double the previous delay up to `cap`; anything else resets it to
/// `base`.
pub fn next_delay(
    previous: Duration,
    base: Duration,
    cap: Duration,
    outcome: &CycleOutcome,
) -> Duration {
    if outcome.is_failure() {
        previous.saturating_mul(2).clamp(base, cap.max(base))
    } else {
        base
    }
}

/// Handle to a running background sync loop.
#[derive(Debug)]
pub struct SyncScheduler {
    force: Arc<Notify>,
    handle: JoinHandle<()>,
}

impl SyncScheduler {
    /// Spawns the loop. The first cycle runs immediately.
    ///
    /// Shutdown is only observed between cycles, so a cycle is never cut off
    /// in the middle of a store write.
    pub fn spawn<T>(
        engine: Arc<SyncEngine<T>>,
        interval: Duration,
        mut shutdown: watch::Receiver<bool>,
    ) -> Self
    where
        T: Transport + 'static,
    {
        let force = Arc::new(Notify::new());
        let trigger = force.clone();
        let cap = interval.saturating_mul(MAX_BACKOFF_FACTOR);

        let handle = tokio::spawn(async move {
            tracing::info!(interval_secs = interval.as_secs(), "starting sync scheduler");
            let mut delay = interval;
            while !*shutdown.borrow_and_update() {
                let outcome = engine.run_cycle().await;
                delay = next_delay(delay, interval, cap, &outcome);
                if outcome.is_failure() {
                    tracing::debug!(delay_secs = delay.as_secs(), "backing off");
                }

                tokio::select! {
                    () = tokio::time::sleep(delay) => {}
                    () = trigger.notified() => {
                        tracing::debug!("sync forced");
                    }
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            break;
                        }
                    }
                }
            }
            tracing::info!("sync scheduler stopped");
        });

        Self { force, handle }
    }

    /// Wakes the loop for an immediate cycle.
    pub fn force_sync(&self) {
        self.force.notify_one();
    }

    /// Waits for the loop to exit after shutdown has been signalled.
    pub async fn join(self) {
        if let Err(err) = self.handle.await {
            tracing::warn!(error = %err, "sync scheduler task failed");
        }
    }
}
