//! Periodic refresh of the active session's last observed instant.

use std::sync::Arc;
use std::time::Duration;

use nl_core::Clock;
use nl_db::{Database, TickOutcome};
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// Default refresh cadence.
pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_secs(30);

const MIN_INTERVAL: Duration = Duration::from_millis(1);

/// Why a refresher stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefresherExit {
    /// The session was finished or discarded.
    Inactive,
    Shutdown,
}

/// Keeps the persisted `end_epoch` at most one interval stale.
pub struct TimerRefresher;

impl TimerRefresher {
    /// Spawns the refresh loop.
    ///
    /// The first tick fires immediately, so a restarted process resumes
    /// refreshing a session it recovered from the store.
    pub fn spawn(
        db: Arc<Mutex<Database>>,
        clock: Arc<dyn Clock>,
        interval: Duration,
        mut shutdown: watch::Receiver<bool>,
    ) -> JoinHandle<RefresherExit> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval.max(MIN_INTERVAL));
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            if *shutdown.borrow_and_update() {
                return RefresherExit::Shutdown;
            }
            loop {
                tokio::select! {
                    _ = ticker.tick() => {}
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            tracing::debug!("timer refresher shutting down");
                            return RefresherExit::Shutdown;
                        }
                        continue;
                    }
                }

                let outcome = db.lock().await.tick_timer(clock.now());
                match outcome {
                    Ok(TickOutcome::Refreshed { end_epoch }) => {
                        tracing::debug!(end_epoch, "timer refreshed");
                    }
                    Ok(TickOutcome::Inactive) => {
                        tracing::debug!("no running timer, refresher stopping");
                        return RefresherExit::Inactive;
                    }
                    Err(err) => {
                        tracing::warn!(error = %err, "failed to refresh timer");
                    }
                }
            }
        })
    }
}
