//! The serialized push-then-pull sync cycle.
//!
//! ```text
//! Idle --run_cycle--> Pushing --> Pulling --> Idle
//! ```
//!
//! A cycle started while another is in flight is skipped rather than queued,
//! so two pulls never race on the watermark. Failures are absorbed into the
//! returned [`CycleOutcome`]; the watermark only moves after a pull has been
//! fully applied.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use nl_core::{Event, EventId, EventRecord, ValidationError};
use nl_db::{Database, DbError};
use thiserror::Error;
use tokio::sync::Mutex;

use crate::transport::{Transport, TransportError};

/// Errors inside a sync cycle. Never returned from [`SyncEngine::run_cycle`].
#[derive(Debug, Error)]
pub enum SyncError {
    #[error(transparent)]
    Store(#[from] DbError),
    #[error(transparent)]
    Transport(#[from] TransportError),
    /// The server sent a record that does not describe a valid event.
    #[error("undecodable server record: {0}")]
    Decode(#[from] ValidationError),
}

/// The phase a failed cycle stopped in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncStage {
    Push,
    Pull,
}

impl fmt::Display for SyncStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Push => write!(f, "push"),
            Self::Pull => write!(f, "pull"),
        }
    }
}

/// Counters of a completed cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncReport {
    /// Records sent to the server.
    pub pushed: usize,
    /// Pushed records the server kept as sent.
    pub acknowledged: usize,
    /// Pushed records that lost to the server's copy.
    pub adopted: usize,
    /// Records received from the pull.
    pub pulled: usize,
    /// Watermark after the cycle.
    pub server_clock: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    Completed(SyncReport),
    /// Another cycle was already running.
    Skipped,
    Failed { stage: SyncStage, message: String },
}

impl CycleOutcome {
    pub const fn is_failure(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }
}

/// Device-to-server reconciliation over a shared [`Database`].
pub struct SyncEngine<T> {
    db: Arc<Mutex<Database>>,
    transport: T,
    cycle: Mutex<()>,
}

impl<T: Transport> SyncEngine<T> {
    pub fn new(db: Arc<Mutex<Database>>, transport: T) -> Self {
        Self {
            db,
            transport,
            cycle: Mutex::new(()),
        }
    }

    /// Runs one push-then-pull cycle.
    pub async fn run_cycle(&self) -> CycleOutcome {
        let Ok(_running) = self.cycle.try_lock() else {
            tracing::debug!("sync cycle already in flight, skipping");
            return CycleOutcome::Skipped;
        };

        let mut report = match self.push().await {
            Ok(report) => report,
            Err(err) => return failed(SyncStage::Push, &err),
        };
        match self.pull().await {
            Ok((pulled, server_clock)) => {
                report.pulled = pulled;
                report.server_clock = server_clock;
            }
            Err(err) => return failed(SyncStage::Pull, &err),
        }

        tracing::info!(
            pushed = report.pushed,
            acknowledged = report.acknowledged,
            adopted = report.adopted,
            pulled = report.pulled,
            server_clock = report.server_clock,
            "sync cycle completed"
        );
        CycleOutcome::Completed(report)
    }

    /// Sends every pending record and records the server's verdict.
    ///
    /// A result whose record matches what was pushed is an acknowledgement.
    /// Any other record is the server's winning copy and replaces the local
    /// row, whatever its `applied` flag says.
    async fn push(&self) -> Result<SyncReport, SyncError> {
        let pending = self.db.lock().await.unsynced_events()?;
        if pending.is_empty() {
            return Ok(SyncReport::default());
        }
        let records: Vec<EventRecord> = pending.iter().map(EventRecord::from).collect();
        let response = self.transport.push(&records).await?;

        let sent: HashMap<&EventId, &EventRecord> =
            records.iter().map(|record| (&record.event_id, record)).collect();
        let mut acknowledged = Vec::new();
        let mut winners = Vec::new();
        for result in response.results {
            match sent.get(&result.event.event_id) {
                Some(pushed) if pushed.lww_key() == result.event.lww_key() => {
                    acknowledged.push((result.event.event_id.clone(), pushed.version));
                }
                _ => winners.push(Event::try_from(result.event)?),
            }
        }

        let applied = self
            .db
            .lock()
            .await
            .apply_push_results(&acknowledged, &winners)?;
        Ok(SyncReport {
            pushed: records.len(),
            acknowledged: applied.acknowledged,
            adopted: applied.adopted,
            ..SyncReport::default()
        })
    }

    /// Fetches changes after the stored watermark and applies them.
    async fn pull(&self) -> Result<(usize, i64), SyncError> {
        let since = self.db.lock().await.sync_state()?.last_server_clock;
        let response = self.transport.pull(since).await?;
        let events = response
            .events
            .into_iter()
            .map(Event::try_from)
            .collect::<Result<Vec<_>, _>>()?;
        let watermark = self
            .db
            .lock()
            .await
            .apply_pull(&events, response.server_clock)?;
        Ok((events.len(), watermark))
    }
}

fn failed(stage: SyncStage, err: &SyncError) -> CycleOutcome {
    tracing::warn!(%stage, error = %err, "sync cycle failed");
    CycleOutcome::Failed {
        stage,
        message: err.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;

    use nl_core::{Anchor, DeviceId, EventAmendment, EventType};

    use super::*;
    use crate::testing::{FakeServer, shared_db};

    fn device(id: &str) -> DeviceId {
        DeviceId::new(id).unwrap()
    }

    fn completed(outcome: CycleOutcome) -> SyncReport {
        match outcome {
            CycleOutcome::Completed(report) => report,
            other => panic!("expected a completed cycle, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn push_then_pull_does_not_reapply_own_record() {
        let server = Arc::new(FakeServer::default());
        let db = shared_db();
        let id = db
            .lock()
            .await
            .log_nappy(100, &device("a"), "wet", None)
            .unwrap();
        let engine = SyncEngine::new(db.clone(), server.clone());

        let report = completed(engine.run_cycle().await);
        assert_eq!(report.pushed, 1);
        assert_eq!(report.acknowledged, 1);
        assert_eq!(report.adopted, 0);
        assert_eq!(report.pulled, 1);
        assert_eq!(report.server_clock, 1);

        let guard = db.lock().await;
        let stored = guard.get_event(&id).unwrap().unwrap();
        assert_eq!(stored.version, 1);
        assert_eq!(stored.nappy_type.as_deref(), Some("wet"));
        assert_eq!(guard.count_unsynced().unwrap(), 0);
        drop(guard);

        let second = completed(engine.run_cycle().await);
        assert_eq!(second.pushed, 0);
        assert_eq!(second.pulled, 0);
        assert_eq!(server.record_count(), 1);
    }

    #[tokio::test]
    async fn push_failure_leaves_watermark_and_pending_rows() {
        let server = Arc::new(FakeServer::default());
        let db = shared_db();
        db.lock()
            .await
            .log_nappy(100, &device("a"), "wet", None)
            .unwrap();
        server.fail_push.store(true, Ordering::SeqCst);
        let engine = SyncEngine::new(db.clone(), server.clone());

        let outcome = engine.run_cycle().await;
        assert!(matches!(
            outcome,
            CycleOutcome::Failed {
                stage: SyncStage::Push,
                ..
            }
        ));
        let guard = db.lock().await;
        assert_eq!(guard.sync_state().unwrap().last_server_clock, 0);
        assert_eq!(guard.count_unsynced().unwrap(), 1);
    }

    #[tokio::test]
    async fn undecodable_pull_aborts_without_moving_watermark() {
        let server = Arc::new(FakeServer::default());
        server.inject(serde_json::json!({
            "event_id": "broken",
            "type": "sleep",
            "created_ts": 1,
            "updated_ts": 1,
            "version": 1,
            "device_id": "server"
        }));
        let db = shared_db();
        let engine = SyncEngine::new(db.clone(), server.clone());

        let outcome = engine.run_cycle().await;
        assert!(matches!(
            outcome,
            CycleOutcome::Failed {
                stage: SyncStage::Pull,
                ..
            }
        ));
        let guard = db.lock().await;
        assert_eq!(guard.sync_state().unwrap().last_server_clock, 0);
        assert!(guard.events_for_day(0, i64::MAX).unwrap().is_empty());
    }

    #[tokio::test]
    async fn overlapping_cycle_is_skipped() {
        let server = Arc::new(FakeServer::default());
        server.hold_pulls();
        let engine = Arc::new(SyncEngine::new(shared_db(), server.clone()));

        let first = tokio::spawn({
            let engine = engine.clone();
            async move { engine.run_cycle().await }
        });
        server.wait_for_pull().await;

        assert_eq!(engine.run_cycle().await, CycleOutcome::Skipped);
        server.release_pulls();
        assert!(matches!(
            first.await.unwrap(),
            CycleOutcome::Completed(_)
        ));
    }

    #[tokio::test]
    async fn edits_travel_between_devices() {
        let server = Arc::new(FakeServer::default());
        let phone = shared_db();
        let tablet = shared_db();
        let phone_engine = SyncEngine::new(phone.clone(), server.clone());
        let tablet_engine = SyncEngine::new(tablet.clone(), server.clone());

        let id = phone
            .lock()
            .await
            .log_sleep(1_000, 4_600, 4_600, &device("phone"), None)
            .unwrap();
        completed(phone_engine.run_cycle().await);
        completed(tablet_engine.run_cycle().await);

        let amendment = EventAmendment {
            note: Some("woke once".to_string()),
            ..EventAmendment::default()
        };
        assert!(
            tablet
                .lock()
                .await
                .amend_event(&id, &amendment, 5_000)
                .unwrap()
        );
        completed(tablet_engine.run_cycle().await);
        let report = completed(phone_engine.run_cycle().await);
        assert_eq!(report.pulled, 1);

        let stored = phone.lock().await.get_event(&id).unwrap().unwrap();
        assert_eq!(stored.version, 2);
        assert_eq!(stored.note.as_deref(), Some("woke once"));
        assert_eq!(
            stored.anchor,
            Anchor::Span {
                start: 1_000,
                end: Some(4_600)
            }
        );
    }

    #[tokio::test]
    async fn losing_push_adopts_server_copy() {
        let server = Arc::new(FakeServer::default());
        let phone = shared_db();
        let tablet = shared_db();
        let phone_engine = SyncEngine::new(phone.clone(), server.clone());
        let tablet_engine = SyncEngine::new(tablet.clone(), server.clone());

        let id = phone
            .lock()
            .await
            .log_nappy(100, &device("phone"), "wet", None)
            .unwrap();
        completed(phone_engine.run_cycle().await);
        completed(tablet_engine.run_cycle().await);

        // Both devices edit offline; the tablet's edit is later.
        let early = EventAmendment {
            nappy_type: Some("dirty".to_string()),
            ..EventAmendment::default()
        };
        let late = EventAmendment {
            nappy_type: Some("both".to_string()),
            ..EventAmendment::default()
        };
        phone.lock().await.amend_event(&id, &early, 200).unwrap();
        tablet.lock().await.amend_event(&id, &late, 300).unwrap();

        completed(tablet_engine.run_cycle().await);
        let report = completed(phone_engine.run_cycle().await);
        assert_eq!(report.adopted, 1);
        assert_eq!(report.acknowledged, 0);

        let guard = phone.lock().await;
        let stored = guard.get_event(&id).unwrap().unwrap();
        assert_eq!(stored.nappy_type.as_deref(), Some("both"));
        assert_eq!(stored.updated_ts, 300);
        assert_eq!(guard.count_unsynced().unwrap(), 0);
    }

    #[tokio::test]
    async fn tombstones_are_pushed() {
        let server = Arc::new(FakeServer::default());
        let db = shared_db();
        let engine = SyncEngine::new(db.clone(), server.clone());
        let id = db
            .lock()
            .await
            .log_feed(
                50,
                &device("a"),
                nl_core::FeedMode::Bottle,
                Some(120),
                None,
                None,
            )
            .unwrap();
        completed(engine.run_cycle().await);
        db.lock().await.soft_delete(&id, 60).unwrap();

        let report = completed(engine.run_cycle().await);
        assert_eq!(report.pushed, 1);
        let stored = server.record(&id).unwrap();
        assert!(stored.deleted);
        assert_eq!(stored.event_type, EventType::Feed);
        assert_eq!(stored.version, 2);
    }

    #[tokio::test]
    async fn watermark_is_max_of_returned_clocks() {
        let server = Arc::new(FakeServer::default());
        let db = shared_db();
        let engine = SyncEngine::new(db.clone(), server.clone());
        for ts in [10, 20, 30] {
            db.lock()
                .await
                .log_nappy(ts, &device("a"), "wet", None)
                .unwrap();
            completed(engine.run_cycle().await);
        }
        assert_eq!(db.lock().await.sync_state().unwrap().last_server_clock, 3);

        server.rewind_clock_reports(1);
        completed(engine.run_cycle().await);
        assert_eq!(db.lock().await.sync_state().unwrap().last_server_clock, 3);
    }
}
