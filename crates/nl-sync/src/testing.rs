//! In-process stand-in for the sync server.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex as StdMutex};

use nl_core::wire::{PullResponse, PushResponse, PushResult};
use nl_core::{EventId, EventRecord};
use nl_db::Database;
use tokio::sync::{Mutex, Notify};

use crate::transport::{Transport, TransportError};

pub fn shared_db() -> Arc<Mutex<Database>> {
    Arc::new(Mutex::new(Database::open_in_memory().unwrap()))
}

#[derive(Default)]
struct Store {
    clock: i64,
    /// Record and the server clock it was last written at.
    records: HashMap<EventId, (EventRecord, i64)>,
}

/// Applies the server's last-writer-wins rule on push and returns changes by
/// server clock on pull.
#[derive(Default)]
pub struct FakeServer {
    store: StdMutex<Store>,
    pub fail_push: AtomicBool,
    pub fail_pull: AtomicBool,
    pub pulls: AtomicUsize,
    reported_clock: AtomicI64,
    hold: AtomicBool,
    pull_started: Notify,
    gate: Notify,
}

impl FakeServer {
    /// Stores a raw record as if another device had pushed it.
    pub fn inject(&self, json: serde_json::Value) {
        let record: EventRecord = serde_json::from_value(json).unwrap();
        let mut store = self.store.lock().unwrap();
        store.clock += 1;
        let clock = store.clock;
        store.records.insert(record.event_id.clone(), (record, clock));
    }

    pub fn record(&self, event_id: &EventId) -> Option<EventRecord> {
        let store = self.store.lock().unwrap();
        store.records.get(event_id).map(|(record, _)| record.clone())
    }

    pub fn record_count(&self) -> usize {
        self.store.lock().unwrap().records.len()
    }

    /// Makes pulls report `clock` instead of the real server clock.
    pub fn rewind_clock_reports(&self, clock: i64) {
        self.reported_clock.store(clock, Ordering::SeqCst);
    }

    /// Blocks pulls until [`FakeServer::release_pulls`].
    pub fn hold_pulls(&self) {
        self.hold.store(true, Ordering::SeqCst);
    }

    pub fn release_pulls(&self) {
        self.hold.store(false, Ordering::SeqCst);
        self.gate.notify_one();
    }

    /// Waits until a held pull has started.
    pub async fn wait_for_pull(&self) {
        self.pull_started.notified().await;
    }
}

impl Transport for FakeServer {
    async fn push(&self, records: &[EventRecord]) -> Result<PushResponse, TransportError> {
        if self.fail_push.load(Ordering::SeqCst) {
            return Err(TransportError::Api {
                status: 503,
                message: "unavailable".to_string(),
            });
        }
        let mut store = self.store.lock().unwrap();
        let mut results = Vec::new();
        for incoming in records {
            let winner = match store.records.get(&incoming.event_id) {
                Some((existing, _)) if !incoming.supersedes(existing) => {
                    results.push(PushResult {
                        event: existing.clone(),
                        applied: false,
                    });
                    continue;
                }
                _ => incoming.clone(),
            };
            store.clock += 1;
            let clock = store.clock;
            store
                .records
                .insert(winner.event_id.clone(), (winner.clone(), clock));
            results.push(PushResult {
                event: winner,
                applied: true,
            });
        }
        Ok(PushResponse {
            server_clock: store.clock,
            results,
        })
    }

    async fn pull(&self, since: i64) -> Result<PullResponse, TransportError> {
        self.pulls.fetch_add(1, Ordering::SeqCst);
        if self.hold.load(Ordering::SeqCst) {
            self.pull_started.notify_one();
            self.gate.notified().await;
        }
        if self.fail_pull.load(Ordering::SeqCst) {
            return Err(TransportError::Decode("truncated body".to_string()));
        }
        let store = self.store.lock().unwrap();
        let mut changed: Vec<(EventRecord, i64)> = store
            .records
            .values()
            .filter(|(_, clock)| *clock > since)
            .cloned()
            .collect();
        changed.sort_by_key(|(_, clock)| *clock);
        let reported = self.reported_clock.load(Ordering::SeqCst);
        Ok(PullResponse {
            server_clock: if reported > 0 { reported } else { store.clock },
            events: changed.into_iter().map(|(record, _)| record).collect(),
        })
    }
}
