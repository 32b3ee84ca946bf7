//! Sync bookkeeping: the server watermark singleton and per-row push state.

use nl_core::{DeviceId, Event, EventId};
use rusqlite::{OptionalExtension, params};

use crate::{Database, DbError, EVENT_COLUMNS, query_events, upsert_event};

/// Rows touched by [`Database::apply_push_results`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PushApplied {
    pub acknowledged: usize,
    pub adopted: usize,
}

/// The sync-state singleton.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncState {
    /// Highest server clock whose changes have been applied locally.
    pub last_server_clock: i64,
    pub device_id: Option<DeviceId>,
    pub paired: bool,
}

impl Database {
    /// Reads the sync state. A database that never synced reports the default.
    pub fn sync_state(&self) -> Result<SyncState, DbError> {
        let row: Option<(i64, Option<String>, bool)> = self
            .conn
            .query_row(
                "SELECT last_server_clock, device_id, paired FROM sync_state WHERE id = 1",
                [],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .optional()?;
        let Some((last_server_clock, device_id, paired)) = row else {
            return Ok(SyncState::default());
        };
        let device_id = device_id
            .map(DeviceId::new)
            .transpose()
            .map_err(DbError::Validation)?;
        Ok(SyncState {
            last_server_clock,
            device_id,
            paired,
        })
    }

    /// Creates the singleton if missing and records `device` when no device
    /// id is stored yet.
    pub fn ensure_sync_state(&mut self, device: &DeviceId) -> Result<SyncState, DbError> {
        let tx = self.write_tx()?;
        tx.execute(
            "INSERT OR IGNORE INTO sync_state (id, last_server_clock, device_id, paired) VALUES (1, 0, ?, 0)",
            [device.as_str()],
        )?;
        tx.execute(
            "UPDATE sync_state SET device_id = ? WHERE id = 1 AND device_id IS NULL",
            [device.as_str()],
        )?;
        tx.commit()?;
        self.sync_state()
    }

    /// Records a successful pairing under the server-issued device id.
    pub fn mark_paired(&mut self, device: &DeviceId) -> Result<(), DbError> {
        self.conn.execute(
            "
            INSERT INTO sync_state (id, last_server_clock, device_id, paired) VALUES (1, 0, ?1, 1)
            ON CONFLICT(id) DO UPDATE SET device_id = ?1, paired = 1
            ",
            [device.as_str()],
        )?;
        tracing::info!(device_id = %device, "device paired");
        Ok(())
    }

    /// Events with local changes the server has not acknowledged, tombstones
    /// included, oldest change first.
    pub fn unsynced_events(&self) -> Result<Vec<Event>, DbError> {
        query_events(
            &self.conn,
            &format!(
                "
                SELECT {EVENT_COLUMNS}
                FROM events
                WHERE version > synced_version
                ORDER BY updated_ts ASC, event_id ASC
                "
            ),
            [],
        )
    }

    pub fn count_unsynced(&self) -> Result<i64, DbError> {
        Ok(self.conn.query_row(
            "SELECT COUNT(*) FROM events WHERE version > synced_version",
            [],
            |row| row.get(0),
        )?)
    }

    /// Records the server's verdict on a push in one transaction.
    ///
    /// `acknowledged` holds the `(event_id, version)` pairs the server applied;
    /// a row edited again since it was pushed keeps its pending state.
    /// `winners` are the server's copies of records whose push lost; they
    /// overwrite the local rows and are marked acknowledged.
    pub fn apply_push_results(
        &mut self,
        acknowledged: &[(EventId, i64)],
        winners: &[Event],
    ) -> Result<PushApplied, DbError> {
        let tx = self.write_tx()?;
        let mut applied = PushApplied::default();
        {
            let mut stmt = tx.prepare(
                "UPDATE events SET synced_version = ?2 WHERE event_id = ?1 AND version = ?2",
            )?;
            for (event_id, version) in acknowledged {
                applied.acknowledged += stmt.execute(params![event_id.as_str(), version])?;
            }
        }
        for event in winners {
            upsert_event(&tx, event, Some(event.version))?;
            applied.adopted += 1;
        }
        tx.commit()?;
        Ok(applied)
    }

    /// Applies pulled events and advances the watermark in one transaction.
    ///
    /// Pulled rows overwrite local ones as received. The watermark only moves
    /// forward: it becomes `max(current, server_clock)`. Returns the new
    /// watermark.
    pub fn apply_pull(&mut self, events: &[Event], server_clock: i64) -> Result<i64, DbError> {
        let tx = self.write_tx()?;
        for event in events {
            upsert_event(&tx, event, Some(event.version))?;
        }
        tx.execute(
            "INSERT OR IGNORE INTO sync_state (id, last_server_clock, paired) VALUES (1, 0, 0)",
            [],
        )?;
        tx.execute(
            "UPDATE sync_state SET last_server_clock = MAX(last_server_clock, ?) WHERE id = 1",
            [server_clock],
        )?;
        let watermark: i64 = tx.query_row(
            "SELECT last_server_clock FROM sync_state WHERE id = 1",
            [],
            |row| row.get(0),
        )?;
        tx.commit()?;
        tracing::debug!(pulled = events.len(), watermark, "applied pull");
        Ok(watermark)
    }
}
