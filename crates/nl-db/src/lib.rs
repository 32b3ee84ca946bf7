//! Storage layer for the nursery log.
//!
//! Provides persistence for journal events, feed segments, the sync-state
//! singleton and the active-timer singleton using `rusqlite`.
//!
//! # Thread Safety
//!
//! The [`Database`] type wraps a `rusqlite::Connection`, which is `Send` but not `Sync`.
//! The async workers share one instance behind a `tokio::sync::Mutex`, which also
//! serializes every mutation of a given event. Separate processes (the CLI and a
//! long-running watcher) are serialized by `BEGIN IMMEDIATE` transactions and the
//! connection's busy timeout.
//!
//! # Schema
//!
//! ## Timestamp Format
//!
//! Timestamps are stored as INTEGER UTC epoch seconds. Sleeps use the
//! `start_ts`/`end_ts` pair, point events (feeds, nappies) use `ts`.
//!
//! ## Versioning
//!
//! `version` starts at 1 and every local mutation bumps it by exactly one.
//! `synced_version` records the highest version the server has acknowledged;
//! rows with `version > synced_version` are pending push. Rows are never
//! physically deleted: `deleted = 1` is a tombstone that still syncs.
//!
//! Event rows are written with `INSERT .. ON CONFLICT DO UPDATE` rather than
//! `INSERT OR REPLACE`, because a replace deletes the row first and the
//! `feed_segments` foreign key would cascade.

mod journal;
mod sync_state;
mod timer;

use std::path::Path;
use std::time::Duration;

use nl_core::{
    Anchor, BreastSide, DeviceId, Event, EventId, EventType, FeedMode, FeedSegment, TimerError,
    ValidationError,
};
use rusqlite::{Connection, OptionalExtension, Row, Transaction, TransactionBehavior, params};
use thiserror::Error;

pub use sync_state::{PushApplied, SyncState};
pub use timer::TickOutcome;

/// How long a connection waits for another process's write lock.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Database errors.
#[derive(Debug, Error)]
pub enum DbError {
    /// An error from the underlying database.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    /// A stored row does not describe a valid event.
    #[error("invalid event data for {event_id}: {message}")]
    InvalidEventData { event_id: String, message: String },
    /// A requested edit would violate the event model.
    #[error("invalid event: {0}")]
    Validation(#[from] ValidationError),
    /// Failed to encode or decode the timer's segment column.
    #[error("invalid timer segments: {0}")]
    Serialization(#[from] serde_json::Error),
    /// An active-session transition was not allowed.
    #[error(transparent)]
    Timer(#[from] TimerError),
}

/// Database connection wrapper.
///
/// See the [module documentation](self) for thread safety considerations.
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Opens a database at the given path, creating it if necessary.
    ///
    /// The database schema is automatically initialized on first open.
    pub fn open(path: &Path) -> Result<Self, DbError> {
        let conn = Connection::open(path)?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    /// Opens an in-memory database.
    ///
    /// Useful for testing. The database is destroyed when the connection closes.
    pub fn open_in_memory() -> Result<Self, DbError> {
        let conn = Connection::open_in_memory()?;
        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    /// Initializes the database schema.
    ///
    /// This is idempotent - safe to call on an already-initialized database.
    fn init(&self) -> Result<(), DbError> {
        self.conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        self.conn.execute_batch(
            "
            -- Events table: one row per care occurrence, never physically deleted
            -- start_ts/end_ts: sleep interval (end_ts NULL while in progress)
            -- ts: instant of a point event (feed, nappy)
            CREATE TABLE IF NOT EXISTS events (
                event_id TEXT PRIMARY KEY,
                device_id TEXT NOT NULL,
                type TEXT NOT NULL,
                created_ts INTEGER NOT NULL,
                updated_ts INTEGER NOT NULL,
                version INTEGER NOT NULL DEFAULT 1,
                deleted INTEGER NOT NULL DEFAULT 0,
                start_ts INTEGER,
                end_ts INTEGER,
                ts INTEGER,
                feed_mode TEXT,
                bottle_amount_ml INTEGER,
                solids_amount INTEGER,
                duration_s INTEGER,
                nappy_type TEXT,
                note TEXT,
                synced_version INTEGER NOT NULL DEFAULT 0
            );

            CREATE INDEX IF NOT EXISTS idx_events_start_ts ON events(start_ts);
            CREATE INDEX IF NOT EXISTS idx_events_end_ts ON events(end_ts);
            CREATE INDEX IF NOT EXISTS idx_events_ts ON events(ts);

            CREATE TABLE IF NOT EXISTS feed_segments (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                event_id TEXT NOT NULL,
                side TEXT NOT NULL,
                start_ts INTEGER NOT NULL,
                end_ts INTEGER NOT NULL,
                open INTEGER NOT NULL DEFAULT 0,
                FOREIGN KEY (event_id) REFERENCES events(event_id) ON DELETE CASCADE
            );

            CREATE INDEX IF NOT EXISTS idx_feed_segments_event ON feed_segments(event_id);
            CREATE INDEX IF NOT EXISTS idx_feed_segments_start_ts ON feed_segments(start_ts);

            CREATE TABLE IF NOT EXISTS sync_state (
                id INTEGER PRIMARY KEY CHECK (id = 1),
                last_server_clock INTEGER NOT NULL DEFAULT 0,
                device_id TEXT,
                paired INTEGER NOT NULL DEFAULT 0
            );

            -- Active timer: at most one running session per device
            -- segments: JSON array of closed feed segments
            CREATE TABLE IF NOT EXISTS active_timer (
                id INTEGER PRIMARY KEY CHECK (id = 1),
                type TEXT NOT NULL,
                start_epoch INTEGER NOT NULL,
                end_epoch INTEGER NOT NULL,
                running INTEGER NOT NULL,
                details TEXT,
                segments TEXT NOT NULL DEFAULT '[]',
                active_side TEXT,
                current_start INTEGER
            );
            ",
        )?;
        Ok(())
    }

    /// Begins a write transaction that takes the write lock up front, so a
    /// read-modify-write never observes a half-applied change from another
    /// connection.
    fn write_tx(&mut self) -> Result<Transaction<'_>, DbError> {
        Ok(self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?)
    }
}

/// Column list shared by every event query, in [`EventRow`] order.
const EVENT_COLUMNS: &str = "event_id, device_id, type, created_ts, updated_ts, version, deleted, \
     start_ts, end_ts, ts, feed_mode, bottle_amount_ml, solids_amount, duration_s, nappy_type, note";

/// An event as stored, before validation.
#[derive(Debug)]
struct EventRow {
    event_id: String,
    device_id: String,
    kind: String,
    created_ts: i64,
    updated_ts: i64,
    version: i64,
    deleted: bool,
    start_ts: Option<i64>,
    end_ts: Option<i64>,
    ts: Option<i64>,
    feed_mode: Option<String>,
    bottle_amount_ml: Option<u32>,
    solids_amount: Option<u32>,
    duration_s: Option<i64>,
    nappy_type: Option<String>,
    note: Option<String>,
}

impl EventRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            event_id: row.get(0)?,
            device_id: row.get(1)?,
            kind: row.get(2)?,
            created_ts: row.get(3)?,
            updated_ts: row.get(4)?,
            version: row.get(5)?,
            deleted: row.get(6)?,
            start_ts: row.get(7)?,
            end_ts: row.get(8)?,
            ts: row.get(9)?,
            feed_mode: row.get(10)?,
            bottle_amount_ml: row.get(11)?,
            solids_amount: row.get(12)?,
            duration_s: row.get(13)?,
            nappy_type: row.get(14)?,
            note: row.get(15)?,
        })
    }

    fn into_event(self) -> Result<Event, DbError> {
        let invalid = |message: String| DbError::InvalidEventData {
            event_id: self.event_id.clone(),
            message,
        };
        let event_type: EventType = self.kind.parse().map_err(|e| invalid(format!("{e}")))?;
        let feed_mode = self
            .feed_mode
            .as_deref()
            .map(str::parse::<FeedMode>)
            .transpose()
            .map_err(|e| invalid(format!("{e}")))?;
        let anchor = Anchor::from_columns(&self.event_id, self.start_ts, self.end_ts, self.ts)
            .map_err(|e| invalid(format!("{e}")))?;
        let device_id = DeviceId::new(self.device_id.clone()).map_err(|e| invalid(format!("{e}")))?;
        let event_id = EventId::new(self.event_id.clone()).map_err(|e| invalid(format!("{e}")))?;

        Ok(Event {
            event_id,
            device_id,
            event_type,
            created_ts: self.created_ts,
            updated_ts: self.updated_ts,
            version: self.version,
            deleted: self.deleted,
            anchor,
            feed_mode,
            bottle_amount_ml: self.bottle_amount_ml,
            solids_amount: self.solids_amount,
            duration_s: self.duration_s,
            nappy_type: self.nappy_type,
            note: self.note,
        })
    }
}

/// Runs an event query and validates every row.
fn query_events<P: rusqlite::Params>(
    conn: &Connection,
    sql: &str,
    params: P,
) -> Result<Vec<Event>, DbError> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt.query_map(params, EventRow::from_row)?;
    let mut events = Vec::new();
    for row in rows {
        events.push(row?.into_event()?);
    }
    Ok(events)
}

fn load_event(conn: &Connection, event_id: &str) -> Result<Option<Event>, DbError> {
    let row = conn
        .query_row(
            &format!("SELECT {EVENT_COLUMNS} FROM events WHERE event_id = ?"),
            [event_id],
            EventRow::from_row,
        )
        .optional()?;
    row.map(EventRow::into_event).transpose()
}

/// Inserts or overwrites an event row, keeping its segments.
///
/// `synced_version` of `None` leaves an existing row's acknowledgement as is
/// (0 for new rows).
fn upsert_event(
    conn: &Connection,
    event: &Event,
    synced_version: Option<i64>,
) -> Result<(), DbError> {
    conn.execute(
        "
        INSERT INTO events
        (event_id, device_id, type, created_ts, updated_ts, version, deleted,
         start_ts, end_ts, ts, feed_mode, bottle_amount_ml, solids_amount, duration_s,
         nappy_type, note, synced_version)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, COALESCE(?17, 0))
        ON CONFLICT(event_id) DO UPDATE SET
            device_id = excluded.device_id,
            type = excluded.type,
            created_ts = excluded.created_ts,
            updated_ts = excluded.updated_ts,
            version = excluded.version,
            deleted = excluded.deleted,
            start_ts = excluded.start_ts,
            end_ts = excluded.end_ts,
            ts = excluded.ts,
            feed_mode = excluded.feed_mode,
            bottle_amount_ml = excluded.bottle_amount_ml,
            solids_amount = excluded.solids_amount,
            duration_s = excluded.duration_s,
            nappy_type = excluded.nappy_type,
            note = excluded.note,
            synced_version = COALESCE(?17, events.synced_version)
        ",
        params![
            event.event_id.as_str(),
            event.device_id.as_str(),
            event.event_type.as_str(),
            event.created_ts,
            event.updated_ts,
            event.version,
            event.deleted,
            event.anchor.start_ts(),
            event.anchor.end_ts(),
            event.anchor.ts(),
            event.feed_mode.map(|mode| mode.as_str()),
            event.bottle_amount_ml,
            event.solids_amount,
            event.duration_s,
            event.nappy_type,
            event.note,
            synced_version,
        ],
    )?;
    Ok(())
}

fn insert_segment(
    conn: &Connection,
    event_id: &EventId,
    side: BreastSide,
    start_ts: i64,
    end_ts: i64,
    open: bool,
) -> Result<i64, DbError> {
    conn.execute(
        "INSERT INTO feed_segments (event_id, side, start_ts, end_ts, open) VALUES (?, ?, ?, ?, ?)",
        params![event_id.as_str(), side.as_str(), start_ts, end_ts, open],
    )?;
    Ok(conn.last_insert_rowid())
}

/// A feed segment as stored, before validation.
#[derive(Debug)]
struct SegmentRow {
    id: i64,
    event_id: String,
    side: String,
    start_ts: i64,
    end_ts: i64,
    open: bool,
}

/// Column list shared by every segment query, in [`SegmentRow`] order.
const SEGMENT_COLUMNS: &str = "id, event_id, side, start_ts, end_ts, open";

impl SegmentRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            event_id: row.get(1)?,
            side: row.get(2)?,
            start_ts: row.get(3)?,
            end_ts: row.get(4)?,
            open: row.get(5)?,
        })
    }

    fn into_segment(self) -> Result<FeedSegment, DbError> {
        let invalid = |message: String| DbError::InvalidEventData {
            event_id: self.event_id.clone(),
            message,
        };
        let side: BreastSide = self.side.parse().map_err(|e| invalid(format!("{e}")))?;
        let event_id = EventId::new(self.event_id.clone()).map_err(|e| invalid(format!("{e}")))?;
        Ok(FeedSegment {
            id: self.id,
            event_id,
            side,
            start_ts: self.start_ts,
            end_ts: self.end_ts,
            open: self.open,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn open_in_memory_database() {
        let db = Database::open_in_memory();
        assert!(db.is_ok());
    }

    #[test]
    fn schema_matches_data_model() {
        let db = Database::open_in_memory().expect("open in-memory db");

        let events_columns = table_columns(&db.conn, "events");
        assert_eq!(
            events_columns,
            vec![
                "event_id",
                "device_id",
                "type",
                "created_ts",
                "updated_ts",
                "version",
                "deleted",
                "start_ts",
                "end_ts",
                "ts",
                "feed_mode",
                "bottle_amount_ml",
                "solids_amount",
                "duration_s",
                "nappy_type",
                "note",
                "synced_version",
            ]
        );

        let segment_columns = table_columns(&db.conn, "feed_segments");
        assert_eq!(
            segment_columns,
            vec!["id", "event_id", "side", "start_ts", "end_ts", "open"]
        );

        let sync_columns = table_columns(&db.conn, "sync_state");
        assert_eq!(
            sync_columns,
            vec!["id", "last_server_clock", "device_id", "paired"]
        );

        let timer_columns = table_columns(&db.conn, "active_timer");
        assert_eq!(
            timer_columns,
            vec![
                "id",
                "type",
                "start_epoch",
                "end_epoch",
                "running",
                "details",
                "segments",
                "active_side",
                "current_start",
            ]
        );

        let event_indexes = index_names(&db.conn, "events");
        let expected: HashSet<String> = ["idx_events_start_ts", "idx_events_end_ts", "idx_events_ts"]
            .into_iter()
            .map(String::from)
            .collect();
        assert!(expected.is_subset(&event_indexes));

        let segment_fks = foreign_keys(&db.conn, "feed_segments");
        assert_eq!(
            segment_fks,
            vec![(
                "events".to_string(),
                "event_id".to_string(),
                "event_id".to_string(),
                "CASCADE".to_string(),
            )]
        );
    }

    #[test]
    fn init_is_idempotent_on_reopen() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("nl.db");
        {
            let mut db = Database::open(&path).unwrap();
            db.log_nappy(10, &DeviceId::new("d").unwrap(), "wet", None)
                .unwrap();
        }
        let db = Database::open(&path).unwrap();
        assert_eq!(db.events_for_day(0, 100).unwrap().len(), 1);
    }

    #[test]
    fn corrupt_rows_surface_as_invalid_event_data() {
        let db = Database::open_in_memory().unwrap();
        db.conn
            .execute(
                "INSERT INTO events (event_id, device_id, type, created_ts, updated_ts, ts)
                 VALUES ('bad', 'd', 'growth', 1, 1, 5)",
                [],
            )
            .unwrap();
        let err = db.events_for_day(0, 10).unwrap_err();
        assert!(matches!(err, DbError::InvalidEventData { ref event_id, .. } if event_id == "bad"));
    }

    fn table_columns(conn: &Connection, table: &str) -> Vec<String> {
        let mut stmt = conn
            .prepare(&format!("PRAGMA table_info({table})"))
            .expect("prepare table_info");
        let rows = stmt
            .query_map([], |row| row.get::<_, String>(1))
            .expect("query table_info");
        rows.map(|row| row.expect("table_info row")).collect()
    }

    fn index_names(conn: &Connection, table: &str) -> HashSet<String> {
        let mut stmt = conn
            .prepare(&format!("PRAGMA index_list({table})"))
            .expect("prepare index_list");
        let rows = stmt
            .query_map([], |row| row.get::<_, String>(1))
            .expect("query index_list");
        rows.map(|row| row.expect("index_list row")).collect()
    }

    fn foreign_keys(conn: &Connection, table: &str) -> Vec<(String, String, String, String)> {
        let mut stmt = conn
            .prepare(&format!("PRAGMA foreign_key_list({table})"))
            .expect("prepare foreign_key_list");
        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, String>(4)?,
                    row.get::<_, String>(6)?,
                ))
            })
            .expect("query foreign_key_list");
        rows.map(|row| row.expect("foreign_key_list row")).collect()
    }
}
