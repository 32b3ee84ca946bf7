//! Persistence for the active-timer singleton.
//!
//! Every transition is written through before it returns, so a session can be
//! picked up again by a new process after a crash or restart.

use nl_core::{
    ActiveTimer, Anchor, BreastSide, DeviceId, Event, EventId, EventType, FeedMode, TimerError,
    TimerSegment,
};
use rusqlite::{Connection, OptionalExtension, Row, params};

use crate::{Database, DbError, insert_segment, upsert_event};

/// Result of a periodic refresh.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// The session is still running; its last observed instant is `end_epoch`.
    Refreshed { end_epoch: i64 },
    /// No session is running. Refreshers should stop.
    Inactive,
}

impl Database {
    /// The persisted session, if any.
    pub fn active_timer(&self) -> Result<Option<ActiveTimer>, DbError> {
        load_timer(&self.conn)
    }

    /// Starts a session. Fails if one is already running.
    pub fn begin_timer(
        &mut self,
        kind: EventType,
        now: i64,
        details: Option<&str>,
        side: Option<BreastSide>,
    ) -> Result<ActiveTimer, DbError> {
        let tx = self.write_tx()?;
        if let Some(existing) = load_timer(&tx)? {
            return Err(TimerError::AlreadyRunning {
                kind: existing.kind,
            }
            .into());
        }
        let timer = ActiveTimer::begin(kind, now, details.map(str::to_string), side)?;
        save_timer(&tx, &timer)?;
        tx.commit()?;
        tracing::info!(%kind, start_epoch = now, "timer started");
        Ok(timer)
    }

    /// Refreshes the session's last observed instant.
    pub fn tick_timer(&mut self, now: i64) -> Result<TickOutcome, DbError> {
        let tx = self.write_tx()?;
        let Some(mut timer) = load_timer(&tx)? else {
            return Ok(TickOutcome::Inactive);
        };
        if !timer.running {
            return Ok(TickOutcome::Inactive);
        }
        timer.tick(now)?;
        save_timer(&tx, &timer)?;
        tx.commit()?;
        Ok(TickOutcome::Refreshed {
            end_epoch: timer.end_epoch,
        })
    }

    /// Swaps the breast side of a running feed session.
    pub fn swap_timer_side(&mut self, now: i64, side: BreastSide) -> Result<ActiveTimer, DbError> {
        let tx = self.write_tx()?;
        let mut timer = load_timer(&tx)?.ok_or(TimerError::NotRunning)?;
        timer.swap_side(now, side)?;
        save_timer(&tx, &timer)?;
        tx.commit()?;
        tracing::debug!(%side, now, "timer side swapped");
        Ok(timer)
    }

    /// Drops the session without recording anything. Returns whether one existed.
    pub fn discard_timer(&mut self) -> Result<bool, DbError> {
        let removed = self.conn.execute("DELETE FROM active_timer WHERE id = 1", [])?;
        if removed > 0 {
            tracing::info!("timer discarded");
        }
        Ok(removed > 0)
    }

    /// Converts the session into a journal event and clears it, atomically.
    ///
    /// A sleep becomes a completed interval ending at the later of the last
    /// tick and `now`. A feed becomes a breastfeed at its start instant with
    /// every segment closed. Returns `None` when no session is running.
    pub fn finish_timer(&mut self, device: &DeviceId, now: i64) -> Result<Option<EventId>, DbError> {
        let tx = self.write_tx()?;
        let Some(timer) = load_timer(&tx)? else {
            return Ok(None);
        };
        let end = timer.end_epoch.max(now);

        let (event, segments) = match timer.kind {
            EventType::Sleep => {
                let event = Event::new(
                    EventType::Sleep,
                    device.clone(),
                    now,
                    Anchor::Span {
                        start: timer.start_epoch,
                        end: Some(end),
                    },
                );
                (event, Vec::new())
            }
            EventType::Feed => {
                let segments = timer.segments_closed_at(end);
                let mut event = Event::new(
                    EventType::Feed,
                    device.clone(),
                    now,
                    Anchor::Instant {
                        ts: timer.start_epoch,
                    },
                );
                event.feed_mode = Some(FeedMode::Breast);
                event.duration_s = Some(segments.iter().map(|s| s.end - s.start).sum());
                (event, segments)
            }
            EventType::Nappy => return Err(TimerError::Untimed { kind: timer.kind }.into()),
        };
        let event = event.with_note(timer.details.clone());

        upsert_event(&tx, &event, None)?;
        for segment in &segments {
            insert_segment(
                &tx,
                &event.event_id,
                segment.side,
                segment.start,
                segment.end,
                false,
            )?;
        }
        tx.execute("DELETE FROM active_timer WHERE id = 1", [])?;
        tx.commit()?;
        tracing::info!(event_id = %event.event_id, kind = %timer.kind, "timer saved to journal");
        Ok(Some(event.event_id))
    }
}

#[derive(Debug)]
struct TimerRow {
    kind: String,
    start_epoch: i64,
    end_epoch: i64,
    running: bool,
    details: Option<String>,
    segments: String,
    active_side: Option<String>,
    current_start: Option<i64>,
}

impl TimerRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            kind: row.get(0)?,
            start_epoch: row.get(1)?,
            end_epoch: row.get(2)?,
            running: row.get(3)?,
            details: row.get(4)?,
            segments: row.get(5)?,
            active_side: row.get(6)?,
            current_start: row.get(7)?,
        })
    }

    fn into_timer(self) -> Result<ActiveTimer, DbError> {
        let segments: Vec<TimerSegment> = serde_json::from_str(&self.segments)?;
        Ok(ActiveTimer {
            kind: self.kind.parse()?,
            start_epoch: self.start_epoch,
            end_epoch: self.end_epoch,
            running: self.running,
            details: self.details,
            segments,
            active_side: self.active_side.as_deref().map(str::parse).transpose()?,
            current_start: self.current_start,
        })
    }
}

fn load_timer(conn: &Connection) -> Result<Option<ActiveTimer>, DbError> {
    let row = conn
        .query_row(
            "
            SELECT type, start_epoch, end_epoch, running, details, segments, active_side, current_start
            FROM active_timer WHERE id = 1
            ",
            [],
            TimerRow::from_row,
        )
        .optional()?;
    row.map(TimerRow::into_timer).transpose()
}

fn save_timer(conn: &Connection, timer: &ActiveTimer) -> Result<(), DbError> {
    conn.execute(
        "
        INSERT INTO active_timer
        (id, type, start_epoch, end_epoch, running, details, segments, active_side, current_start)
        VALUES (1, ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
        ON CONFLICT(id) DO UPDATE SET
            type = excluded.type,
            start_epoch = excluded.start_epoch,
            end_epoch = excluded.end_epoch,
            running = excluded.running,
            details = excluded.details,
            segments = excluded.segments,
            active_side = excluded.active_side,
            current_start = excluded.current_start
        ",
        params![
            timer.kind.as_str(),
            timer.start_epoch,
            timer.end_epoch,
            timer.running,
            timer.details,
            serde_json::to_string(&timer.segments)?,
            timer.active_side.map(|side| side.as_str()),
            timer.current_start,
        ],
    )?;
    Ok(())
}
