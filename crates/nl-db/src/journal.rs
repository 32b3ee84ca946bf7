//! The event journal: creation, mutation and range queries over events and
//! their feed segments.
//!
//! Updates that target a missing event are no-ops reported as `Ok(false)`,
//! so retried deliveries stay idempotent.

use nl_core::{
    Anchor, BreastSide, DeviceId, Event, EventAmendment, EventId, EventType, FeedMode, FeedSegment,
};
use rusqlite::{Connection, OptionalExtension, params};

use crate::{
    Database, DbError, EVENT_COLUMNS, SEGMENT_COLUMNS, SegmentRow, insert_segment, load_event,
    query_events, upsert_event,
};

impl Database {
    /// Starts an in-progress sleep at `now`.
    ///
    /// Does not check for other running sleeps.
    pub fn start_sleep(
        &mut self,
        now: i64,
        device: &DeviceId,
        note: Option<&str>,
    ) -> Result<EventId, DbError> {
        let event = Event::new(
            EventType::Sleep,
            device.clone(),
            now,
            Anchor::Span {
                start: now,
                end: None,
            },
        )
        .with_note(note.map(str::to_string));
        upsert_event(&self.conn, &event, None)?;
        tracing::debug!(event_id = %event.event_id, "sleep started");
        Ok(event.event_id)
    }

    /// Sets the end of a sleep. No-op when the sleep does not exist or
    /// started after `end_ts`.
    pub fn stop_sleep(&mut self, event_id: &EventId, end_ts: i64) -> Result<bool, DbError> {
        let changed = self.conn.execute(
            "
            UPDATE events
            SET end_ts = ?1, updated_ts = ?1, version = version + 1
            WHERE event_id = ?2 AND type = 'sleep' AND start_ts <= ?1
            ",
            params![end_ts, event_id.as_str()],
        )?;
        if changed == 0 {
            tracing::debug!(%event_id, end_ts, "stop_sleep ignored: no such sleep");
        }
        Ok(changed > 0)
    }

    /// Records an already completed sleep.
    pub fn log_sleep(
        &mut self,
        start: i64,
        end: i64,
        now: i64,
        device: &DeviceId,
        note: Option<&str>,
    ) -> Result<EventId, DbError> {
        if end < start {
            return Err(nl_core::ValidationError::InvalidSpan { start, end }.into());
        }
        let event = Event::new(
            EventType::Sleep,
            device.clone(),
            now,
            Anchor::Span {
                start,
                end: Some(end),
            },
        )
        .with_note(note.map(str::to_string));
        upsert_event(&self.conn, &event, None)?;
        Ok(event.event_id)
    }

    /// Records a nappy change at `now`.
    pub fn log_nappy(
        &mut self,
        now: i64,
        device: &DeviceId,
        nappy_type: &str,
        note: Option<&str>,
    ) -> Result<EventId, DbError> {
        let mut event = Event::new(
            EventType::Nappy,
            device.clone(),
            now,
            Anchor::Instant { ts: now },
        )
        .with_note(note.map(str::to_string));
        event.nappy_type = Some(nappy_type.to_string());
        upsert_event(&self.conn, &event, None)?;
        tracing::debug!(event_id = %event.event_id, nappy_type, "nappy logged");
        Ok(event.event_id)
    }

    /// Records a bottle or solids feed at `now`.
    pub fn log_feed(
        &mut self,
        now: i64,
        device: &DeviceId,
        mode: FeedMode,
        bottle_amount_ml: Option<u32>,
        solids_amount: Option<u32>,
        note: Option<&str>,
    ) -> Result<EventId, DbError> {
        let mut event = Event::new(EventType::Feed, device.clone(), now, Anchor::Instant { ts: now })
            .with_note(note.map(str::to_string));
        event.feed_mode = Some(mode);
        event.bottle_amount_ml = bottle_amount_ml;
        event.solids_amount = solids_amount;
        upsert_event(&self.conn, &event, None)?;
        tracing::debug!(event_id = %event.event_id, %mode, "feed logged");
        Ok(event.event_id)
    }

    /// Starts a breastfeed and opens its first, zero-length segment on `side`.
    pub fn start_breast_feed(
        &mut self,
        now: i64,
        device: &DeviceId,
        side: BreastSide,
    ) -> Result<EventId, DbError> {
        let mut event = Event::new(EventType::Feed, device.clone(), now, Anchor::Instant { ts: now });
        event.feed_mode = Some(FeedMode::Breast);

        let tx = self.write_tx()?;
        upsert_event(&tx, &event, None)?;
        insert_segment(&tx, &event.event_id, side, now, now, true)?;
        tx.commit()?;
        tracing::debug!(event_id = %event.event_id, %side, "breastfeed started");
        Ok(event.event_id)
    }

    /// Closes the open segment at `swap_ts` and opens a new one on `new_side`
    /// at the same instant. When the last segment is already closed a fresh
    /// segment is appended.
    ///
    /// `swap_ts` is clamped to the end of the last segment so segments stay
    /// ordered. No-op unless the event is a breastfeed.
    pub fn swap_breast_side(
        &mut self,
        event_id: &EventId,
        swap_ts: i64,
        new_side: BreastSide,
    ) -> Result<bool, DbError> {
        let tx = self.write_tx()?;
        if !is_breast_feed(&tx, event_id)? {
            return Ok(false);
        }
        let last: Option<(i64, i64, bool)> = tx
            .query_row(
                "
                SELECT id, end_ts, open FROM feed_segments
                WHERE event_id = ?
                ORDER BY start_ts DESC, id DESC
                LIMIT 1
                ",
                [event_id.as_str()],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .optional()?;
        let swap_ts = last.map_or(swap_ts, |(_, end_ts, _)| swap_ts.max(end_ts));
        if let Some((segment_id, _, true)) = last {
            tx.execute(
                "UPDATE feed_segments SET end_ts = ?, open = 0 WHERE id = ?",
                params![swap_ts, segment_id],
            )?;
        }
        insert_segment(&tx, event_id, new_side, swap_ts, swap_ts, true)?;
        tx.commit()?;
        tracing::debug!(%event_id, side = %new_side, swap_ts, "breast side swapped");
        Ok(true)
    }

    /// Advances the open segment's end to `now`.
    pub fn extend_open_segment(&mut self, event_id: &EventId, now: i64) -> Result<bool, DbError> {
        let changed = self.conn.execute(
            "UPDATE feed_segments SET end_ts = MAX(end_ts, ?) WHERE event_id = ? AND open = 1",
            params![now, event_id.as_str()],
        )?;
        Ok(changed > 0)
    }

    /// Closes the open segment and records the feed's total duration.
    /// No-op unless the event is a breastfeed.
    pub fn finish_breast_feed(&mut self, event_id: &EventId, end_ts: i64) -> Result<bool, DbError> {
        let tx = self.write_tx()?;
        if !is_breast_feed(&tx, event_id)? {
            return Ok(false);
        }
        tx.execute(
            "
            UPDATE feed_segments
            SET end_ts = MAX(start_ts, ?), open = 0
            WHERE event_id = ? AND open = 1
            ",
            params![end_ts, event_id.as_str()],
        )?;
        let duration: i64 = tx.query_row(
            "SELECT COALESCE(SUM(end_ts - start_ts), 0) FROM feed_segments WHERE event_id = ?",
            [event_id.as_str()],
            |row| row.get(0),
        )?;
        tx.execute(
            "
            UPDATE events
            SET duration_s = ?1, updated_ts = ?2, version = version + 1
            WHERE event_id = ?3
            ",
            params![duration, end_ts, event_id.as_str()],
        )?;
        tx.commit()?;
        tracing::debug!(%event_id, duration, "breastfeed finished");
        Ok(true)
    }

    /// Applies a partial edit. No-op when the event does not exist.
    pub fn amend_event(
        &mut self,
        event_id: &EventId,
        amendment: &EventAmendment,
        now: i64,
    ) -> Result<bool, DbError> {
        let tx = self.write_tx()?;
        let Some(mut event) = load_event(&tx, event_id.as_str())? else {
            return Ok(false);
        };
        event.amend(amendment)?;
        event.touch(now);
        upsert_event(&tx, &event, None)?;
        tx.commit()?;
        tracing::debug!(%event_id, version = event.version, "event amended");
        Ok(true)
    }

    /// Tombstones an event. Its segments stay in place but are no longer
    /// reachable through range queries.
    pub fn soft_delete(&mut self, event_id: &EventId, now: i64) -> Result<bool, DbError> {
        let changed = self.conn.execute(
            "
            UPDATE events
            SET deleted = 1, updated_ts = ?1, version = version + 1
            WHERE event_id = ?2
            ",
            params![now, event_id.as_str()],
        )?;
        Ok(changed > 0)
    }

    /// Looks up an event by id, tombstones included.
    pub fn get_event(&self, event_id: &EventId) -> Result<Option<Event>, DbError> {
        load_event(&self.conn, event_id.as_str())
    }

    /// Segments of a feed ordered by start.
    pub fn feed_segments(&self, event_id: &EventId) -> Result<Vec<FeedSegment>, DbError> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {SEGMENT_COLUMNS} FROM feed_segments WHERE event_id = ? ORDER BY start_ts ASC, id ASC"
        ))?;
        let rows = stmt.query_map([event_id.as_str()], SegmentRow::from_row)?;
        let mut segments = Vec::new();
        for row in rows {
            segments.push(row?.into_segment()?);
        }
        Ok(segments)
    }

    /// Lists live events whose primary timestamp falls in `[day_start, day_end]`,
    /// ordered by `COALESCE(start_ts, ts)`.
    ///
    /// A sleep is only returned once both `start_ts` and `end_ts` are set;
    /// in-progress sleeps are listed by [`Database::open_sleeps`].
    pub fn events_for_day(&self, day_start: i64, day_end: i64) -> Result<Vec<Event>, DbError> {
        let events = query_events(
            &self.conn,
            &format!(
                "
                SELECT {EVENT_COLUMNS}
                FROM events
                WHERE deleted = 0
                  AND ((start_ts IS NOT NULL AND end_ts IS NOT NULL) OR ts IS NOT NULL)
                  AND ((start_ts BETWEEN ?1 AND ?2) OR (ts BETWEEN ?1 AND ?2))
                ORDER BY COALESCE(start_ts, ts) ASC, event_id ASC
                "
            ),
            params![day_start, day_end],
        )?;
        tracing::debug!(count = events.len(), day_start, day_end, "loaded events for range");
        Ok(events)
    }

    /// Live sleeps that have started but not stopped.
    pub fn open_sleeps(&self) -> Result<Vec<Event>, DbError> {
        query_events(
            &self.conn,
            &format!(
                "
                SELECT {EVENT_COLUMNS}
                FROM events
                WHERE deleted = 0 AND type = 'sleep' AND start_ts IS NOT NULL AND end_ts IS NULL
                ORDER BY start_ts ASC
                "
            ),
            [],
        )
    }

    /// The most recent live event of a type.
    ///
    /// Sleeps are ordered by when they ended (or started, if running);
    /// other events by their instant.
    pub fn last_event_of_type(&self, event_type: EventType) -> Result<Option<Event>, DbError> {
        let order_key = match event_type {
            EventType::Sleep => "COALESCE(end_ts, start_ts)",
            EventType::Feed | EventType::Nappy => "COALESCE(ts, start_ts)",
        };
        let mut events = query_events(
            &self.conn,
            &format!(
                "
                SELECT {EVENT_COLUMNS}
                FROM events
                WHERE deleted = 0 AND type = ? AND {order_key} IS NOT NULL
                ORDER BY {order_key} DESC, event_id DESC
                LIMIT 1
                "
            ),
            [event_type.as_str()],
        )?;
        Ok(events.pop())
    }
}

fn is_breast_feed(conn: &Connection, event_id: &EventId) -> Result<bool, DbError> {
    let found: Option<i64> = conn
        .query_row(
            "SELECT 1 FROM events WHERE event_id = ? AND type = 'feed' AND feed_mode = 'breast'",
            [event_id.as_str()],
            |row| row.get(0),
        )
        .optional()?;
    Ok(found.is_some())
}
