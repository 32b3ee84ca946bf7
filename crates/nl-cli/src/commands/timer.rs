//! Active-session timer commands.
//!
//! The session is a single durable record, so each invocation picks up
//! whatever an earlier process left behind.

use std::io::Write;

use anyhow::{Context, Result};
use chrono::FixedOffset;
use nl_core::{ActiveTimer, BreastSide, DeviceId, EventId, EventType};
use nl_db::{Database, TickOutcome};

use super::util::{format_clock, format_duration};

pub fn start<W: Write>(
    writer: &mut W,
    db: &mut Database,
    kind: EventType,
    now: i64,
    details: Option<&str>,
    side: Option<BreastSide>,
    offset: FixedOffset,
) -> Result<()> {
    let timer = db.begin_timer(kind, now, details, side)?;
    write!(writer, "Started {kind} timer at {}", format_clock(now, offset))?;
    if let Some(side) = timer.active_side {
        write!(writer, " on the {side}")?;
    }
    writeln!(writer)?;
    Ok(())
}

pub fn tick<W: Write>(writer: &mut W, db: &mut Database, now: i64) -> Result<()> {
    match db.tick_timer(now)? {
        TickOutcome::Refreshed { end_epoch } => {
            tracing::debug!(end_epoch, "timer ticked");
            writeln!(writer, "Timer refreshed")?;
        }
        TickOutcome::Inactive => writeln!(writer, "No timer running.")?,
    }
    Ok(())
}

pub fn swap<W: Write>(
    writer: &mut W,
    db: &mut Database,
    now: i64,
    side: Option<BreastSide>,
) -> Result<()> {
    let side = match side {
        Some(side) => side,
        None => db
            .active_timer()?
            .context("No timer running.")?
            .active_side
            .map_or(BreastSide::Left, |side| side.other()),
    };
    db.swap_timer_side(now, side)?;
    writeln!(writer, "Switched to the {side}")?;
    Ok(())
}

pub fn status<W: Write>(
    writer: &mut W,
    db: &Database,
    now: i64,
    offset: FixedOffset,
) -> Result<()> {
    match db.active_timer()? {
        Some(timer) => write_timer(writer, &timer, now, offset)?,
        None => writeln!(writer, "No timer running.")?,
    }
    Ok(())
}

/// Writes a running session. Elapsed time counts to `now` when that is later
/// than the last persisted refresh.
pub fn write_timer<W: Write>(
    writer: &mut W,
    timer: &ActiveTimer,
    now: i64,
    offset: FixedOffset,
) -> Result<()> {
    let elapsed = now.max(timer.end_epoch) - timer.start_epoch;
    writeln!(
        writer,
        "{} timer running since {} ({})",
        timer.kind,
        format_clock(timer.start_epoch, offset),
        format_duration(elapsed)
    )?;
    for segment in timer.segments_closed_at(now.max(timer.end_epoch)) {
        writeln!(
            writer,
            "  {:<5} {}-{} ({})",
            segment.side.as_str(),
            format_clock(segment.start, offset),
            format_clock(segment.end, offset),
            format_duration(segment.end - segment.start)
        )?;
    }
    if let Some(details) = &timer.details {
        writeln!(writer, "  details: {details}")?;
    }
    Ok(())
}

pub fn save<W: Write>(
    writer: &mut W,
    db: &mut Database,
    device: &DeviceId,
    now: i64,
) -> Result<Option<EventId>> {
    let Some(timer) = db.active_timer()? else {
        writeln!(writer, "No timer running.")?;
        return Ok(None);
    };
    let saved = db.finish_timer(device, now)?;
    if let Some(event_id) = &saved {
        writeln!(
            writer,
            "Saved {} of {} ({event_id})",
            timer.kind,
            format_duration(now.max(timer.end_epoch) - timer.start_epoch)
        )?;
    }
    Ok(saved)
}

pub fn discard<W: Write>(writer: &mut W, db: &mut Database) -> Result<()> {
    if db.discard_timer()? {
        writeln!(writer, "Timer discarded")?;
    } else {
        writeln!(writer, "No timer running.")?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use insta::assert_snapshot;
    use nl_core::FeedMode;

    use super::*;

    fn setup() -> (Database, DeviceId, FixedOffset) {
        (
            Database::open_in_memory().unwrap(),
            DeviceId::new("phone").unwrap(),
            FixedOffset::east_opt(0).unwrap(),
        )
    }

    #[test]
    fn feed_session_status_lists_segments() {
        let (mut db, _, utc) = setup();
        start(
            &mut Vec::new(),
            &mut db,
            EventType::Feed,
            0,
            Some("sleepy latch"),
            Some(BreastSide::Right),
            utc,
        )
        .unwrap();
        swap(&mut Vec::new(), &mut db, 7 * 60, None).unwrap();

        let mut output = Vec::new();
        status(&mut output, &db, 12 * 60, utc).unwrap();

        assert_snapshot!(String::from_utf8(output).unwrap(), @r"
feed timer running since 00:00 (12m)
  right 00:00-00:07 (7m)
  left  00:07-00:12 (5m)
  details: sleepy latch
");
    }

    #[test]
    fn second_start_is_rejected() {
        let (mut db, _, utc) = setup();
        start(&mut Vec::new(), &mut db, EventType::Sleep, 0, None, None, utc).unwrap();
        let err = start(&mut Vec::new(), &mut db, EventType::Feed, 5, None, None, utc).unwrap_err();
        assert!(err.to_string().contains("already running"));
    }

    #[test]
    fn swap_without_timer_fails() {
        let (mut db, _, _) = setup();
        let err = swap(&mut Vec::new(), &mut db, 0, None).unwrap_err();
        assert!(err.to_string().contains("No timer running"));
    }

    #[test]
    fn save_commits_feed_and_clears_timer() {
        let (mut db, device, utc) = setup();
        start(&mut Vec::new(), &mut db, EventType::Feed, 100, None, None, utc).unwrap();
        swap(&mut Vec::new(), &mut db, 400, None).unwrap();
        tick(&mut Vec::new(), &mut db, 700).unwrap();

        let mut output = Vec::new();
        let event_id = save(&mut output, &mut db, &device, 700).unwrap().unwrap();

        let event = db.get_event(&event_id).unwrap().unwrap();
        assert_eq!(event.feed_mode, Some(FeedMode::Breast));
        assert_eq!(event.anchor.ts(), Some(100));
        assert_eq!(event.duration_s, Some(600));
        assert_eq!(db.feed_segments(&event_id).unwrap().len(), 2);
        assert!(db.active_timer().unwrap().is_none());
        assert_eq!(
            String::from_utf8(output).unwrap(),
            format!("Saved feed of 10m ({event_id})\n")
        );
    }

    #[test]
    fn save_and_discard_without_timer_are_noops() {
        let (mut db, device, _) = setup();
        let mut output = Vec::new();
        assert!(save(&mut output, &mut db, &device, 10).unwrap().is_none());
        discard(&mut output, &mut db).unwrap();
        tick(&mut output, &mut db, 10).unwrap();
        assert_eq!(
            String::from_utf8(output).unwrap(),
            "No timer running.\nNo timer running.\nNo timer running.\n"
        );
    }
}
