//! Sleep commands.

use std::io::Write;

use anyhow::{Context, Result};
use chrono::FixedOffset;
use nl_core::{DeviceId, EventId};
use nl_db::Database;

use super::util::{format_clock, format_duration};

pub fn start<W: Write>(
    writer: &mut W,
    db: &mut Database,
    device: &DeviceId,
    ts: i64,
    note: Option<&str>,
    offset: FixedOffset,
) -> Result<EventId> {
    let event_id = db.start_sleep(ts, device, note)?;
    writeln!(writer, "Sleep started at {} ({event_id})", format_clock(ts, offset))?;
    Ok(event_id)
}

/// Ends the given sleep, or the most recently started open one.
pub fn stop<W: Write>(
    writer: &mut W,
    db: &mut Database,
    event_id: Option<EventId>,
    end_ts: i64,
) -> Result<()> {
    let event = match event_id {
        Some(id) => db
            .get_event(&id)?
            .with_context(|| format!("No event with id {id}"))?,
        None => db
            .open_sleeps()?
            .pop()
            .context("No sleep in progress. Start one with 'nl sleep start'.")?,
    };
    let start = event
        .anchor
        .start_ts()
        .with_context(|| format!("Event {} is not a sleep", event.event_id))?;
    if end_ts < start {
        anyhow::bail!("Sleep cannot end before it started");
    }

    if !db.stop_sleep(&event.event_id, end_ts)? {
        anyhow::bail!("Event {} is not a sleep", event.event_id);
    }
    writeln!(
        writer,
        "Sleep stopped after {} ({})",
        format_duration(end_ts - start),
        event.event_id
    )?;
    Ok(())
}

pub fn log<W: Write>(
    writer: &mut W,
    db: &mut Database,
    device: &DeviceId,
    (start_ts, end_ts): (i64, i64),
    now: i64,
    note: Option<&str>,
) -> Result<EventId> {
    let event_id = db.log_sleep(start_ts, end_ts, now, device, note)?;
    writeln!(
        writer,
        "Logged sleep of {} ({event_id})",
        format_duration(end_ts - start_ts)
    )?;
    Ok(event_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn utc() -> FixedOffset {
        FixedOffset::east_opt(0).unwrap()
    }

    fn setup() -> (Database, DeviceId) {
        (
            Database::open_in_memory().unwrap(),
            DeviceId::new("phone").unwrap(),
        )
    }

    #[test]
    fn stop_without_id_ends_latest_open_sleep() {
        let (mut db, device) = setup();
        let mut output = Vec::new();
        start(&mut output, &mut db, &device, 1_000, None, utc()).unwrap();
        let latest = start(&mut output, &mut db, &device, 2_000, None, utc()).unwrap();

        output.clear();
        stop(&mut output, &mut db, None, 2_000 + 45 * 60).unwrap();

        let event = db.get_event(&latest).unwrap().unwrap();
        assert_eq!(event.anchor.end_ts(), Some(2_000 + 45 * 60));
        assert_eq!(event.version, 2);
        assert_eq!(db.open_sleeps().unwrap().len(), 1);
        assert_eq!(
            String::from_utf8(output).unwrap(),
            format!("Sleep stopped after 45m ({latest})\n")
        );
    }

    #[test]
    fn stop_with_nothing_open_fails() {
        let (mut db, _) = setup();
        let err = stop(&mut Vec::new(), &mut db, None, 5).unwrap_err();
        assert!(err.to_string().contains("No sleep in progress"));
    }

    #[test]
    fn stop_before_start_is_rejected() {
        let (mut db, device) = setup();
        let id = start(&mut Vec::new(), &mut db, &device, 1_000, None, utc()).unwrap();
        assert!(stop(&mut Vec::new(), &mut db, Some(id.clone()), 999).is_err());
        assert!(db.get_event(&id).unwrap().unwrap().anchor.is_in_progress());
    }

    #[test]
    fn log_records_completed_sleep() {
        let (mut db, device) = setup();
        let mut output = Vec::new();
        let id = log(
            &mut output,
            &mut db,
            &device,
            (0, 90 * 60),
            10_000,
            Some("car seat"),
        )
        .unwrap();

        let event = db.get_event(&id).unwrap().unwrap();
        assert_eq!(event.anchor.start_ts(), Some(0));
        assert_eq!(event.anchor.end_ts(), Some(90 * 60));
        assert_eq!(event.note.as_deref(), Some("car seat"));
        assert!(String::from_utf8(output).unwrap().starts_with("Logged sleep of 1h 30m"));
    }
}
