//! Feed commands: breastfeeds with side segments, bottles and solids.

use std::io::Write;

use anyhow::{Context, Result};
use chrono::FixedOffset;
use nl_core::{BreastSide, DeviceId, Event, EventId, EventType, FeedMode};
use nl_db::Database;

use super::util::{format_clock, format_duration};

pub fn breast<W: Write>(
    writer: &mut W,
    db: &mut Database,
    device: &DeviceId,
    now: i64,
    side: BreastSide,
    offset: FixedOffset,
) -> Result<EventId> {
    let event_id = db.start_breast_feed(now, device, side)?;
    writeln!(
        writer,
        "Breastfeed started on the {side} at {} ({event_id})",
        format_clock(now, offset)
    )?;
    Ok(event_id)
}

/// Finds the breastfeed to act on: the given one, or the latest feed if it
/// is an unfinished breastfeed.
fn resolve_breast_feed(db: &Database, event_id: Option<EventId>) -> Result<Event> {
    let event = match event_id {
        Some(id) => db
            .get_event(&id)?
            .with_context(|| format!("No event with id {id}"))?,
        None => db
            .last_event_of_type(EventType::Feed)?
            .filter(|event| event.duration_s.is_none())
            .context("No breastfeed in progress. Start one with 'nl feed breast'.")?,
    };
    if event.feed_mode != Some(FeedMode::Breast) {
        anyhow::bail!("Event {} is not a breastfeed", event.event_id);
    }
    Ok(event)
}

pub fn swap<W: Write>(
    writer: &mut W,
    db: &mut Database,
    event_id: Option<EventId>,
    now: i64,
    side: Option<BreastSide>,
) -> Result<()> {
    let event = resolve_breast_feed(db, event_id)?;
    let side = match side {
        Some(side) => side,
        None => db
            .feed_segments(&event.event_id)?
            .last()
            .map_or(BreastSide::Left, |segment| segment.side.other()),
    };
    db.swap_breast_side(&event.event_id, now, side)?;
    writeln!(writer, "Switched to the {side} ({})", event.event_id)?;
    Ok(())
}

pub fn tick<W: Write>(
    writer: &mut W,
    db: &mut Database,
    event_id: Option<EventId>,
    now: i64,
) -> Result<()> {
    let event = resolve_breast_feed(db, event_id)?;
    if !db.extend_open_segment(&event.event_id, now)? {
        anyhow::bail!("Breastfeed {} has no open side", event.event_id);
    }
    if let Some(segment) = db.feed_segments(&event.event_id)?.last() {
        writeln!(
            writer,
            "{} side at {} ({})",
            segment.side,
            format_duration(segment.duration_s()),
            event.event_id
        )?;
    }
    Ok(())
}

pub fn finish<W: Write>(
    writer: &mut W,
    db: &mut Database,
    event_id: Option<EventId>,
    end_ts: i64,
) -> Result<()> {
    let event = resolve_breast_feed(db, event_id)?;
    db.finish_breast_feed(&event.event_id, end_ts)?;

    let segments = db.feed_segments(&event.event_id)?;
    let sides: Vec<String> = segments
        .iter()
        .map(|segment| format!("{} {}", segment.side, format_duration(segment.duration_s())))
        .collect();
    let total = segments.iter().map(nl_core::FeedSegment::duration_s).sum();
    writeln!(
        writer,
        "Breastfeed finished: {} ({})",
        format_duration(total),
        sides.join(", ")
    )?;
    Ok(())
}

pub fn bottle<W: Write>(
    writer: &mut W,
    db: &mut Database,
    device: &DeviceId,
    ts: i64,
    ml: u32,
    note: Option<&str>,
) -> Result<EventId> {
    let event_id = db.log_feed(ts, device, FeedMode::Bottle, Some(ml), None, note)?;
    writeln!(writer, "Bottle of {ml} ml logged ({event_id})")?;
    Ok(event_id)
}

pub fn solids<W: Write>(
    writer: &mut W,
    db: &mut Database,
    device: &DeviceId,
    ts: i64,
    amount: u32,
    note: Option<&str>,
) -> Result<EventId> {
    let event_id = db.log_feed(ts, device, FeedMode::Solids, None, Some(amount), note)?;
    writeln!(writer, "Solids ({amount}) logged ({event_id})")?;
    Ok(event_id)
}
