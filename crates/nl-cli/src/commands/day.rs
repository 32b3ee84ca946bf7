//! Day view: one local day's events and totals.

use std::io::Write;

use anyhow::Result;
use chrono::{FixedOffset, NaiveDate};
use nl_core::{Anchor, DaySummary, Event, EventType, FeedMode, day_range};
use nl_db::Database;
use serde::Serialize;

use super::util::{format_clock, format_duration};

/// JSON shape of `nl day --json`.
#[derive(Debug, Serialize)]
struct DayReport<'a> {
    date: NaiveDate,
    summary: DaySummary,
    events: &'a [Event],
    in_progress: &'a [Event],
}

pub fn run<W: Write>(
    writer: &mut W,
    db: &Database,
    date: NaiveDate,
    offset: FixedOffset,
    json: bool,
) -> Result<()> {
    let (day_start, day_end) = day_range(date, offset);
    let events = db.events_for_day(day_start, day_end)?;
    // Open sleeps have no end and are not part of the day query; show the
    // ones already running by the end of this day separately.
    let in_progress: Vec<Event> = db
        .open_sleeps()?
        .into_iter()
        .filter(|event| event.primary_ts() <= day_end)
        .collect();
    tracing::debug!(%date, events = events.len(), "loaded day");

    if json {
        let report = DayReport {
            date,
            summary: DaySummary::compute(&events, offset),
            events: &events,
            in_progress: &in_progress,
        };
        serde_json::to_writer_pretty(&mut *writer, &report)?;
        writeln!(writer)?;
        return Ok(());
    }

    render(writer, date, offset, &events, &in_progress)
}

/// Renders the human-readable day view.
pub fn render<W: Write>(
    writer: &mut W,
    date: NaiveDate,
    offset: FixedOffset,
    events: &[Event],
    in_progress: &[Event],
) -> Result<()> {
    writeln!(writer, "{date} (UTC{offset})")?;
    writeln!(writer)?;

    if events.is_empty() && in_progress.is_empty() {
        writeln!(writer, "No events recorded.")?;
    }
    for event in events.iter().chain(in_progress) {
        let (when, what) = describe(event, offset);
        writeln!(writer, "{when:<11}  {what}  ({})", event.event_id)?;
    }
    writeln!(writer)?;

    let summary = DaySummary::compute(events, offset);
    writeln!(
        writer,
        "Sleep:   {} total, longest {} (naps {}, night {})",
        format_duration(summary.sleep.total_seconds),
        format_duration(summary.sleep.longest_stretch_seconds),
        format_duration(summary.sleep.nap_seconds),
        format_duration(summary.sleep.night_seconds),
    )?;
    writeln!(
        writer,
        "Feeds:   {} (bottle {} ml, solids {})",
        summary.feed.feed_count, summary.feed.bottle_ml_total, summary.feed.solids_amount_total,
    )?;
    writeln!(writer, "Nappies: {}", summary.nappy.count)?;
    Ok(())
}

fn describe(event: &Event, offset: FixedOffset) -> (String, String) {
    let when = match event.anchor {
        Anchor::Span { start, end: Some(end) } => {
            format!("{}-{}", format_clock(start, offset), format_clock(end, offset))
        }
        Anchor::Span { start, end: None } => format!("{}-", format_clock(start, offset)),
        Anchor::Instant { ts } => format_clock(ts, offset),
    };

    let mut what = match event.event_type {
        EventType::Sleep => match (event.anchor.start_ts(), event.anchor.end_ts()) {
            (Some(start), Some(end)) => format!("sleep {}", format_duration(end - start)),
            _ => "sleeping".to_string(),
        },
        EventType::Feed => match event.feed_mode {
            Some(FeedMode::Breast) => event.duration_s.map_or_else(
                || "breastfeed (in progress)".to_string(),
                |duration| format!("breastfeed {}", format_duration(duration)),
            ),
            Some(FeedMode::Bottle) => {
                format!("bottle {} ml", event.bottle_amount_ml.unwrap_or(0))
            }
            Some(FeedMode::Solids) => format!("solids {}", event.solids_amount.unwrap_or(0)),
            None => "feed".to_string(),
        },
        EventType::Nappy => format!("nappy {}", event.nappy_type.as_deref().unwrap_or("?")),
    };
    if let Some(note) = &event.note {
        what.push_str(&format!(" \"{note}\""));
    }
    (when, what)
}
