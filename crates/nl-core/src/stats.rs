//! Daily summaries over a set of journal events.

use chrono::FixedOffset;
use serde::Serialize;

use crate::event::Event;
use crate::event_type::EventType;
use crate::rules::{SleepClass, classify_sleep};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SleepStats {
    pub total_seconds: i64,
    pub longest_stretch_seconds: i64,
    pub nap_seconds: i64,
    pub night_seconds: i64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FeedStats {
    pub feed_count: usize,
    pub bottle_ml_total: u64,
    pub solids_amount_total: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct NappyStats {
    pub count: usize,
}

/// All three summaries for one range.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DaySummary {
    pub sleep: SleepStats,
    pub feed: FeedStats,
    pub nappy: NappyStats,
}

impl DaySummary {
    pub fn compute(events: &[Event], offset: FixedOffset) -> Self {
        Self {
            sleep: sleep_stats(events, offset),
            feed: feed_stats(events),
            nappy: nappy_stats(events),
        }
    }
}

/// Totals over completed sleeps. In-progress sleeps are ignored.
pub fn sleep_stats(events: &[Event], offset: FixedOffset) -> SleepStats {
    let mut stats = SleepStats::default();
    for event in events.iter().filter(|e| e.event_type == EventType::Sleep) {
        let (Some(start), Some(end)) = (event.anchor.start_ts(), event.anchor.end_ts()) else {
            continue;
        };
        let duration = end - start;
        stats.total_seconds += duration;
        stats.longest_stretch_seconds = stats.longest_stretch_seconds.max(duration);
        match classify_sleep(start, end, offset) {
            SleepClass::Nap => stats.nap_seconds += duration,
            SleepClass::Night => stats.night_seconds += duration,
        }
    }
    stats
}

pub fn feed_stats(events: &[Event]) -> FeedStats {
    let mut stats = FeedStats::default();
    for event in events.iter().filter(|e| e.event_type == EventType::Feed) {
        stats.feed_count += 1;
        stats.bottle_ml_total += u64::from(event.bottle_amount_ml.unwrap_or(0));
        stats.solids_amount_total += u64::from(event.solids_amount.unwrap_or(0));
    }
    stats
}

pub fn nappy_stats(events: &[Event]) -> NappyStats {
    NappyStats {
        count: events
            .iter()
            .filter(|e| e.event_type == EventType::Nappy)
            .count(),
    }
}
