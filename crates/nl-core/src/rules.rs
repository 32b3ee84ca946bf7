//! Time classification rules.
//!
//! All inputs are UTC epoch seconds; the caller supplies the local offset
//! used to interpret wall-clock hours and day boundaries.

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveTime, Timelike};
use serde::{Deserialize, Serialize};

const SECONDS_PER_DAY: i64 = 86_400;
/// Minimum length of a night sleep.
const NIGHT_MIN_DURATION_S: i64 = 2 * 3_600;
/// Local hour at which the night window opens.
const NIGHT_START_HOUR: u32 = 19;
/// Local hour at which the night window closes.
const NIGHT_END_HOUR: u32 = 7;

/// Whether a completed sleep was a daytime nap or a night sleep.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SleepClass {
    Nap,
    Night,
}

/// Classifies a sleep: night when it starts between 19:00 and 07:00 local
/// time and lasts at least two hours, otherwise a nap.
pub fn classify_sleep(start: i64, end: i64, offset: FixedOffset) -> SleepClass {
    let Some(start_local) = DateTime::from_timestamp(start, 0).map(|dt| dt.with_timezone(&offset))
    else {
        return SleepClass::Nap;
    };
    let hour = start_local.hour();
    let in_night_window = hour >= NIGHT_START_HOUR || hour < NIGHT_END_HOUR;
    let is_long = end - start >= NIGHT_MIN_DURATION_S;
    if in_night_window && is_long {
        SleepClass::Night
    } else {
        SleepClass::Nap
    }
}

/// Inclusive epoch-second bounds of a local calendar day.
pub fn day_range(date: NaiveDate, offset: FixedOffset) -> (i64, i64) {
    let midnight = date.and_time(NaiveTime::MIN).and_utc().timestamp();
    let start = midnight - i64::from(offset.local_minus_utc());
    (start, start + SECONDS_PER_DAY - 1)
}

/// The local calendar day containing an instant.
pub fn local_date(ts: i64, offset: FixedOffset) -> Option<NaiveDate> {
    DateTime::from_timestamp(ts, 0).map(|dt| dt.with_timezone(&offset).date_naive())
}
