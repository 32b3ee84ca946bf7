//! Shared utilities for CLI commands.

use anyhow::Context;
use chrono::{DateTime, Days, FixedOffset, NaiveDate, NaiveTime};
use nl_core::EventId;

/// Parse a time argument as either RFC 3339 or a local wall-clock time.
///
/// Supports:
/// - RFC 3339: "2026-01-15T10:30:00Z"
/// - Local time: "10:30", resolved to its most recent occurrence at or before `now`
pub fn parse_time(s: &str, offset: FixedOffset, now: i64) -> anyhow::Result<i64> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.timestamp());
    }

    let Ok(time) = NaiveTime::parse_from_str(s, "%H:%M") else {
        anyhow::bail!("Invalid time: {s}. Use RFC 3339 (e.g., 2026-01-15T10:30:00Z) or HH:MM");
    };

    let today = nl_core::local_date(now, offset).context("current time is out of range")?;
    let candidate = local_timestamp(today, time, offset);
    if candidate <= now {
        return Ok(candidate);
    }
    let yesterday = today
        .checked_sub_days(Days::new(1))
        .context("date out of range")?;
    Ok(local_timestamp(yesterday, time, offset))
}

/// Resolves an optional `--at` argument, defaulting to `now`.
pub fn parse_at(at: Option<&str>, offset: FixedOffset, now: i64) -> anyhow::Result<i64> {
    at.map_or(Ok(now), |s| parse_time(s, offset, now))
}

/// Parse a YYYY-MM-DD date.
pub fn parse_date(s: &str) -> anyhow::Result<NaiveDate> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .with_context(|| format!("Invalid date: {s}. Use YYYY-MM-DD"))
}

pub fn parse_event_id(s: &str) -> anyhow::Result<EventId> {
    EventId::new(s).context("invalid event id")
}

fn local_timestamp(date: NaiveDate, time: NaiveTime, offset: FixedOffset) -> i64 {
    date.and_time(time).and_utc().timestamp() - i64::from(offset.local_minus_utc())
}

/// Formats an instant as local `HH:MM`.
pub fn format_clock(ts: i64, offset: FixedOffset) -> String {
    DateTime::from_timestamp(ts, 0).map_or_else(
        || ts.to_string(),
        |dt| dt.with_timezone(&offset).format("%H:%M").to_string(),
    )
}

/// Formats a duration in seconds as `1h 05m`, or `12m` under an hour.
pub fn format_duration(seconds: i64) -> String {
    let minutes = seconds.max(0) / 60;
    let (hours, minutes) = (minutes / 60, minutes % 60);
    if hours > 0 {
        format!("{hours}h {minutes:02}m")
    } else {
        format!("{minutes}m")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn utc() -> FixedOffset {
        FixedOffset::east_opt(0).unwrap()
    }

    /// 2026-01-15T12:00:00Z
    const NOON: i64 = 1_768_478_400;

    #[test]
    fn test_parse_time_rfc3339() {
        let ts = parse_time("2026-01-15T10:30:00Z", utc(), NOON).unwrap();
        assert_eq!(ts, NOON - 90 * 60);

        let ts = parse_time("2026-01-15T10:30:00+01:00", utc(), NOON).unwrap();
        assert_eq!(ts, NOON - 150 * 60);
    }

    #[test]
    fn test_parse_time_local_clock_today() {
        let ts = parse_time("10:30", utc(), NOON).unwrap();
        assert_eq!(ts, NOON - 90 * 60);
    }

    #[test]
    fn test_parse_time_future_clock_means_yesterday() {
        let ts = parse_time("23:00", utc(), NOON).unwrap();
        assert_eq!(ts, NOON - 13 * 3_600);
    }

    #[test]
    fn test_parse_time_uses_offset() {
        let plus_two = FixedOffset::east_opt(2 * 3_600).unwrap();
        // 12:00Z is 14:00 local, so 13:00 local is 11:00Z.
        let ts = parse_time("13:00", plus_two, NOON).unwrap();
        assert_eq!(ts, NOON - 3_600);
    }

    #[test]
    fn test_parse_time_invalid() {
        let err = parse_time("yesterday-ish", utc(), NOON).unwrap_err();
        assert!(err.to_string().contains("Invalid time"));
    }

    #[test]
    fn test_parse_at_defaults_to_now() {
        assert_eq!(parse_at(None, utc(), NOON).unwrap(), NOON);
    }

    #[test]
    fn test_parse_date() {
        assert_eq!(
            parse_date("2026-01-15").unwrap(),
            NaiveDate::from_ymd_opt(2026, 1, 15).unwrap()
        );
        assert!(parse_date("15/01/2026").is_err());
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(0), "0m");
        assert_eq!(format_duration(59), "0m");
        assert_eq!(format_duration(12 * 60), "12m");
        assert_eq!(format_duration(3_600 + 5 * 60), "1h 05m");
        assert_eq!(format_duration(-30), "0m");
    }

    #[test]
    fn test_format_clock() {
        assert_eq!(format_clock(NOON, utc()), "12:00");
        let minus_five = FixedOffset::west_opt(5 * 3_600).unwrap();
        assert_eq!(format_clock(NOON, minus_five), "07:00");
    }
}
