//! Timestamp conventions shared by the store, the windows and ingestion.
//!
//! Sample sort keys are fixed-width strings (`YYYY-MM-DDTHH:MM:SS.ffffff`) so
//! that lexicographic order is chronological order. Range queries compare the
//! strings directly; only local-time-of-day bucketing parses them.

use chrono::{
    DateTime, Duration, FixedOffset, NaiveDate, NaiveDateTime, Offset, Timelike, Utc,
};

/// Canonical sample timestamp format (microsecond precision).
pub const SAMPLE_TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.6f";

/// Window bound format (second precision).
pub const BOUND_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// Length of a canonical sample timestamp.
pub const SAMPLE_TIMESTAMP_LEN: usize = 26;

/// True when `ts` carries the canonical microsecond suffix.
///
/// Anything else is a legacy row and a candidate for the cleanup pass.
pub fn is_canonical(ts: &str) -> bool {
    ts.len() == SAMPLE_TIMESTAMP_LEN
        && ts.as_bytes().get(19) == Some(&b'.')
        && NaiveDateTime::parse_from_str(ts, SAMPLE_TIMESTAMP_FORMAT).is_ok()
}

/// Format a UTC instant as a canonical sample timestamp.
pub fn format_sample(dt: &NaiveDateTime) -> String {
    dt.format(SAMPLE_TIMESTAMP_FORMAT).to_string()
}

/// Parse a window bound or a sample timestamp.
pub fn parse_bound(s: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(s, SAMPLE_TIMESTAMP_FORMAT)
        .or_else(|_| NaiveDateTime::parse_from_str(s, BOUND_FORMAT))
        .ok()
}

/// Minutes between two window bounds, `None` if either fails to parse.
pub fn minutes_between(start: &str, end: &str) -> Option<i64> {
    let start = parse_bound(start)?;
    let end = parse_bound(end)?;
    Some((end - start).num_minutes())
}

/// Drop seconds and sub-second digits.
pub fn truncate_to_minute(dt: NaiveDateTime) -> Option<NaiveDateTime> {
    dt.with_second(0)?.with_nanosecond(0)
}

/// Fixed-offset local clock used to present UTC data in local time.
///
/// Price windows are defined on the local wall clock, so every quote is
/// mapped through this before bucketing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocalClock {
    offset: FixedOffset,
}

impl LocalClock {
    /// Clock `hours` east of UTC, `None` unless the offset is under a day.
    pub fn try_from_hours(hours: i32) -> Option<Self> {
        let offset = FixedOffset::east_opt(hours.checked_mul(3600)?)?;
        Some(Self { offset })
    }

    /// Build a clock `hours` east of UTC. Out-of-range offsets fall back to UTC;
    /// configuration rejects them before a clock is built.
    pub fn from_hours(hours: i32) -> Self {
        Self::try_from_hours(hours).unwrap_or(Self { offset: Utc.fix() })
    }

    pub fn offset_seconds(&self) -> i32 {
        self.offset.local_minus_utc()
    }

    /// Local wall-clock time of an epoch-millisecond instant.
    pub fn local_from_millis(&self, timestamp_ms: i64) -> Option<NaiveDateTime> {
        DateTime::<Utc>::from_timestamp_millis(timestamp_ms)
            .map(|dt| dt.with_timezone(&self.offset).naive_local())
    }

    /// Local wall-clock time of a UTC naive instant.
    pub fn local_from_utc(&self, utc: &NaiveDateTime) -> NaiveDateTime {
        *utc + Duration::seconds(self.offset_seconds() as i64)
    }

    /// `YYYY-MM-DD HH:MM:SS` rendering of an epoch-millisecond instant.
    pub fn format_local(&self, timestamp_ms: i64) -> String {
        self.local_from_millis(timestamp_ms)
            .map(|dt| dt.format("%Y-%m-%d %H:%M:%S").to_string())
            .unwrap_or_else(|| "N/A".to_string())
    }

    /// Local date and time truncated to the minute.
    pub fn local_minute(&self, timestamp_ms: i64) -> Option<NaiveDateTime> {
        self.local_from_millis(timestamp_ms).and_then(truncate_to_minute)
    }

    /// Epoch-millisecond bounds of a local calendar day, inclusive:
    /// `[date 00:00:00, date 23:59:59]` on the local clock.
    pub fn day_bounds_millis(&self, date: NaiveDate) -> (i64, i64) {
        let shift = self.offset_seconds() as i64 * 1000;
        let start = date
            .and_hms_opt(0, 0, 0)
            .map(|dt| dt.and_utc().timestamp_millis())
            .unwrap_or_default();
        let end = date
            .and_hms_opt(23, 59, 59)
            .map(|dt| dt.and_utc().timestamp_millis())
            .unwrap_or_default();
        (start - shift, end - shift)
    }
}

impl Default for LocalClock {
    fn default() -> Self {
        Self::from_hours(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canonical_detection() {
        assert!(is_canonical("2025-06-29T14:45:00.123456"));
        assert!(!is_canonical("2025-06-29T14:45:00"));
        assert!(!is_canonical("2025-06-29T14:45:00.123"));
        assert!(!is_canonical("2025-06-29 14:45:00.123456"));
    }

    #[test]
    fn test_lexicographic_order_is_chronological() {
        let a = format_sample(&parse_bound("2025-06-29T09:59:59").unwrap());
        let b = format_sample(&parse_bound("2025-06-29T10:00:00").unwrap());
        assert!(a < b);
        assert_eq!(b, "2025-06-29T10:00:00.000000");
    }

    #[test]
    fn test_minutes_between() {
        assert_eq!(minutes_between("2025-06-29T14:45:00", "2025-06-29T16:45:00"), Some(120));
        assert_eq!(minutes_between("garbage", "2025-06-29T16:45:00"), None);
    }

    #[test]
    fn test_local_clock_shift() {
        let clock = LocalClock::from_hours(2);
        let utc = parse_bound("2025-06-29T14:45:00").unwrap();
        let ms = utc.and_utc().timestamp_millis();
        assert_eq!(clock.format_local(ms), "2025-06-29 16:45:00");
        assert_eq!(
            clock.local_minute(ms + 59_999),
            parse_bound("2025-06-29T16:45:00")
        );
    }

    #[test]
    fn test_offset_range() {
        assert_eq!(LocalClock::try_from_hours(-5).map(|c| c.offset_seconds()), Some(-18_000));
        assert!(LocalClock::try_from_hours(24).is_none());
        assert!(LocalClock::try_from_hours(i32::MAX).is_none());
    }

    #[test]
    fn test_day_bounds_follow_local_clock() {
        let clock = LocalClock::from_hours(2);
        let date = NaiveDate::from_ymd_opt(2025, 6, 29).unwrap();
        let (start, end) = clock.day_bounds_millis(date);
        assert_eq!(clock.format_local(start), "2025-06-29 00:00:00");
        assert_eq!(clock.format_local(end), "2025-06-29 23:59:59");
    }
}
