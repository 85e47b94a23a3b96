//! Time utilities.
//!
//! Timestamps on the wire and in the store are Unix milliseconds. Display
//! formatting and calendar-day comparison use a fixed UTC offset taken from
//! [`CoreConfig`](crate::CoreConfig).

use chrono::{DateTime, FixedOffset, NaiveDate, Offset, Utc};

/// Returns the current Unix timestamp in milliseconds.
pub fn now_timestamp_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Build the display offset, falling back to UTC for out-of-range values.
pub fn offset_from_secs(utc_offset_secs: i32) -> FixedOffset {
    FixedOffset::east_opt(utc_offset_secs).unwrap_or_else(|| {
        tracing::warn!("UTC offset {}s out of range, using UTC", utc_offset_secs);
        Utc.fix()
    })
}

fn localize(timestamp_millis: i64, offset: FixedOffset) -> Option<DateTime<FixedOffset>> {
    DateTime::<Utc>::from_timestamp_millis(timestamp_millis).map(|dt| dt.with_timezone(&offset))
}

/// Calendar day of a timestamp in the given offset.
pub fn calendar_day(timestamp_millis: i64, offset: FixedOffset) -> Option<NaiveDate> {
    localize(timestamp_millis, offset).map(|dt| dt.date_naive())
}

/// Wall-clock time (`HH:MM:SS`) of a timestamp in the given offset.
pub fn format_clock(timestamp_millis: i64, offset: FixedOffset) -> String {
    localize(timestamp_millis, offset)
        .map(|dt| dt.format("%H:%M:%S").to_string())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    const DAY_MS: i64 = 24 * 60 * 60 * 1000;

    #[test]
    fn test_now_timestamp_millis_is_reasonable() {
        let ts = now_timestamp_millis();
        // Should be after 2024-01-01 and before 2100-01-01
        assert!(ts > 1704067200_000, "Timestamp {} is too old", ts);
        assert!(ts < 4102444800_000, "Timestamp {} is too far in future", ts);
    }

    #[test]
    fn test_format_clock() {
        let utc = offset_from_secs(0);
        assert_eq!(format_clock(0, utc), "00:00:00");
        assert_eq!(format_clock(3_723_000, utc), "01:02:03");

        let plus_three = offset_from_secs(3 * 3600);
        assert_eq!(format_clock(3_723_000, plus_three), "04:02:03");
    }

    #[test]
    fn test_calendar_day_respects_offset() {
        let utc = offset_from_secs(0);
        let late = DAY_MS - 60 * 60 * 1000; // 23:00 UTC on day 0
        assert_eq!(calendar_day(late, utc), calendar_day(0, utc));

        // Two hours ahead, 23:00 UTC is already 01:00 the next day.
        let plus_two = offset_from_secs(2 * 3600);
        assert_ne!(calendar_day(late, plus_two), calendar_day(0, plus_two));
    }

    #[test]
    fn test_out_of_range_offset_falls_back_to_utc() {
        assert_eq!(offset_from_secs(i32::MAX), offset_from_secs(0));
    }
}
