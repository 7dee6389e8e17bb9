//! Field-level parsing for raw readings: timestamps, power values and the
//! calendar helpers derived from them.

use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, Timelike};

/// Parses a timestamp, trying RFC 3339 first and then each of `formats`.
///
/// Offsets in RFC 3339 input are dropped: the wall-clock time as written is
/// kept, which is how the source files record meter end times.
pub fn parse_timestamp<S: AsRef<str>>(raw: &str, formats: &[S]) -> Option<NaiveDateTime> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.naive_local());
    }
    formats
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt.as_ref()).ok())
}

/// Parses a power value. Returns `None` for blank, non-numeric and
/// non-finite input.
pub fn parse_power(raw: &str) -> Option<f64> {
    raw.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Labels the time-of-day bucket containing `ts` as zero-padded `"HH:MM"`.
///
/// Zero padding keeps lexicographic order equal to chronological order.
pub fn time_slot_label(ts: &NaiveDateTime, slot_minutes: u32) -> String {
    let minute_of_day = ts.hour() * 60 + ts.minute();
    let start = minute_of_day - minute_of_day % slot_minutes;
    format!("{:02}:{:02}", start / 60, start % 60)
}

/// Number of days in `month` of `year`, or `None` for an invalid month.
pub fn days_in_month(year: i32, month: u32) -> Option<u32> {
    let first = NaiveDate::from_ymd_opt(year, month, 1)?;
    let next = if month == 12 {
        NaiveDate::from_ymd_opt(year + 1, 1, 1)?
    } else {
        NaiveDate::from_ymd_opt(year, month + 1, 1)?
    };
    Some(next.signed_duration_since(first).num_days() as u32)
}

/// Calendar fields of a timestamp, with the year narrowed to `u16`.
pub fn calendar_fields(ts: &NaiveDateTime) -> Option<(u16, u8, u8)> {
    let year = u16::try_from(ts.year()).ok()?;
    Some((year, ts.month() as u8, ts.day() as u8))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DEFAULT_TIMESTAMP_FORMATS;

    fn ts(raw: &str) -> NaiveDateTime {
        parse_timestamp(raw, DEFAULT_TIMESTAMP_FORMATS).unwrap()
    }

    #[test]
    fn test_parse_timestamp_formats() {
        let expected = NaiveDate::from_ymd_opt(2024, 1, 5)
            .unwrap()
            .and_hms_opt(8, 0, 0)
            .unwrap();
        assert_eq!(ts("2024-01-05 08:00:00"), expected);
        assert_eq!(ts("2024-01-05T08:00:00"), expected);
        assert_eq!(ts("2024-01-05 08:00"), expected);
        assert_eq!(ts("05/01/2024 08:00"), expected);
        assert_eq!(ts("2024-01-05T08:00:00+07:00"), expected);
        assert_eq!(ts("  2024-01-05 08:00:00.000 "), expected);
    }

    #[test]
    fn test_parse_timestamp_rejects_garbage() {
        assert!(parse_timestamp("", DEFAULT_TIMESTAMP_FORMATS).is_none());
        assert!(parse_timestamp("not a date", DEFAULT_TIMESTAMP_FORMATS).is_none());
        assert!(parse_timestamp("2024-02-30 10:00:00", DEFAULT_TIMESTAMP_FORMATS).is_none());
        assert!(parse_timestamp("2024-01-05", DEFAULT_TIMESTAMP_FORMATS).is_none());
    }

    #[test]
    fn test_parse_power() {
        assert_eq!(parse_power("12.5"), Some(12.5));
        assert_eq!(parse_power(" -3 "), Some(-3.0));
        assert_eq!(parse_power(""), None);
        assert_eq!(parse_power("abc"), None);
        assert_eq!(parse_power("NaN"), None);
        assert_eq!(parse_power("inf"), None);
    }

    #[test]
    fn test_time_slot_label() {
        assert_eq!(time_slot_label(&ts("2024-01-05 00:00:00"), 30), "00:00");
        assert_eq!(time_slot_label(&ts("2024-01-05 08:29:59"), 30), "08:00");
        assert_eq!(time_slot_label(&ts("2024-01-05 23:30:00"), 30), "23:30");
        assert_eq!(time_slot_label(&ts("2024-01-05 23:59:00"), 60), "23:00");
        assert_eq!(time_slot_label(&ts("2024-01-05 13:45:00"), 15), "13:45");
    }

    #[test]
    fn test_days_in_month() {
        assert_eq!(days_in_month(2024, 2), Some(29));
        assert_eq!(days_in_month(2023, 2), Some(28));
        assert_eq!(days_in_month(2024, 4), Some(30));
        assert_eq!(days_in_month(2024, 12), Some(31));
        assert_eq!(days_in_month(2024, 13), None);
        assert_eq!(days_in_month(2024, 0), None);
    }
}
