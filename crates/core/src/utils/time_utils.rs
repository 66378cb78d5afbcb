//! Timestamp encoding and period arithmetic.

use chrono::{DateTime, Datelike, Duration, NaiveDateTime, NaiveTime, TimeZone, Timelike, Utc};
use chrono_tz::Tz;

use crate::constants::TIMESTAMP_FORMAT;
use crate::errors::Result;

/// Encodes a timestamp in the fixed-width storage format.
pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.format(TIMESTAMP_FORMAT).to_string()
}

/// Parses a stored timestamp. Accepts the storage format and RFC 3339.
pub fn parse_timestamp(value: &str) -> Result<DateTime<Utc>> {
    match NaiveDateTime::parse_from_str(value, TIMESTAMP_FORMAT) {
        Ok(naive) => Ok(Utc.from_utc_datetime(&naive)),
        Err(_) => Ok(DateTime::parse_from_rfc3339(value)?.with_timezone(&Utc)),
    }
}

/// Maps a local wall-clock time back to UTC, resolving DST gaps and folds
/// to the earliest valid instant.
fn local_to_utc(tz: &Tz, local: NaiveDateTime, fallback: DateTime<Utc>) -> DateTime<Utc> {
    tz.from_local_datetime(&local)
        .earliest()
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or(fallback)
}

/// Start of the hour containing `at`, in `tz`.
pub fn start_of_hour(at: DateTime<Utc>, tz: &Tz) -> DateTime<Utc> {
    let local = at.with_timezone(tz).naive_local();
    let truncated = local
        .date()
        .and_time(NaiveTime::from_hms_opt(local.hour(), 0, 0).unwrap_or(NaiveTime::MIN));
    local_to_utc(tz, truncated, at)
}

/// Local midnight of the day containing `at`, in `tz`.
pub fn start_of_day(at: DateTime<Utc>, tz: &Tz) -> DateTime<Utc> {
    let local = at.with_timezone(tz).naive_local();
    local_to_utc(tz, local.date().and_time(NaiveTime::MIN), at)
}

/// Local midnight of the Monday starting the week containing `at`.
pub fn start_of_week(at: DateTime<Utc>, tz: &Tz) -> DateTime<Utc> {
    let local = at.with_timezone(tz).naive_local().date();
    let monday = local - Duration::days(i64::from(local.weekday().num_days_from_monday()));
    local_to_utc(tz, monday.and_time(NaiveTime::MIN), at)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_roundtrip_keeps_microseconds() {
        let ts = Utc.with_ymd_and_hms(2024, 3, 5, 7, 8, 9).unwrap() + Duration::microseconds(42);
        let encoded = format_timestamp(&ts);
        assert_eq!(encoded, "2024-03-05T07:08:09.000042Z");
        assert_eq!(parse_timestamp(&encoded).unwrap(), ts);
    }

    #[test]
    fn test_parse_accepts_rfc3339() {
        let ts = parse_timestamp("2024-03-05T08:00:00+01:00").unwrap();
        assert_eq!(ts, Utc.with_ymd_and_hms(2024, 3, 5, 7, 0, 0).unwrap());
    }

    #[test]
    fn test_encoded_order_is_chronological() {
        let early = Utc.with_ymd_and_hms(2024, 1, 9, 23, 0, 0).unwrap();
        let late = Utc.with_ymd_and_hms(2024, 1, 10, 1, 0, 0).unwrap();
        assert!(format_timestamp(&early) < format_timestamp(&late));
    }

    #[test]
    fn test_start_of_day_in_zurich() {
        let tz: Tz = "Europe/Zurich".parse().unwrap();
        // 23:30 UTC on Jan 9 is already Jan 10 in Zurich.
        let at = Utc.with_ymd_and_hms(2024, 1, 9, 23, 30, 0).unwrap();
        assert_eq!(
            start_of_day(at, &tz),
            Utc.with_ymd_and_hms(2024, 1, 9, 23, 0, 0).unwrap()
        );
    }

    #[test]
    fn test_start_of_hour_and_week_utc() {
        let tz = Tz::UTC;
        let at = Utc.with_ymd_and_hms(2024, 5, 16, 13, 47, 12).unwrap(); // Thursday
        assert_eq!(
            start_of_hour(at, &tz),
            Utc.with_ymd_and_hms(2024, 5, 16, 13, 0, 0).unwrap()
        );
        assert_eq!(
            start_of_week(at, &tz),
            Utc.with_ymd_and_hms(2024, 5, 13, 0, 0, 0).unwrap()
        );
    }
}
