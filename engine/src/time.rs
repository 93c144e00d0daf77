//! Timestamp conversions.
//!
//! Metadata timestamps are `filetime::FileTime`, the platform's native
//! precision. Callers that want a plain number get seconds relative to the
//! reference date 2001-01-01T00:00:00Z as an `f64`, which round-trips with
//! sub-microsecond precision for dates near the present.

use chrono::{DateTime, TimeZone, Utc};
use filetime::FileTime;

/// Unix time of the reference date, 2001-01-01T00:00:00Z.
pub const REFERENCE_DATE_UNIX_SECONDS: i64 = 978_307_200;

/// The reference date as a `DateTime`.
pub fn reference_date() -> DateTime<Utc> {
    Utc.timestamp_opt(REFERENCE_DATE_UNIX_SECONDS, 0)
        .single()
        .unwrap_or_default()
}

/// Seconds between the reference date and `timestamp` (negative before it).
pub fn interval_from_file_time(timestamp: FileTime) -> f64 {
    let seconds = timestamp.unix_seconds() - REFERENCE_DATE_UNIX_SECONDS;
    seconds as f64 + f64::from(timestamp.nanoseconds()) / 1e9
}

/// Inverse of `interval_from_file_time`.
///
/// NaN maps to the reference date; infinities saturate to the extreme
/// representable second.
pub fn file_time_from_interval(interval: f64) -> FileTime {
    if interval.is_nan() {
        return FileTime::from_unix_time(REFERENCE_DATE_UNIX_SECONDS, 0);
    }
    let whole = interval.floor();
    let mut seconds = whole as i64;
    let mut nanos = ((interval - whole) * 1e9).round() as u32;
    if nanos >= 1_000_000_000 {
        seconds = seconds.saturating_add(1);
        nanos = 0;
    }
    FileTime::from_unix_time(seconds.saturating_add(REFERENCE_DATE_UNIX_SECONDS), nanos)
}

/// `timestamp` as a UTC `DateTime`, or `None` if chrono cannot represent it.
pub fn datetime_from_file_time(timestamp: FileTime) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp(timestamp.unix_seconds(), timestamp.nanoseconds())
}
