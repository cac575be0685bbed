//! Public identifiers and timestamp helpers shared by every crate.
//!
//! Timestamps are stored as RFC 3339 UTC strings with millisecond precision so
//! that lexical ordering in SQL matches chronological ordering.

use chrono::{DateTime, Datelike, Duration, SecondsFormat, Utc};
use cuid2::CuidConstructor;
use once_cell::sync::Lazy;

const MAX_TIMESTAMP: &str = "9999-12-31T23:59:59.999Z";
const MIN_TIMESTAMP: &str = "0001-01-01T00:00:00.000Z";

static CUID: Lazy<CuidConstructor> = Lazy::new(|| CuidConstructor::new().with_length(24));

pub fn new_public_id() -> String {
    CUID.create_id()
}

pub fn format_timestamp(value: DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub fn now_timestamp() -> String {
    format_timestamp(Utc::now())
}

/// Timestamp `duration` from now, saturating at the last four-digit year.
pub fn timestamp_after(duration: Duration) -> String {
    Utc::now()
        .checked_add_signed(duration)
        .filter(|value| value.year() <= 9999)
        .map(format_timestamp)
        .unwrap_or_else(|| MAX_TIMESTAMP.to_string())
}

pub fn timestamp_before(duration: Duration) -> String {
    Utc::now()
        .checked_sub_signed(duration)
        .filter(|value| value.year() >= 1)
        .map(format_timestamp)
        .unwrap_or_else(|| MIN_TIMESTAMP.to_string())
}

/// Whole milliseconds of an elapsed wall-clock span, saturating at `u64::MAX`.
pub fn elapsed_millis(elapsed: std::time::Duration) -> u64 {
    u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX)
}
