//! # Temporal Types — UTC-Only Timestamps
//!
//! Defines `Timestamp`, a UTC timestamp truncated to seconds precision.
//! Every date in the custody domain (creation, dispatch, expected and
//! actual return, scans) is a `Timestamp`, so "is this overdue" is a plain
//! comparison with no timezone ambiguity.
//!
//! Serialized form: `YYYY-MM-DDTHH:MM:SSZ`. Deserialization accepts any RFC
//! 3339 offset and normalizes to UTC.

use chrono::{DateTime, Duration, NaiveDate, Timelike, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use utoipa::ToSchema;

use crate::error::ValidationError;

const SECONDS_PER_DAY: i64 = 86_400;

/// A UTC-only timestamp, truncated to seconds precision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, ToSchema)]
#[schema(value_type = String, format = DateTime)]
pub struct Timestamp(DateTime<Utc>);

impl Timestamp {
    /// Create a timestamp from the current UTC time, truncated to seconds.
    pub fn now() -> Self {
        Self(truncate_to_seconds(Utc::now()))
    }

    /// Create a timestamp from a `chrono::DateTime<Utc>`, truncating sub-seconds.
    pub fn from_utc(dt: DateTime<Utc>) -> Self {
        Self(truncate_to_seconds(dt))
    }

    /// Parse an RFC 3339 timestamp with any offset, converting to UTC.
    pub fn parse(s: &str) -> Result<Self, ValidationError> {
        DateTime::parse_from_rfc3339(s.trim())
            .map(|dt| Self(truncate_to_seconds(dt.with_timezone(&Utc))))
            .map_err(|_| ValidationError::InvalidTimestamp(s.to_string()))
    }

    /// Parse either a full RFC 3339 timestamp or a bare `YYYY-MM-DD` date.
    ///
    /// Bare dates resolve to midnight UTC at the start of that day; with
    /// `end_of_day` they resolve to `23:59:59` instead, which makes an
    /// inclusive `dateTo` filter behave the way operators expect.
    pub fn parse_date_or_datetime(s: &str, end_of_day: bool) -> Result<Self, ValidationError> {
        let trimmed = s.trim();
        if let Ok(date) = NaiveDate::parse_from_str(trimmed, "%Y-%m-%d") {
            let time = if end_of_day {
                date.and_hms_opt(23, 59, 59)
            } else {
                date.and_hms_opt(0, 0, 0)
            };
            return time
                .map(|naive| Self(naive.and_utc()))
                .ok_or_else(|| ValidationError::InvalidTimestamp(s.to_string()));
        }
        Self::parse(trimmed)
    }

    /// Access the inner `DateTime<Utc>`.
    pub fn as_datetime(&self) -> &DateTime<Utc> {
        &self.0
    }

    /// Returns the Unix epoch timestamp in seconds.
    pub fn epoch_secs(&self) -> i64 {
        self.0.timestamp()
    }

    /// This timestamp shifted by a whole number of days (negative for the past).
    pub fn plus_days(&self, days: i64) -> Self {
        Self(self.0 + Duration::days(days))
    }

    /// Whole days elapsed from `earlier` to `self`, rounded down (a partial
    /// day in the past counts as -1).
    pub fn whole_days_since(&self, earlier: &Timestamp) -> i64 {
        (self.epoch_secs() - earlier.epoch_secs()).div_euclid(SECONDS_PER_DAY)
    }

    /// Render as ISO 8601 with Z suffix (e.g., `2026-01-15T12:00:00Z`).
    pub fn to_iso8601(&self) -> String {
        self.0.format("%Y-%m-%dT%H:%M:%SZ").to_string()
    }

    /// Render only the calendar date (e.g., `2026-01-15`).
    pub fn to_date_string(&self) -> String {
        self.0.format("%Y-%m-%d").to_string()
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_iso8601())
    }
}

impl Serialize for Timestamp {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_iso8601())
    }
}

impl<'de> Deserialize<'de> for Timestamp {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Timestamp::parse(&raw).map_err(serde::de::Error::custom)
    }
}

/// Truncate a `DateTime<Utc>` to seconds precision (discard nanoseconds).
fn truncate_to_seconds(dt: DateTime<Utc>) -> DateTime<Utc> {
    dt.with_nanosecond(0).unwrap_or(dt)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn now_has_no_subseconds() {
        let ts = Timestamp::now();
        assert_eq!(ts.as_datetime().nanosecond(), 0);
    }

    #[test]
    fn parse_converts_offsets_to_utc() {
        let ts = Timestamp::parse("2026-01-15T17:00:00+05:00").unwrap();
        assert_eq!(ts.to_iso8601(), "2026-01-15T12:00:00Z");
    }

    #[test]
    fn parse_truncates_subseconds() {
        let ts = Timestamp::parse("2026-01-15T12:00:00.987Z").unwrap();
        assert_eq!(ts.to_iso8601(), "2026-01-15T12:00:00Z");
    }

    #[test]
    fn parse_rejects_garbage() {
        assert!(Timestamp::parse("tomorrow").is_err());
        assert!(Timestamp::parse("").is_err());
    }

    #[test]
    fn bare_dates_resolve_to_day_bounds() {
        let start = Timestamp::parse_date_or_datetime("2026-03-01", false).unwrap();
        let end = Timestamp::parse_date_or_datetime("2026-03-01", true).unwrap();
        assert_eq!(start.to_iso8601(), "2026-03-01T00:00:00Z");
        assert_eq!(end.to_iso8601(), "2026-03-01T23:59:59Z");
    }

    #[test]
    fn whole_days_round_down() {
        let base = Timestamp::from_utc(Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap());
        let later = Timestamp::from_utc(Utc.with_ymd_and_hms(2026, 1, 3, 23, 0, 0).unwrap());
        assert_eq!(later.whole_days_since(&base), 2);
        assert_eq!(base.whole_days_since(&later), -3);
        let half_day = Timestamp::from_utc(Utc.with_ymd_and_hms(2026, 1, 1, 12, 0, 0).unwrap());
        assert_eq!(base.whole_days_since(&half_day), -1);
        assert_eq!(half_day.whole_days_since(&base), 0);
    }

    #[test]
    fn plus_days_moves_both_directions() {
        let base = Timestamp::parse("2026-01-10T08:00:00Z").unwrap();
        assert_eq!(base.plus_days(1).to_date_string(), "2026-01-11");
        assert_eq!(base.plus_days(-10).to_date_string(), "2025-12-31");
    }

    #[test]
    fn serde_uses_z_suffix() {
        let ts = Timestamp::parse("2026-01-15T12:00:00Z").unwrap();
        let json = serde_json::to_string(&ts).unwrap();
        assert_eq!(json, "\"2026-01-15T12:00:00Z\"");
        let parsed: Timestamp = serde_json::from_str(&json).unwrap();
        assert_eq!(ts, parsed);
    }
}
