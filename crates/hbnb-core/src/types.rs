//! Core types for HBNB storage
//!
//! Timestamps and their text form. Both engines store timestamps as naive
//! UTC ISO-8601 strings with microsecond precision, so a value written by one
//! engine reads back identically in the other.

use chrono::{DateTime, NaiveDateTime, Utc};

/// Timestamp type alias
pub type Timestamp = DateTime<Utc>;

/// Text format used for persisted timestamps
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.6f";

/// Create a timestamp for the current moment, truncated to microseconds
/// so it survives a round-trip through [`TIMESTAMP_FORMAT`].
pub fn now() -> Timestamp {
    let now = Utc::now();
    let micros = now.timestamp_micros();
    DateTime::from_timestamp_micros(micros).unwrap_or(now)
}

/// Render a timestamp in the persisted format.
pub fn format_timestamp(ts: &Timestamp) -> String {
    ts.format(TIMESTAMP_FORMAT).to_string()
}

/// Parse a timestamp written by [`format_timestamp`].
pub fn parse_timestamp(s: &str) -> Result<Timestamp, chrono::ParseError> {
    NaiveDateTime::parse_from_str(s, TIMESTAMP_FORMAT).map(|naive| naive.and_utc())
}

/// Serde adapter for timestamps in the persisted format
pub mod timestamp_format {
    use super::{format_timestamp, parse_timestamp, Timestamp};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(ts: &Timestamp, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&format_timestamp(ts))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Timestamp, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        parse_timestamp(&s).map_err(serde::de::Error::custom)
    }
}
