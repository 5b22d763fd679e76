//! Timestamp representation shared by every event.
//!
//! Timestamps are UTC instants truncated to microseconds. They serialize as
//! RFC 3339 with exactly six fractional digits and a `Z` suffix, which keeps
//! them lexically sortable and makes encode/decode lossless.
//!
//! Decoding also accepts any RFC 3339 offset and naive ISO-8601 timestamps
//! (interpreted as UTC), the form emitted by producers that serialize
//! `datetime.utcnow()` without an offset.

use chrono::{DateTime, NaiveDateTime, SecondsFormat, SubsecRound, Utc};
use serde::{Deserialize, Deserializer, Serializer};

/// UTC timestamp carried by events.
pub type Timestamp = DateTime<Utc>;

/// Current time truncated to the wire precision.
pub fn now() -> Timestamp {
    truncate(Utc::now())
}

/// Truncates a timestamp to microsecond precision.
pub fn truncate(ts: Timestamp) -> Timestamp {
    ts.trunc_subsecs(6)
}

/// Formats a timestamp in its canonical wire form.
pub fn format(ts: &Timestamp) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Parses a wire timestamp.
pub fn parse(value: &str) -> Result<Timestamp, String> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(value) {
        return Ok(ts.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f")
        .map(|naive| naive.and_utc())
        .map_err(|e| format!("invalid timestamp {value:?}: {e}"))
}

pub fn serialize<S>(ts: &Timestamp, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_str(&format(ts))
}

pub fn deserialize<'de, D>(deserializer: D) -> Result<Timestamp, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    parse(&raw).map_err(serde::de::Error::custom)
}
