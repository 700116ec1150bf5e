//! Timestamp parsing and the legacy "minimum date" sentinel.
//!
//! The server encodes an absent end timestamp as `0001-01-01T00:00:00`.
//! Records carry `Option<NaiveDateTime>` instead; [`sentinel_datetime`]
//! converts at the serde boundary so nothing past it sees the sentinel.

use chrono::{DateTime, NaiveDate, NaiveDateTime};

pub const SENTINEL: &str = "0001-01-01T00:00:00";

/// `true` for the sentinel and for any timestamp in year 1 or earlier.
pub fn is_sentinel(value: &NaiveDateTime) -> bool {
    value.date() <= NaiveDate::from_ymd_opt(1, 1, 1).unwrap_or(NaiveDate::MIN)
}

/// Parse the timestamp shapes the API produces: naive ISO-8601 with or
/// without fractional seconds, a bare date, or RFC 3339 with an offset
/// (the wall-clock part is kept).
pub fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.naive_local());
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(raw, fmt) {
            return Some(dt);
        }
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
}

/// Parse a timestamp, treating the sentinel as absent.
pub fn parse_optional(raw: &str) -> Option<NaiveDateTime> {
    parse_timestamp(raw).filter(|dt| !is_sentinel(dt))
}

/// Serde adapter for required timestamps in any of the accepted shapes.
pub mod lenient_datetime {
    use chrono::NaiveDateTime;
    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &NaiveDateTime, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&value.format("%Y-%m-%dT%H:%M:%S%.f").to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<NaiveDateTime, D::Error> {
        let raw = String::deserialize(d)?;
        super::parse_timestamp(&raw)
            .ok_or_else(|| D::Error::custom(format!("invalid timestamp: {raw}")))
    }
}

/// Serde adapter for optional timestamps that may arrive as the sentinel.
pub mod sentinel_datetime {
    use chrono::NaiveDateTime;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Option<NaiveDateTime>, s: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(dt) => s.serialize_str(&dt.format("%Y-%m-%dT%H:%M:%S%.f").to_string()),
            None => s.serialize_str(super::SENTINEL),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<NaiveDateTime>, D::Error> {
        let raw = Option::<String>::deserialize(d)?;
        Ok(raw.as_deref().and_then(super::parse_optional))
    }
}
