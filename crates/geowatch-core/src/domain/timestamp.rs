use std::fmt::{Display, Formatter};

use serde::de::Error as DeError;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use time::format_description::well_known::{Rfc2822, Rfc3339};
use time::{Duration, OffsetDateTime};

/// RFC3339 UTC instant used for event times and cache bookkeeping on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct UtcDateTime(OffsetDateTime);

impl UtcDateTime {
    pub fn now() -> Self {
        Self(OffsetDateTime::now_utc())
    }

    pub fn from_unix_millis(millis: i64) -> Option<Self> {
        OffsetDateTime::from_unix_timestamp_nanos(i128::from(millis) * 1_000_000)
            .ok()
            .map(|dt| Self(dt.to_offset(time::UtcOffset::UTC)))
    }

    /// Parse an RFC3339 timestamp, tolerating the minute-precision form
    /// some feeds emit (`2025-01-02T00:00Z`).
    pub fn parse_rfc3339(input: &str) -> Option<Self> {
        if let Ok(parsed) = OffsetDateTime::parse(input, &Rfc3339) {
            return Some(Self(parsed.to_offset(time::UtcOffset::UTC)));
        }
        if input.len() == 17 && input.ends_with('Z') {
            let padded = format!("{}:00Z", &input[..16]);
            if let Ok(parsed) = OffsetDateTime::parse(&padded, &Rfc3339) {
                return Some(Self(parsed.to_offset(time::UtcOffset::UTC)));
            }
        }
        None
    }

    /// Parse an RSS `pubDate` (`Mon, 01 Sep 2025 12:34:56 GMT`).
    pub fn parse_rfc2822(input: &str) -> Option<Self> {
        OffsetDateTime::parse(input, &Rfc2822)
            .ok()
            .map(|dt| Self(dt.to_offset(time::UtcOffset::UTC)))
    }

    pub fn unix_timestamp(self) -> i64 {
        self.0.unix_timestamp()
    }

    pub fn unix_millis(self) -> i64 {
        (self.0.unix_timestamp_nanos() / 1_000_000) as i64
    }

    pub fn age_from(self, now: Self) -> Duration {
        now.0 - self.0
    }

    pub fn format_rfc3339(self) -> String {
        self.0
            .format(&Rfc3339)
            .expect("UTC instant must be RFC3339 formattable")
    }
}

impl Display for UtcDateTime {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.format_rfc3339())
    }
}

impl Serialize for UtcDateTime {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.format_rfc3339())
    }
}

impl<'de> Deserialize<'de> for UtcDateTime {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = String::deserialize(deserializer)?;
        Self::parse_rfc3339(&value)
            .ok_or_else(|| D::Error::custom(format!("invalid RFC3339 timestamp: {value}")))
    }
}
