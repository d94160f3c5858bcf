//! Compact duration strings for config files, CLI flags, and messages.
//!
//! Durations are written as one or more `<integer><unit>` components, e.g.
//! `5s`, `250ms`, `1h30m`. Supported units are `ns`, `us` (or `µs`), `ms`,
//! `s`, `m` and `h`. A bare `0` is accepted as zero.
//!
//! ```
//! use std::time::Duration;
//! use revstore_core::{HumanDuration, parse_duration};
//!
//! assert_eq!(parse_duration("1h30m").unwrap(), Duration::from_secs(5400));
//! assert_eq!(HumanDuration(Duration::from_secs(86_400)).to_string(), "24h");
//! ```

use std::fmt;
use std::time::Duration;

use crate::error::{Error, Result};

const UNITS: &[(&str, u64)] = &[
    ("ns", 1),
    ("us", 1_000),
    ("µs", 1_000),
    ("ms", 1_000_000),
    ("s", 1_000_000_000),
    ("m", 60 * 1_000_000_000),
    ("h", 3_600 * 1_000_000_000),
];

/// Parses a duration string such as `5s` or `1h30m`.
///
/// # Errors
///
/// Returns [`Error::InvalidDuration`] for empty input, a missing or unknown
/// unit, or a value that overflows a `u64` nanosecond count.
pub fn parse_duration(input: &str) -> Result<Duration> {
    let invalid = || Error::InvalidDuration(input.to_string());
    let trimmed = input.trim();
    if trimmed == "0" {
        return Ok(Duration::ZERO);
    }
    if trimmed.is_empty() {
        return Err(invalid());
    }

    let mut rest = trimmed;
    let mut total_nanos: u64 = 0;
    while !rest.is_empty() {
        let digits = rest.bytes().take_while(u8::is_ascii_digit).count();
        if digits == 0 {
            return Err(invalid());
        }
        let value: u64 = rest[..digits].parse().map_err(|_| invalid())?;
        rest = &rest[digits..];

        let unit_len = rest
            .char_indices()
            .find(|(_, c)| c.is_ascii_digit())
            .map_or(rest.len(), |(idx, _)| idx);
        let unit = &rest[..unit_len];
        let scale = UNITS
            .iter()
            .find(|(name, _)| *name == unit)
            .map(|(_, scale)| *scale)
            .ok_or_else(invalid)?;
        rest = &rest[unit_len..];

        let component = value.checked_mul(scale).ok_or_else(invalid)?;
        total_nanos = total_nanos.checked_add(component).ok_or_else(invalid)?;
    }

    Ok(Duration::from_nanos(total_nanos))
}

/// Display wrapper rendering a [`Duration`] in the format [`parse_duration`] accepts.
///
/// Zero components are omitted, so `Duration::from_millis(1500)` renders as
/// `1s500ms` and a zero duration as `0s`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HumanDuration(pub Duration);

impl From<&Duration> for HumanDuration {
    fn from(duration: &Duration) -> Self {
        Self(*duration)
    }
}

impl fmt::Display for HumanDuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_zero() {
            return f.write_str("0s");
        }

        let secs = self.0.as_secs();
        let nanos = u64::from(self.0.subsec_nanos());
        let parts = [
            (secs / 3_600, "h"),
            ((secs % 3_600) / 60, "m"),
            (secs % 60, "s"),
            (nanos / 1_000_000, "ms"),
            ((nanos / 1_000) % 1_000, "us"),
            (nanos % 1_000, "ns"),
        ];
        for (value, unit) in parts {
            if value > 0 {
                write!(f, "{value}{unit}")?;
            }
        }
        Ok(())
    }
}

/// Serde adapter for `Option<Duration>` fields written as duration strings.
pub(crate) mod serde_opt {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    use super::{HumanDuration, parse_duration};

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw: Option<String> = Option::deserialize(deserializer)?;
        raw.map(|s| parse_duration(&s).map_err(serde::de::Error::custom))
            .transpose()
    }

    pub fn serialize<S>(value: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match value {
            Some(d) => serializer.collect_str(&HumanDuration(*d)),
            None => serializer.serialize_none(),
        }
    }
}
