//! Duration strings as written in scenario files (`"1m"`, `"30s"`, `"1m30s"`).

use crate::error::{LoadTestError, LoadTestResult};
use std::time::Duration;

/// Parse a duration string made of one or more `<integer><unit>` segments.
///
/// Supported units are `h`, `m`, `s` and `ms`. A bare number without a unit
/// is rejected, as is anything negative.
pub fn parse_duration(input: &str) -> LoadTestResult<Duration> {
    let s = input.trim();
    if s.is_empty() {
        return Err(LoadTestError::invalid_duration(input, "empty duration"));
    }
    if s.starts_with('-') {
        return Err(LoadTestError::invalid_duration(
            input,
            "negative durations are not allowed",
        ));
    }

    let bytes = s.as_bytes();
    let mut pos = 0;
    let mut total = Duration::ZERO;

    while pos < bytes.len() {
        let digits_start = pos;
        while pos < bytes.len() && bytes[pos].is_ascii_digit() {
            pos += 1;
        }
        if digits_start == pos {
            return Err(LoadTestError::invalid_duration(
                input,
                format!("expected a number at offset {}", digits_start),
            ));
        }
        let amount: u64 = s[digits_start..pos]
            .parse()
            .map_err(|_| LoadTestError::invalid_duration(input, "number out of range"))?;

        let unit_start = pos;
        while pos < bytes.len() && bytes[pos].is_ascii_alphabetic() {
            pos += 1;
        }
        let segment = match &s[unit_start..pos] {
            "h" => amount.checked_mul(3600).map(Duration::from_secs),
            "m" => amount.checked_mul(60).map(Duration::from_secs),
            "s" => Some(Duration::from_secs(amount)),
            "ms" => Some(Duration::from_millis(amount)),
            "" => {
                return Err(LoadTestError::invalid_duration(
                    input,
                    "missing unit (use h, m, s or ms)",
                ))
            }
            other => {
                return Err(LoadTestError::invalid_duration(
                    input,
                    format!("unknown unit `{}`", other),
                ))
            }
        };

        total = segment
            .and_then(|d| total.checked_add(d))
            .ok_or_else(|| LoadTestError::invalid_duration(input, "duration overflows"))?;
    }

    Ok(total)
}

/// Format a duration in the same notation [`parse_duration`] accepts.
pub fn format_duration(d: Duration) -> String {
    let total_ms = d.as_millis();
    if total_ms == 0 {
        return "0s".to_string();
    }

    let hours = total_ms / 3_600_000;
    let mins = (total_ms / 60_000) % 60;
    let secs = (total_ms / 1000) % 60;
    let millis = total_ms % 1000;

    let mut out = String::new();
    if hours > 0 {
        out.push_str(&format!("{}h", hours));
    }
    if mins > 0 {
        out.push_str(&format!("{}m", mins));
    }
    if secs > 0 {
        out.push_str(&format!("{}s", secs));
    }
    if millis > 0 {
        out.push_str(&format!("{}ms", millis));
    }
    out
}

/// Serde adapter storing a [`Duration`] as a duration string.
pub mod serde_str {
    use super::{format_duration, parse_duration};
    use serde::{de, Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format_duration(*d))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let raw = String::deserialize(deserializer)?;
        parse_duration(&raw).map_err(de::Error::custom)
    }
}
