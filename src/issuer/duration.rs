//! # Duration Parsing
//!
//! Parses the human-readable `rotateEvery` validity period of an X.509 claim.
//!
//! Accepted: one or more `<number><unit>` segments, optionally separated by
//! whitespace, e.g. `"90d"`, `"2w"`, `"1h30m"`, `"1.5h"`, `"1w 2d"`.
//! Units: `ns`, `us`/`µs`, `ms`, `s`, `m`, `h`, `d` (24h), `w` (7d), `y` (365d).

use regex::Regex;
use std::sync::LazyLock;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid duration '{input}': {reason}")]
pub struct DurationError {
    pub input: String,
    pub reason: String,
}

impl DurationError {
    fn new(input: &str, reason: impl Into<String>) -> Self {
        Self {
            input: input.to_string(),
            reason: reason.into(),
        }
    }
}

// Matches: <number><unit> where:
//   - number: digits with an optional fraction ("90", "1.5", ".5")
//   - unit: longest match first so "ms" is not read as "m" + garbage
static SEGMENT_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(?P<number>\d+(?:\.\d*)?|\.\d+)(?P<unit>ns|us|µs|ms|s|m|h|d|w|y)")
        .expect("Failed to compile duration segment regex - this should never happen")
});

fn unit_nanos(unit: &str) -> Option<f64> {
    const NANOS_PER_SECOND: f64 = 1e9;
    let seconds = match unit {
        "ns" => return Some(1.0),
        "us" | "µs" => return Some(1e3),
        "ms" => return Some(1e6),
        "s" => 1.0,
        "m" => 60.0,
        "h" => 3_600.0,
        "d" => 86_400.0,
        "w" => 604_800.0,
        "y" => 31_536_000.0,
        _ => return None,
    };
    Some(seconds * NANOS_PER_SECOND)
}

/// Parse a validity period such as `"90d"` into a `Duration`
///
/// # Errors
///
/// Returns `DurationError` if the string is empty, contains anything besides
/// `<number><unit>` segments, or adds up to zero.
pub fn parse_duration(input: &str) -> Result<Duration, DurationError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(DurationError::new(input, "duration cannot be empty"));
    }

    let mut rest = trimmed;
    let mut total_nanos: f64 = 0.0;
    while !rest.trim_start().is_empty() {
        let captures = SEGMENT_REGEX.captures(rest).ok_or_else(|| {
            DurationError::new(
                input,
                format!("unexpected '{}', expected <number><unit> (e.g. '90d', '1h30m')", rest.trim_start()),
            )
        })?;
        let number: f64 = captures["number"]
            .parse()
            .map_err(|e| DurationError::new(input, format!("invalid number: {e}")))?;
        let unit = &captures["unit"];
        let nanos = unit_nanos(unit)
            .ok_or_else(|| DurationError::new(input, format!("unknown unit '{unit}'")))?;
        total_nanos += number * nanos;

        let consumed = captures.get(0).map_or(rest.len(), |m| m.end());
        rest = &rest[consumed..];
    }

    if total_nanos < 1.0 {
        return Err(DurationError::new(input, "duration must be greater than 0"));
    }
    // u64 nanoseconds cover ~584 years
    if total_nanos >= u64::MAX as f64 {
        return Err(DurationError::new(input, "duration is too large"));
    }

    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        reason = "range checked above"
    )]
    Ok(Duration::from_nanos(total_nanos.round() as u64))
}
