//! # Duration Validation
//!
//! Handles parsing and validating Go-style duration strings such as `5m`,
//! `1h30m` or `1.5s`.

use anyhow::Result;
use regex::Regex;
use std::sync::LazyLock;
use std::time::Duration;

static DURATION_FORMAT: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^([0-9]+(\.[0-9]+)?(ms|s|m|h))+$").ok());

static DURATION_SEGMENT: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"(?P<number>[0-9]+(?:\.[0-9]+)?)(?P<unit>ms|s|m|h)").ok());

/// Parse a Go duration string into `std::time::Duration`
///
/// Segments are summed, so `1h30m` is 5400 seconds. Units: `ms`, `s`, `m`, `h`.
/// A zero total is rejected since it would requeue in a hot loop.
pub fn parse_go_duration(duration_str: &str) -> Result<Duration> {
    let duration_trimmed = duration_str.trim();

    if duration_trimmed.is_empty() {
        return Err(anyhow::anyhow!("Duration string cannot be empty"));
    }

    let (Some(format), Some(segment)) = (DURATION_FORMAT.as_ref(), DURATION_SEGMENT.as_ref())
    else {
        return Err(anyhow::anyhow!("Failed to compile duration regex"));
    };

    if !format.is_match(duration_trimmed) {
        return Err(anyhow::anyhow!(
            "Invalid duration format '{duration_trimmed}'. Expected format: <number><unit>... (e.g., '30s', '5m', '1h30m')"
        ));
    }

    let mut total_seconds = 0f64;
    for captures in segment.captures_iter(duration_trimmed) {
        let number_str = captures
            .name("number")
            .map(|m| m.as_str())
            .ok_or_else(|| {
                anyhow::anyhow!("Failed to extract number from duration '{duration_trimmed}'")
            })?;
        let unit = captures
            .name("unit")
            .map(|m| m.as_str())
            .ok_or_else(|| {
                anyhow::anyhow!("Failed to extract unit from duration '{duration_trimmed}'")
            })?;

        let number: f64 = number_str.parse().map_err(|e| {
            anyhow::anyhow!("Invalid duration number '{number_str}' in '{duration_trimmed}': {e}")
        })?;

        total_seconds += match unit {
            "ms" => number / 1000.0,
            "s" => number,
            "m" => number * 60.0,
            "h" => number * 3600.0,
            _ => {
                return Err(anyhow::anyhow!(
                    "Invalid unit '{unit}' in duration '{duration_trimmed}'. Expected: ms, s, m, or h"
                ));
            }
        };
    }

    let duration = Duration::try_from_secs_f64(total_seconds)
        .map_err(|e| anyhow::anyhow!("Duration '{duration_trimmed}' is out of range: {e}"))?;

    if duration.is_zero() {
        return Err(anyhow::anyhow!(
            "Duration must be greater than 0, got '{duration_trimmed}'"
        ));
    }

    Ok(duration)
}

/// Validate a duration field and return the parsed value
///
/// The field name is included in error messages so users can find the offending field.
pub fn validate_duration_interval(interval: &str, field_name: &str) -> Result<Duration> {
    parse_go_duration(interval).map_err(|e| anyhow::anyhow!("{field_name}: {e}"))
}
