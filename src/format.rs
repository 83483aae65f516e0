//! Duration parsing and display helpers, plus log-safe text shortening.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::{Error, Result};

static DURATION_TOKEN_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\d+(?:\.\d+)?)\s*(h|m|s)").expect("invalid duration regex"));
/// The whole input must be unit tokens and whitespace; anything else is not a duration.
static DURATION_INPUT_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?:\d+(?:\.\d+)?\s*(?:h|m|s)\s*)+$").expect("invalid duration regex")
});

/// Zero-padded `HH:MM:SS`; hours keep growing past 99.
pub fn format_hms(seconds: i64) -> String {
    let seconds = seconds.max(0);
    format!(
        "{:02}:{:02}:{:02}",
        seconds / 3600,
        (seconds % 3600) / 60,
        seconds % 60
    )
}

/// Compact label such as `1h 05m` or `12m`.
pub fn format_elapsed_short(seconds: i64) -> String {
    let seconds = seconds.max(0);
    let hours = seconds / 3600;
    let minutes = (seconds % 3600) / 60;
    if hours > 0 {
        format!("{}h {:02}m", hours, minutes)
    } else {
        format!("{}m", minutes)
    }
}

/// Parses a manually typed duration into seconds.
///
/// Accepts unit tokens (`1h 30m`, `1.5h`, `45m`, `90s`), a bare integer meaning minutes
/// (`90`) and a decimal meaning hours (`1.5`). Input with anything else in it is rejected.
pub fn parse_duration_input(input: &str) -> Result<i64> {
    let normalized = input.trim().to_lowercase();
    if normalized.is_empty() {
        return Err(Error::Validation("duration cannot be empty".to_string()));
    }

    let total = if DURATION_INPUT_REGEX.is_match(&normalized) {
        let seconds: f64 = DURATION_TOKEN_REGEX
            .captures_iter(&normalized)
            .map(|capture| {
                let value = capture[1].parse::<f64>().unwrap_or(0.0);
                let unit = match &capture[2] {
                    "h" => 3600.0,
                    "m" => 60.0,
                    _ => 1.0,
                };
                value * unit
            })
            .sum();
        whole_seconds(seconds)?
    } else if let Ok(minutes) = normalized.parse::<i64>() {
        minutes
            .checked_mul(60)
            .ok_or_else(|| Error::Validation("duration is too large".to_string()))?
    } else if normalized.contains('.') {
        match normalized.parse::<f64>() {
            Ok(hours) => whole_seconds(hours * 3600.0)?,
            Err(_) => return Err(unrecognised(input)),
        }
    } else {
        return Err(unrecognised(input));
    };

    if total <= 0 {
        return Err(Error::Validation("duration resolves to zero".to_string()));
    }
    Ok(total)
}

fn whole_seconds(seconds: f64) -> Result<i64> {
    if !seconds.is_finite() || seconds >= i64::MAX as f64 {
        return Err(Error::Validation("duration is too large".to_string()));
    }
    Ok(seconds.round() as i64)
}

fn unrecognised(input: &str) -> Error {
    Error::Validation(format!("unrecognised duration '{}'", input.trim()))
}

pub(crate) fn collapse_whitespace(value: &str) -> String {
    value.split_whitespace().collect::<Vec<_>>().join(" ")
}

pub(crate) fn truncate_text(value: &str, limit: usize) -> String {
    let trimmed = value.trim();
    if trimmed.chars().count() <= limit {
        return trimmed.to_string();
    }
    if limit <= 1 {
        return "…".to_string();
    }
    let mut truncated: String = trimmed.chars().take(limit - 1).collect();
    truncated.push('…');
    truncated
}

/// One-line, bounded rendition of a remote message for log output.
pub(crate) fn log_safe(value: &str) -> String {
    truncate_text(&collapse_whitespace(value), 180)
}
