//! Resource-limit parsing.
//!
//! Policies carry durations, byte sizes, and rate limits as short strings
//! (`"3m"`, `"512MB"`, `"100/1m"`). Invalid input is always an error,
//! never a silent default.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors from limit parsing.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LimitError {
    /// Duration did not match `Ns|Nm|Nh|Nms`.
    #[error("invalid duration {0:?} (expected e.g. \"30s\", \"5m\", \"1h\", \"250ms\")")]
    InvalidDuration(String),

    /// Byte size did not match `N|NB|NKB|NMB|NGB`.
    #[error("invalid byte size {0:?} (expected e.g. \"1024\", \"64KB\", \"512MB\", \"1GB\")")]
    InvalidByteSize(String),

    /// Rate limit did not match `N/window`.
    #[error("invalid rate limit {0:?} (expected e.g. \"100/1m\")")]
    InvalidRateLimit(String),
}

/// Result type for limit parsing.
pub type LimitResult<T> = Result<T, LimitError>;

/// A request budget over a sliding window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimit {
    /// Requests allowed per window.
    pub requests: u64,
    /// Window length.
    #[serde(with = "duration_secs")]
    pub window: Duration,
}

mod duration_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub(super) fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        d.as_secs().serialize(s)
    }

    pub(super) fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_secs(u64::deserialize(d)?))
    }
}

/// Parse `Ns`, `Nm`, `Nh`, or `Nms`.
///
/// # Errors
///
/// Returns [`LimitError::InvalidDuration`] for anything else, including
/// bare numbers and empty input.
pub fn parse_duration(input: &str) -> LimitResult<Duration> {
    let s = input.trim();
    let err = || LimitError::InvalidDuration(input.to_string());

    // `ms` must be peeled before `m` and `s`.
    if let Some(n) = s.strip_suffix("ms") {
        let millis: u64 = n.parse().map_err(|_| err())?;
        return Ok(Duration::from_millis(millis));
    }
    if let Some(n) = s.strip_suffix('s') {
        let secs: u64 = n.parse().map_err(|_| err())?;
        return Ok(Duration::from_secs(secs));
    }
    if let Some(n) = s.strip_suffix('m') {
        let mins: u64 = n.parse().map_err(|_| err())?;
        return Ok(Duration::from_secs(mins.saturating_mul(60)));
    }
    if let Some(n) = s.strip_suffix('h') {
        let hours: u64 = n.parse().map_err(|_| err())?;
        return Ok(Duration::from_secs(hours.saturating_mul(3600)));
    }
    Err(err())
}

/// Parse `N`, `NB`, `NKB`, `NMB`, or `NGB` into bytes.
///
/// # Errors
///
/// Returns [`LimitError::InvalidByteSize`] for unknown suffixes or
/// non-numeric magnitudes.
pub fn parse_byte_size(input: &str) -> LimitResult<u64> {
    let s = input.trim();
    let err = || LimitError::InvalidByteSize(input.to_string());

    let (number, multiplier) = if let Some(n) = s.strip_suffix("KB") {
        (n, 1024)
    } else if let Some(n) = s.strip_suffix("MB") {
        (n, 1024 * 1024)
    } else if let Some(n) = s.strip_suffix("GB") {
        (n, 1024 * 1024 * 1024)
    } else if let Some(n) = s.strip_suffix('B') {
        (n, 1)
    } else {
        (s, 1)
    };

    let magnitude: u64 = number.trim().parse().map_err(|_| err())?;
    magnitude.checked_mul(multiplier).ok_or_else(err)
}

/// Parse `N/window` (e.g. `"100/1m"`).
///
/// # Errors
///
/// Returns [`LimitError::InvalidRateLimit`] when the shape is wrong and
/// [`LimitError::InvalidDuration`] when the window part is.
pub fn parse_rate_limit(input: &str) -> LimitResult<RateLimit> {
    let s = input.trim();
    let (count, window) = s
        .split_once('/')
        .ok_or_else(|| LimitError::InvalidRateLimit(input.to_string()))?;
    let requests: u64 = count
        .trim()
        .parse()
        .map_err(|_| LimitError::InvalidRateLimit(input.to_string()))?;
    let window = parse_duration(window)?;
    Ok(RateLimit { requests, window })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_durations() {
        assert_eq!(parse_duration("30s").unwrap(), Duration::from_secs(30));
        assert_eq!(parse_duration("5m").unwrap(), Duration::from_secs(300));
        assert_eq!(parse_duration("1h").unwrap(), Duration::from_secs(3600));
        assert_eq!(parse_duration("250ms").unwrap(), Duration::from_millis(250));
    }

    #[test]
    fn test_duration_rejects_bare_numbers() {
        assert!(parse_duration("30").is_err());
        assert!(parse_duration("").is_err());
        assert!(parse_duration("fast").is_err());
        assert!(parse_duration("3 m").is_err());
    }

    #[test]
    fn test_byte_sizes() {
        assert_eq!(parse_byte_size("1024").unwrap(), 1024);
        assert_eq!(parse_byte_size("512B").unwrap(), 512);
        assert_eq!(parse_byte_size("64KB").unwrap(), 64 * 1024);
        assert_eq!(parse_byte_size("512MB").unwrap(), 512 * 1024 * 1024);
        assert_eq!(parse_byte_size("1GB").unwrap(), 1024 * 1024 * 1024);
    }

    #[test]
    fn test_byte_size_rejects_garbage() {
        assert!(parse_byte_size("lots").is_err());
        assert!(parse_byte_size("1TB").is_err());
        assert!(parse_byte_size("").is_err());
    }

    #[test]
    fn test_rate_limits() {
        let rl = parse_rate_limit("100/1m").unwrap();
        assert_eq!(rl.requests, 100);
        assert_eq!(rl.window, Duration::from_secs(60));
    }

    #[test]
    fn test_rate_limit_rejects_garbage() {
        assert!(parse_rate_limit("100").is_err());
        assert!(parse_rate_limit("/1m").is_err());
        assert!(parse_rate_limit("100/often").is_err());
    }
}
