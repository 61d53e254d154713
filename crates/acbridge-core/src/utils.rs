/*!
 * Utility functions and helpers for acbridge.
 *
 * Timeouts around bus transactions and the parsers used by the declarative
 * configuration (human durations such as `"30s"` and hex integers such as
 * `0x4201`).
 */
use std::future::Future;
use std::time::Duration;

use tokio::time::timeout;

use crate::error::{Error, Result};

/// Run a future with a timeout
///
/// The timeout is reported as [`Error::Timeout`] converted into the caller's
/// error type, so any crate error with a `From<Error>` impl can use it.
///
/// # Arguments
///
/// * `duration` - The timeout duration
/// * `future` - The future to run
pub async fn with_timeout<F, T, E>(duration: Duration, future: F) -> std::result::Result<T, E>
where
    F: Future<Output = std::result::Result<T, E>>,
    E: From<Error>,
{
    match timeout(duration, future).await {
        Ok(result) => result,
        Err(_) => Err(Error::timeout(format!(
            "Operation timed out after {}",
            format_duration(duration)
        ))
        .into()),
    }
}

/// Parse a human duration such as `"30s"`, `"500ms"`, `"1min"` or `"2h"`.
///
/// A bare number is read as seconds.
pub fn parse_duration(input: &str) -> Result<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(Error::config("Empty duration"));
    }

    let split = input
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(input.len());
    let (number, unit) = input.split_at(split);
    let value: f64 = number
        .parse()
        .map_err(|_| Error::config(format!("Invalid duration: {}", input)))?;

    let seconds = match unit.trim().to_ascii_lowercase().as_str() {
        "" | "s" | "sec" | "secs" | "second" | "seconds" => value,
        "ms" | "millis" | "milliseconds" => value / 1000.0,
        "us" | "micros" => value / 1_000_000.0,
        "m" | "min" | "mins" | "minute" | "minutes" => value * 60.0,
        "h" | "hr" | "hour" | "hours" => value * 3600.0,
        other => {
            return Err(Error::config(format!(
                "Invalid duration unit '{}' in {}",
                other, input
            )))
        }
    };

    Duration::try_from_secs_f64(seconds)
        .map_err(|e| Error::config(format!("Invalid duration {}: {}", input, e)))
}

/// Format a duration the way it is written in configuration files
pub fn format_duration(duration: Duration) -> String {
    let millis = duration.as_millis();
    if millis % 1000 == 0 {
        format!("{}s", millis / 1000)
    } else {
        format!("{}ms", millis)
    }
}

/// Parse an unsigned integer written either in decimal or as `0x` hex
pub fn parse_hex_u32(input: &str) -> Result<u32> {
    let input = input.trim();
    let parsed = match input
        .strip_prefix("0x")
        .or_else(|| input.strip_prefix("0X"))
    {
        Some(hex) => u32::from_str_radix(&hex.replace('_', ""), 16),
        None => input.replace('_', "").parse::<u32>(),
    };
    parsed.map_err(|_| Error::config(format!("Invalid integer: {}", input)))
}

/// Serde helpers for duration fields written as human strings
pub mod duration_str {
    use std::time::Duration;

    use serde::{de, Deserialize, Deserializer, Serializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Text(String),
        Seconds(f64),
    }

    /// Serialize a duration as a human string
    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&super::format_duration(*duration))
    }

    /// Deserialize a duration from a human string or a bare number of seconds
    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        match Raw::deserialize(deserializer)? {
            Raw::Text(text) => super::parse_duration(&text).map_err(de::Error::custom),
            Raw::Seconds(seconds) => Duration::try_from_secs_f64(seconds)
                .map_err(|e| de::Error::custom(format!("Invalid duration {}: {}", seconds, e))),
        }
    }
}

/// Serde helpers for integers that may be written as `0x` hex strings
pub mod hex_int {
    use serde::{de, Deserialize, Deserializer, Serializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Number(u64),
        Text(String),
    }

    fn read<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
        match Raw::deserialize(deserializer)? {
            Raw::Number(n) => Ok(n),
            Raw::Text(text) => super::parse_hex_u32(&text)
                .map(u64::from)
                .map_err(de::Error::custom),
        }
    }

    /// Serialize a 16-bit value as a hex string
    pub fn serialize_u16<S: Serializer>(value: &u16, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format!("0x{:04X}", value))
    }

    /// Deserialize a 16-bit value from a number or hex string
    pub fn deserialize_u16<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u16, D::Error> {
        let value = read(deserializer)?;
        u16::try_from(value)
            .map_err(|_| de::Error::custom(format!("Value 0x{:X} does not fit in 16 bits", value)))
    }

    /// Serialize a 32-bit value as a hex string
    pub fn serialize_u32<S: Serializer>(value: &u32, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format!("0x{:08X}", value))
    }

    /// Deserialize a 32-bit value from a number or hex string
    pub fn deserialize_u32<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u32, D::Error> {
        let value = read(deserializer)?;
        u32::try_from(value)
            .map_err(|_| de::Error::custom(format!("Value 0x{:X} does not fit in 32 bits", value)))
    }
}
