//! Helpers for reading configuration from environment variables.
//!
//! Binaries call `dotenvy::dotenv()` first, so values may also come from a
//! `.env` file. Missing variables fall back to defaults; present but
//! unparsable values are errors rather than silent defaults.

use std::str::FromStr;

/// A configuration value could not be loaded.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{key} is required")]
    Missing { key: &'static str },

    #[error("{key} has invalid value \"{value}\": {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

/// Read `key`, or `None` when unset.
pub fn env_string(key: &str) -> Option<String> {
    std::env::var(key).ok()
}

/// Read `key` or fall back to `default` when unset.
pub fn env_or(key: &str, default: &str) -> String {
    env_string(key).unwrap_or_else(|| default.to_string())
}

/// Read a required `key`.
pub fn env_required(key: &'static str) -> Result<String, ConfigError> {
    env_string(key)
        .filter(|v| !v.trim().is_empty())
        .ok_or(ConfigError::Missing { key })
}

/// Parse `key` as `T`, falling back to `default` when unset.
pub fn env_parse<T>(key: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env_string(key) {
        None => Ok(default),
        Some(raw) => parse_value(key, &raw),
    }
}

/// Parse a raw configuration value, attributing failures to `key`.
pub fn parse_value<T>(key: &'static str, raw: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
        key,
        value: raw.to_string(),
        reason: e.to_string(),
    })
}

/// Parse a boolean flag (`1/0`, `true/false`, `yes/no`, `on/off`).
pub fn parse_flag(key: &'static str, raw: &str) -> Result<bool, ConfigError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::Invalid {
            key,
            value: raw.to_string(),
            reason: "expected a boolean".to_string(),
        }),
    }
}

/// Split a comma-separated list, trimming entries and dropping empty ones.
pub fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn parse_value_reports_key() {
        let err = parse_value::<u16>("TESSERA_SERVER_PORT", "eighty").unwrap_err();
        assert_matches!(err, ConfigError::Invalid { key: "TESSERA_SERVER_PORT", .. });
    }

    #[test]
    fn parse_value_trims() {
        assert_eq!(parse_value::<u16>("PORT", " 8080 ").unwrap(), 8080);
    }

    #[test]
    fn flags() {
        assert!(parse_flag("F", "Yes").unwrap());
        assert!(!parse_flag("F", "off").unwrap());
        assert!(parse_flag("F", "maybe").is_err());
    }

    #[test]
    fn split_list_drops_blanks() {
        assert_eq!(
            split_list(" http://a:8080, ,http://b:8080 ,"),
            vec!["http://a:8080".to_string(), "http://b:8080".to_string()]
        );
    }
}
