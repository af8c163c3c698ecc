// ABOUTME: Helpers for reading typed values from environment variables
// ABOUTME: Strict parsing for validated config, with legacy-name fallback for strings

use std::env;
use std::str::FromStr;

use crate::config::ConfigError;

/// Read an optional variable. Unset or blank yields `Ok(None)`; a value that
/// does not parse is an error.
pub fn parse_env<T>(name: &str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
{
    match env::var(name) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| ConfigError::InvalidValue {
                variable: name.to_string(),
                value: raw,
            }),
        _ => Ok(None),
    }
}

/// Read a string variable with a default.
pub fn string_env(primary: &str, fallback: Option<&str>, default: &str) -> String {
    env::var(primary)
        .ok()
        .or_else(|| fallback.and_then(|name| env::var(name).ok()))
        .filter(|value| !value.trim().is_empty())
        .unwrap_or_else(|| default.to_string())
}
