//! Environment variable parsing utilities.
//!
//! Values are read through an [`EnvSource`] so configuration can be loaded
//! from something other than the process environment in tests.

use std::str::FromStr;
use std::time::Duration;

use super::ConfigError;

/// Key/value lookup backing configuration loading.
pub struct EnvSource<'a> {
    lookup: &'a dyn Fn(&str) -> Option<String>,
}

impl<'a> EnvSource<'a> {
    pub fn new(lookup: &'a dyn Fn(&str) -> Option<String>) -> Self {
        Self { lookup }
    }

    /// Get variable (None if empty or missing).
    pub fn opt(&self, key: &str) -> Option<String> {
        (self.lookup)(key).filter(|s| !s.is_empty())
    }

    /// Get variable with default value.
    pub fn or(&self, key: &str, default: &str) -> String {
        self.opt(key).unwrap_or_else(|| default.to_string())
    }

    /// Parse variable as boolean.
    /// Treats "1", "true" (case-insensitive) as true.
    pub fn bool(&self, key: &str, default: bool) -> bool {
        self.opt(key)
            .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
            .unwrap_or(default)
    }

    /// Parse variable with type conversion.
    pub fn parse<T: FromStr>(&self, key: &str, default: T) -> Result<T, ConfigError>
    where
        T::Err: std::fmt::Display,
    {
        match self.opt(key) {
            Some(v) => v.trim().parse().map_err(|e: T::Err| ConfigError::Parse {
                key: key.into(),
                value: v,
                error: e.to_string(),
            }),
            None => Ok(default),
        }
    }

    /// Parse variable as duration (see [`parse_duration`]).
    pub fn duration(&self, key: &str, default: &str) -> Result<Option<Duration>, ConfigError> {
        let value = self.or(key, default);
        parse_duration(&value).map_err(|e| ConfigError::Parse {
            key: key.into(),
            value,
            error: e,
        })
    }

    /// Like [`EnvSource::duration`], but "off" is rejected.
    pub fn required_duration(&self, key: &str, default: &str) -> Result<Duration, ConfigError> {
        self.duration(key, default)?
            .ok_or_else(|| ConfigError::Invalid {
                key: key.into(),
                message: "must be a positive duration".into(),
            })
    }
}

/// Parse duration string (e.g., "500ms", "30s", "2m", "1h").
/// Returns None for "off" or "0".
pub fn parse_duration(s: &str) -> Result<Option<Duration>, String> {
    let s = s.trim().to_lowercase();

    if s == "off" || s == "0" || s.is_empty() {
        return Ok(None);
    }

    if let Some(num_str) = s.strip_suffix("ms") {
        let ms: u64 = num_str
            .parse()
            .map_err(|_| format!("invalid number: {}", num_str))?;
        return Ok((ms > 0).then(|| Duration::from_millis(ms)));
    }

    let (num_str, multiplier) = match s.char_indices().last() {
        Some((i, 's')) => (&s[..i], 1),
        Some((i, 'm')) => (&s[..i], 60),
        Some((i, 'h')) => (&s[..i], 3600),
        _ => (s.as_str(), 1),
    };

    let num: u64 = num_str
        .parse()
        .map_err(|_| format!("invalid duration: {}", s))?;

    let secs = num
        .checked_mul(multiplier)
        .ok_or_else(|| format!("duration too large: {}", s))?;

    Ok((secs > 0).then(|| Duration::from_secs(secs)))
}
