//! Helpers for reading provider options out of a JSON object

use pictura_core::Options;
use serde_json::Value;

use crate::error::{ImageGenError, Result};

/// Provider defaults overlaid with call options, call options winning per key
pub(crate) fn merge(defaults: &Options, call: &Options) -> Options {
    let mut merged = defaults.clone();
    merged.extend(call.iter().map(|(key, value)| (key.clone(), value.clone())));
    merged
}

/// Non-empty string option
pub(crate) fn string<'a>(options: &'a Options, key: &str) -> Option<&'a str> {
    options.get(key).and_then(Value::as_str).filter(|s| !s.is_empty())
}

/// Unsigned integer option, accepting numeric strings
pub(crate) fn unsigned(options: &Options, key: &str) -> Result<Option<u64>> {
    match options.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => n
            .as_u64()
            .map(Some)
            .ok_or_else(|| invalid(key, &n.to_string())),
        Some(Value::String(s)) if s.is_empty() => Ok(None),
        Some(Value::String(s)) => s.trim().parse().map(Some).map_err(|_| invalid(key, s)),
        Some(other) => Err(invalid(key, &other.to_string())),
    }
}

/// Floating point option, accepting numeric strings
pub(crate) fn number(options: &Options, key: &str) -> Result<Option<f64>> {
    match options.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => Ok(n.as_f64()),
        Some(Value::String(s)) if s.is_empty() => Ok(None),
        Some(Value::String(s)) => s.trim().parse().map(Some).map_err(|_| invalid(key, s)),
        Some(other) => Err(invalid(key, &other.to_string())),
    }
}

/// Boolean option, accepting "true"/"false" strings
pub(crate) fn flag(options: &Options, key: &str) -> Option<bool> {
    match options.get(key)? {
        Value::Bool(b) => Some(*b),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

/// Parse a `"WIDTHxHEIGHT"` size string
pub(crate) fn parse_size(size: &str) -> Result<(u32, u32)> {
    let parsed = size.split_once(['x', 'X']).and_then(|(width, height)| {
        let width = width.trim().parse::<u32>().ok()?;
        let height = height.trim().parse::<u32>().ok()?;
        (width > 0 && height > 0).then_some((width, height))
    });

    parsed.ok_or_else(|| {
        ImageGenError::InvalidOptions(format!("size '{size}' must look like WIDTHxHEIGHT, e.g. 1024x1024"))
    })
}

fn invalid(key: &str, value: &str) -> ImageGenError {
    ImageGenError::InvalidOptions(format!("option '{key}' has invalid value {value}"))
}
