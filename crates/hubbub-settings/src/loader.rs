//! Settings loading with deep merge and environment variable overrides.
//!
//! Loading flow:
//! 1. Start with compiled [`HubbubSettings::default()`]
//! 2. If the settings file exists, deep-merge its values over defaults
//! 3. Apply `HUBBUB_*` environment variable overrides
//!
//! Deep merge rules:
//! - Objects are merged recursively (source overrides target per-key)
//! - Arrays and primitives are replaced entirely by source
//! - Null values in source are skipped (preserving target)

use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde_json::Value;
use tracing::{debug, warn};

use crate::errors::Result;
use crate::types::HubbubSettings;

/// Env var naming an explicit settings file.
pub const CONFIG_ENV: &str = "HUBBUB_CONFIG";

/// Resolve the settings file: `$HUBBUB_CONFIG`, else `~/.hubbub/settings.json`.
pub fn settings_path() -> PathBuf {
    if let Some(explicit) = read_env_string(CONFIG_ENV) {
        return PathBuf::from(explicit);
    }
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".hubbub").join("settings.json")
}

/// Load settings from the default path with env var overrides.
pub fn load_settings() -> Result<HubbubSettings> {
    load_settings_from_path(&settings_path())
}

/// Load settings from a specific path with env var overrides.
///
/// A missing file yields defaults; a file with invalid JSON is an error.
pub fn load_settings_from_path(path: &Path) -> Result<HubbubSettings> {
    let mut settings = read_file_layer(path)?;
    apply_env_overrides(&mut settings);
    Ok(settings)
}

fn read_file_layer(path: &Path) -> Result<HubbubSettings> {
    let defaults = serde_json::to_value(HubbubSettings::default())?;

    let merged = if path.exists() {
        debug!(?path, "loading settings from file");
        let content = std::fs::read_to_string(path)?;
        let user: Value = serde_json::from_str(&content)?;
        deep_merge(defaults, user)
    } else {
        debug!(?path, "settings file not found, using defaults");
        defaults
    };

    Ok(serde_json::from_value(merged)?)
}

/// Recursive deep merge of two JSON values.
pub fn deep_merge(target: Value, source: Value) -> Value {
    match (target, source) {
        (Value::Object(mut target_map), Value::Object(source_map)) => {
            for (key, source_val) in source_map {
                if source_val.is_null() {
                    continue;
                }
                let merged = if let Some(target_val) = target_map.remove(&key) {
                    deep_merge(target_val, source_val)
                } else {
                    source_val
                };
                let _ = target_map.insert(key, merged);
            }
            Value::Object(target_map)
        }
        (_, source) => source,
    }
}

/// Apply `HUBBUB_*` overrides from the process environment.
pub fn apply_env_overrides(settings: &mut HubbubSettings) {
    apply_overrides(settings, read_env_string);
}

/// Apply overrides from an arbitrary lookup.
///
/// Values that fail to parse or fall outside their range are ignored with a
/// warning, leaving the file/default value in place.
pub fn apply_overrides(settings: &mut HubbubSettings, lookup: impl Fn(&str) -> Option<String>) {
    if let Some(v) = lookup("HUBBUB_ADDR").filter(|v| !v.trim().is_empty()) {
        settings.server.addr = v;
    }
    if let Some(v) = parsed(&lookup, "HUBBUB_MODE") {
        settings.server.mode = v;
    }
    if let Some(v) = parsed(&lookup, "HUBBUB_LOG_LEVEL") {
        settings.logging.level = v;
    }
    if let Some(v) = parsed(&lookup, "HUBBUB_FRAMING") {
        settings.hub.framing = v;
    }
    if let Some(v) = ranged(&lookup, "HUBBUB_MAILBOX_CAPACITY", 1, 1_000_000) {
        settings.hub.mailbox_capacity = v;
    }
    if let Some(v) = ranged(&lookup, "HUBBUB_MAX_MESSAGE_SIZE", 1, 64 * 1024 * 1024) {
        settings.hub.max_message_size = v;
    }
    if let Some(v) = ranged(&lookup, "HUBBUB_PONG_WAIT_MS", 1, 3_600_000) {
        settings.hub.pong_wait_ms = v;
    }
    if let Some(v) = ranged(&lookup, "HUBBUB_PING_PERIOD_MS", 1, 3_600_000) {
        settings.hub.ping_period_ms = v;
    }
    if let Some(v) = ranged(&lookup, "HUBBUB_WRITE_WAIT_MS", 1, 3_600_000) {
        settings.hub.write_wait_ms = v;
    }
    if let Some(v) = ranged(&lookup, "HUBBUB_SHUTDOWN_TIMEOUT_MS", 0, 3_600_000) {
        settings.server.shutdown_timeout_ms = v;
    }
}

/// Parse a string as a number within an inclusive range.
pub fn parse_range<T>(val: &str, min: T, max: T) -> Option<T>
where
    T: FromStr + PartialOrd,
{
    let n: T = val.trim().parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

fn parsed<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, name: &str) -> Option<T> {
    let val = lookup(name)?;
    let result = val.parse().ok();
    if result.is_none() {
        warn!(key = name, value = %val, "invalid env var, ignoring");
    }
    result
}

fn ranged<T>(lookup: &impl Fn(&str) -> Option<String>, name: &str, min: T, max: T) -> Option<T>
where
    T: FromStr + PartialOrd,
{
    let val = lookup(name)?;
    let result = parse_range(&val, min, max);
    if result.is_none() {
        warn!(key = name, value = %val, "out-of-range env var, ignoring");
    }
    result
}

fn read_env_string(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}
