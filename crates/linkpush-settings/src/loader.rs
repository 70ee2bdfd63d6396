//! Settings loading with deep merge and environment variable overrides.
//!
//! Loading flow:
//! 1. Start with compiled [`LinkpushSettings::default()`]
//! 2. If the settings file exists, deep-merge user values over defaults
//! 3. Apply environment variable overrides (highest priority)
//! 4. Validate the result
//!
//! Deep merge rules:
//! - Objects are merged recursively (source overrides target per-key)
//! - Arrays and primitives are replaced entirely by source
//! - Null values in source are skipped (preserving target)

use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::debug;

use crate::errors::{Result, SettingsError};
use crate::types::LinkpushSettings;

/// Resolve the settings file path: `LINKPUSH_SETTINGS`, else `~/.linkpush/settings.json`.
pub fn settings_path() -> PathBuf {
    if let Some(explicit) = read_env_string("LINKPUSH_SETTINGS") {
        return PathBuf::from(explicit);
    }
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".linkpush").join("settings.json")
}

/// Load settings from the default path with env var overrides.
pub fn load_settings() -> Result<LinkpushSettings> {
    load_settings_from_path(&settings_path())
}

/// Load settings from a specific path with env var overrides.
///
/// A missing file yields defaults. Invalid JSON or an invalid final value
/// is an error.
pub fn load_settings_from_path(path: &Path) -> Result<LinkpushSettings> {
    let mut settings = load_file_layer(path)?;
    apply_env_overrides(&mut settings);
    validate(&settings)?;
    Ok(settings)
}

fn load_file_layer(path: &Path) -> Result<LinkpushSettings> {
    let defaults = serde_json::to_value(LinkpushSettings::default())?;

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

/// Apply `LINKPUSH_*` (and `PORT`) environment overrides.
pub fn apply_env_overrides(settings: &mut LinkpushSettings) {
    apply_overrides_from(settings, |name| std::env::var(name).ok());
}

/// Apply overrides read through `lookup`. Invalid values are ignored with a warning.
pub fn apply_overrides_from<F>(settings: &mut LinkpushSettings, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    let string = |name: &str| lookup(name).filter(|v| !v.is_empty());
    let ranged = |name: &str, min: u64, max: u64| {
        let val = string(name)?;
        let parsed = parse_u64_range(&val, min, max);
        if parsed.is_none() {
            tracing::warn!(key = name, value = %val, "invalid numeric env var, ignoring");
        }
        parsed
    };

    if let Some(v) = string("LINKPUSH_HOST") {
        settings.server.host = v;
    }
    // `LINKPUSH_PORT` wins when both are set.
    for key in ["PORT", "LINKPUSH_PORT"] {
        if let Some(v) = ranged(key, 1, u64::from(u16::MAX)) {
            settings.server.port = u16::try_from(v).unwrap_or(settings.server.port);
        }
    }
    if let Some(v) = string("LINKPUSH_BASE_URL") {
        settings.server.public_base_url = Some(v.trim_end_matches('/').to_string());
    }
    if let Some(v) = ranged("LINKPUSH_MAX_RETRIES", 0, 100) {
        settings.delivery.max_retries = u32::try_from(v).unwrap_or(settings.delivery.max_retries);
    }
    if let Some(v) = ranged("LINKPUSH_RETRY_DELAY_MS", 1, 600_000) {
        settings.delivery.retry_delay_ms = v;
    }
    if let Some(v) = ranged("LINKPUSH_SESSION_TTL_SECS", 0, 31_536_000) {
        settings.sessions.ttl_secs = v;
    }
    if let Some(v) = string("LINKPUSH_LOG_LEVEL") {
        settings.logging.level = v;
    }
    if let Some(v) = string("LINKPUSH_LOG_FORMAT") {
        settings.logging.format = v;
    }
}

/// Reject values the server cannot run with.
pub fn validate(settings: &LinkpushSettings) -> Result<()> {
    if settings
        .server
        .public_base_url
        .as_deref()
        .is_some_and(|url| url.trim().is_empty())
    {
        return Err(SettingsError::InvalidValue(
            "server.publicBaseUrl must not be empty".into(),
        ));
    }
    if !(4..=32).contains(&settings.shortcodes.code_length) {
        return Err(SettingsError::InvalidValue(format!(
            "shortcodes.codeLength must be between 4 and 32, got {}",
            settings.shortcodes.code_length
        )));
    }
    if settings.server.send_queue_capacity == 0 {
        return Err(SettingsError::InvalidValue(
            "server.sendQueueCapacity must be at least 1".into(),
        ));
    }
    if settings.server.heartbeat_interval_secs == 0 {
        return Err(SettingsError::InvalidValue(
            "server.heartbeatIntervalSecs must be at least 1".into(),
        ));
    }
    Ok(())
}

/// Parse a string as a `u64` within a range.
pub fn parse_u64_range(val: &str, min: u64, max: u64) -> Option<u64> {
    let n: u64 = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

fn read_env_string(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}
