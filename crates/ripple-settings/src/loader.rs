//! Settings loading with deep merge and environment variable overrides.
//!
//! Loading flow:
//! 1. Start with compiled [`RippleSettings::default()`]
//! 2. If the settings file exists, deep-merge its values over defaults
//! 3. Apply `RIPPLE_*` environment variable overrides
//! 4. Validate the result
//!
//! Deep merge rules:
//! - Objects are merged recursively (source overrides target per-key)
//! - Arrays and primitives are replaced entirely by source
//! - Null values in source are skipped (preserving target)

use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::debug;

use crate::errors::Result;
use crate::types::{LogFormat, LogLevel, RippleSettings};

/// Resolve the default settings file path (`~/.ripple/settings.json`).
pub fn settings_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".ripple").join("settings.json")
}

/// Load settings from the default path with env var overrides.
pub fn load_settings() -> Result<RippleSettings> {
    load_settings_from_path(&settings_path())
}

/// Load settings from a specific path with env var overrides.
///
/// A missing file yields defaults; invalid JSON is an error. The result is
/// not validated: call [`RippleSettings::validate`] once every layer,
/// including CLI flags, has been applied.
pub fn load_settings_from_path(path: &Path) -> Result<RippleSettings> {
    let mut settings = read_settings_file(path)?;
    apply_env_overrides(&mut settings);
    Ok(settings)
}

/// Read and merge the settings file without consulting the environment.
pub fn read_settings_file(path: &Path) -> Result<RippleSettings> {
    let defaults = serde_json::to_value(RippleSettings::default())?;

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

/// Apply environment variable overrides to loaded settings.
///
/// Invalid values are ignored with a warning and the file/default value is
/// kept.
pub fn apply_env_overrides(settings: &mut RippleSettings) {
    // ── Server ──────────────────────────────────────────────────────
    if let Some(v) = read_env_string("RIPPLE_HOST") {
        settings.server.host = v;
    }
    if let Some(v) = read_env_u16("RIPPLE_PORT", 0, 65535) {
        settings.server.port = v;
    }
    if let Some(v) = read_env_bool("RIPPLE_REUSE_PORT") {
        settings.server.reuse_port = v;
    }
    if let Some(v) = read_env_usize("RIPPLE_MAX_MESSAGE_SIZE", 1, usize::MAX) {
        settings.server.max_message_size = Some(v);
    }
    if let Some(v) = read_env_u64("RIPPLE_HANDSHAKE_TIMEOUT_MS", 1, 3_600_000) {
        settings.server.handshake_timeout_ms = v;
    }
    if let Some(v) = read_env_u64("RIPPLE_KEEPALIVE_INTERVAL_MS", 0, 3_600_000) {
        settings.server.keepalive_interval_ms = v;
    }
    if let Some(v) = read_env_u64("RIPPLE_DRAIN_TIMEOUT_MS", 1, 86_400_000) {
        settings.server.drain_timeout_ms = Some(v);
    }
    if let Some(v) = read_env_u64("RIPPLE_CLOSE_TIMEOUT_MS", 1, 3_600_000) {
        settings.server.close_timeout_ms = v;
    }

    // ── Logging ─────────────────────────────────────────────────────
    if let Some(v) = read_env_string("RIPPLE_LOG_LEVEL") {
        match LogLevel::parse(&v) {
            Some(level) => settings.logging.level = level,
            None => tracing::warn!(key = "RIPPLE_LOG_LEVEL", value = %v, "invalid log level, ignoring"),
        }
    }
    if let Some(v) = read_env_string("RIPPLE_LOG_FORMAT") {
        match LogFormat::parse(&v) {
            Some(format) => settings.logging.format = format,
            None => tracing::warn!(key = "RIPPLE_LOG_FORMAT", value = %v, "invalid log format, ignoring"),
        }
    }
}

// ── Pure parsing functions (testable without env vars) ──────────────────────

/// Parse a string as a boolean.
///
/// Accepts (case-insensitive): `true`/`1`/`yes`/`on` or `false`/`0`/`no`/`off`.
pub fn parse_bool(val: &str) -> Option<bool> {
    match val.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Parse a string as a `u16` within a range.
pub fn parse_u16_range(val: &str, min: u16, max: u16) -> Option<u16> {
    let n: u16 = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

/// Parse a string as a `u64` within a range.
pub fn parse_u64_range(val: &str, min: u64, max: u64) -> Option<u64> {
    let n: u64 = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

/// Parse a string as a `usize` within a range.
pub fn parse_usize_range(val: &str, min: usize, max: usize) -> Option<usize> {
    let n: usize = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

// ── Env var readers (thin wrappers) ─────────────────────────────────────────

fn read_env_string(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

fn read_env_bool(name: &str) -> Option<bool> {
    let val = std::env::var(name).ok()?;
    let result = parse_bool(&val);
    if result.is_none() {
        tracing::warn!(key = name, value = %val, "invalid boolean env var, ignoring");
    }
    result
}

fn read_env_u16(name: &str, min: u16, max: u16) -> Option<u16> {
    let val = std::env::var(name).ok()?;
    let result = parse_u16_range(&val, min, max);
    if result.is_none() {
        tracing::warn!(key = name, value = %val, "invalid u16 env var, ignoring");
    }
    result
}

fn read_env_u64(name: &str, min: u64, max: u64) -> Option<u64> {
    let val = std::env::var(name).ok()?;
    let result = parse_u64_range(&val, min, max);
    if result.is_none() {
        tracing::warn!(key = name, value = %val, "invalid u64 env var, ignoring");
    }
    result
}

fn read_env_usize(name: &str, min: usize, max: usize) -> Option<usize> {
    let val = std::env::var(name).ok()?;
    let result = parse_usize_range(&val, min, max);
    if result.is_none() {
        tracing::warn!(key = name, value = %val, "invalid usize env var, ignoring");
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::SettingsError;
    use assert_matches::assert_matches;

    // ── deep_merge ──────────────────────────────────────────────────

    #[test]
    fn merge_nested_override() {
        let target = serde_json::json!({
            "server": {"port": 8080, "host": "0.0.0.0"}
        });
        let source = serde_json::json!({
            "server": {"port": 9090}
        });
        let merged = deep_merge(target, source);
        assert_eq!(merged["server"]["port"], 9090);
        assert_eq!(merged["server"]["host"], "0.0.0.0");
    }

    #[test]
    fn merge_skips_null_source() {
        let target = serde_json::json!({"server": {"drainTimeoutMs": 500}});
        let source = serde_json::json!({"server": {"drainTimeoutMs": null}});
        let merged = deep_merge(target, source);
        assert_eq!(merged["server"]["drainTimeoutMs"], 500);
    }

    #[test]
    fn merge_replaces_primitive_with_object() {
        let merged = deep_merge(serde_json::json!({"a": 1}), serde_json::json!({"a": {"b": 2}}));
        assert_eq!(merged["a"]["b"], 2);
    }

    // ── file loading ────────────────────────────────────────────────

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let settings = read_settings_file(&dir.path().join("nope.json")).unwrap();
        assert_eq!(settings.server.port, 8080);
    }

    #[test]
    fn file_values_merge_over_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(
            &path,
            r#"{"server":{"port":9001,"reusePort":true,"drainTimeoutMs":2500},"logging":{"format":"json"}}"#,
        )
        .unwrap();

        let settings = read_settings_file(&path).unwrap();
        assert_eq!(settings.server.port, 9001);
        assert!(settings.server.reuse_port);
        assert_eq!(settings.server.drain_timeout_ms, Some(2500));
        assert_eq!(settings.server.keepalive_interval_ms, 20_000);
        assert_eq!(settings.logging.format, LogFormat::Json);
    }

    #[test]
    fn invalid_json_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, "{not json").unwrap();
        assert_matches!(read_settings_file(&path), Err(SettingsError::Json(_)));
    }

    #[test]
    fn wrong_type_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{"server":{"port":"eighty"}}"#).unwrap();
        assert_matches!(read_settings_file(&path), Err(SettingsError::Json(_)));
    }

    #[test]
    fn loading_defers_validation() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{"server":{"backlog":0}}"#).unwrap();

        let mut settings = load_settings_from_path(&path).unwrap();
        assert_eq!(settings.server.backlog, 0);
        assert_matches!(settings.validate(), Err(SettingsError::InvalidValue(_)));

        settings.server.backlog = 128;
        assert!(settings.validate().is_ok());
    }

    // ── parsing helpers ─────────────────────────────────────────────

    #[test]
    fn parse_bool_variants() {
        assert_eq!(parse_bool("ON"), Some(true));
        assert_eq!(parse_bool("1"), Some(true));
        assert_eq!(parse_bool("no"), Some(false));
        assert_eq!(parse_bool("maybe"), None);
    }

    #[test]
    fn parse_u16_respects_range() {
        assert_eq!(parse_u16_range("0", 0, 65535), Some(0));
        assert_eq!(parse_u16_range("8080", 1, 65535), Some(8080));
        assert_eq!(parse_u16_range("70000", 0, 65535), None);
        assert_eq!(parse_u16_range("-1", 0, 65535), None);
    }

    #[test]
    fn parse_u64_respects_range() {
        assert_eq!(parse_u64_range("0", 1, 10), None);
        assert_eq!(parse_u64_range("5", 1, 10), Some(5));
        assert_eq!(parse_u64_range("11", 1, 10), None);
    }

    #[test]
    fn parse_usize_rejects_garbage() {
        assert_eq!(parse_usize_range("abc", 1, 100), None);
        assert_eq!(parse_usize_range("64", 1, 100), Some(64));
    }
}
