//! Settings type definitions.
//!
//! All types use `#[serde(rename_all = "camelCase")]` for the JSON file
//! format and `#[serde(default)]` so partial files are accepted.

use serde::{Deserialize, Serialize};

use crate::errors::{Result, SettingsError};

/// Root settings type.
///
/// ```json
/// {
///   "server": { "port": 9000, "reusePort": true },
///   "logging": { "level": "debug", "format": "json" }
/// }
/// ```
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RippleSettings {
    /// Listener and connection settings.
    pub server: ServerSettings,
    /// Log output settings.
    pub logging: LoggingSettings,
}

impl RippleSettings {
    /// Reject values the server cannot run with.
    pub fn validate(&self) -> Result<()> {
        let server = &self.server;
        if server.host.trim().is_empty() {
            return Err(SettingsError::InvalidValue("host must not be empty".into()));
        }
        if server.handshake_timeout_ms == 0 {
            return Err(SettingsError::InvalidValue(
                "handshakeTimeoutMs must be positive".into(),
            ));
        }
        if server.close_timeout_ms == 0 {
            return Err(SettingsError::InvalidValue(
                "closeTimeoutMs must be positive".into(),
            ));
        }
        if server.backlog == 0 {
            return Err(SettingsError::InvalidValue("backlog must be positive".into()));
        }
        if server.max_message_size == Some(0) {
            return Err(SettingsError::InvalidValue(
                "maxMessageSize must be positive when set".into(),
            ));
        }
        Ok(())
    }
}

/// Listener and per-connection settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerSettings {
    /// Bind address.
    pub host: String,
    /// Bind port (`0` picks a free port).
    pub port: u16,
    /// Allow several processes to bind the same port (`SO_REUSEPORT`).
    pub reuse_port: bool,
    /// Listen backlog passed to the OS.
    pub backlog: u32,
    /// Largest accepted WebSocket message in bytes. `None` means unlimited.
    pub max_message_size: Option<usize>,
    /// Time allowed for the WebSocket opening handshake.
    pub handshake_timeout_ms: u64,
    /// Ping interval for idle connections. `0` disables keepalive.
    pub keepalive_interval_ms: u64,
    /// How long a drain may run before open connections are asked to close.
    /// `None` drains unconditionally.
    pub drain_timeout_ms: Option<u64>,
    /// How long to wait for a peer to finish a server-initiated close.
    pub close_timeout_ms: u64,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            reuse_port: false,
            backlog: 1024,
            max_message_size: None,
            handshake_timeout_ms: 10_000,
            keepalive_interval_ms: 20_000,
            drain_timeout_ms: None,
            close_timeout_ms: 10_000,
        }
    }
}

/// Log output settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Default level when `RUST_LOG` is not set.
    pub level: LogLevel,
    /// Output format.
    pub format: LogFormat,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            format: LogFormat::Pretty,
        }
    }
}

/// Minimum log level.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Detailed entry/exit points.
    Trace,
    /// Per-connection lifecycle.
    Debug,
    /// Server lifecycle.
    Info,
    /// Handler failures.
    Warn,
    /// Errors only.
    Error,
}

impl LogLevel {
    /// Parse a level name (case-insensitive). Accepts `warning` for `warn`.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "trace" => Some(Self::Trace),
            "debug" => Some(Self::Debug),
            "info" => Some(Self::Info),
            "warn" | "warning" => Some(Self::Warn),
            "error" => Some(Self::Error),
            _ => None,
        }
    }
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        };
        f.write_str(name)
    }
}

/// Log line format.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable lines.
    #[default]
    Pretty,
    /// One JSON object per line.
    Json,
}

impl LogFormat {
    /// Parse a format name (case-insensitive).
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "pretty" | "text" => Some(Self::Pretty),
            "json" => Some(Self::Json),
            _ => None,
        }
    }
}
