//! Runtime server configuration.

use std::time::Duration;

use ripple_settings::ServerSettings;

/// Configuration for [`EchoServer`](crate::EchoServer).
#[derive(Clone, Debug)]
pub struct ServerConfig {
    /// Host to bind (default `"0.0.0.0"`).
    pub host: String,
    /// Port to bind (default `8080`, `0` for auto-assign).
    pub port: u16,
    /// Set `SO_REUSEPORT` so several processes can share the port.
    pub reuse_port: bool,
    /// Listen backlog.
    pub backlog: u32,
    /// Max WebSocket message size in bytes. `None` is unlimited.
    pub max_message_size: Option<usize>,
    /// Time allowed for the opening handshake.
    pub handshake_timeout: Duration,
    /// Ping interval. `None` disables keepalive.
    pub keepalive_interval: Option<Duration>,
    /// Drain budget before open connections are sent a Close frame.
    /// `None` waits for handlers unconditionally.
    pub drain_timeout: Option<Duration>,
    /// How long a handler waits for the peer after sending Close.
    pub close_timeout: Duration,
}

impl ServerConfig {
    /// `host:port` string, bracketing bare IPv6 hosts.
    pub fn bind_addr(&self) -> String {
        if self.host.contains(':') && !self.host.starts_with('[') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }
}

impl From<&ServerSettings> for ServerConfig {
    fn from(settings: &ServerSettings) -> Self {
        Self {
            host: settings.host.clone(),
            port: settings.port,
            reuse_port: settings.reuse_port,
            backlog: settings.backlog,
            max_message_size: settings.max_message_size,
            handshake_timeout: Duration::from_millis(settings.handshake_timeout_ms),
            keepalive_interval: (settings.keepalive_interval_ms > 0)
                .then(|| Duration::from_millis(settings.keepalive_interval_ms)),
            drain_timeout: settings.drain_timeout_ms.map(Duration::from_millis),
            close_timeout: Duration::from_millis(settings.close_timeout_ms),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::from(&ServerSettings::default())
    }
}
