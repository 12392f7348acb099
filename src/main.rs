//! # ripple
//!
//! WebSocket echo server binary: loads settings, starts the supervisor and
//! drains on `SIGTERM`/`SIGINT`.

#![deny(unsafe_code)]

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::Parser;
use ripple_server::signal::{TerminationSignals, spawn_signal_listener};
use ripple_server::{EchoServer, ServerConfig, ServerError};
use ripple_settings::{LogFormat, RippleSettings};
use tracing::info;

/// WebSocket echo server.
#[derive(Parser, Debug)]
#[command(name = "ripple", version, about = "WebSocket echo server with graceful shutdown")]
struct Cli {
    /// Settings file (defaults to `~/.ripple/settings.json` when present).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Host to bind.
    #[arg(long)]
    host: Option<String>,

    /// Port to bind (0 for auto-assign).
    #[arg(long)]
    port: Option<u16>,

    /// Share the port with other processes via `SO_REUSEPORT`.
    #[arg(long)]
    reuse_port: bool,

    /// Log output format (`pretty` or `json`).
    #[arg(long, value_parser = parse_log_format)]
    log_format: Option<LogFormat>,

    /// Close lingering connections this long after shutdown starts.
    #[arg(long)]
    drain_timeout_ms: Option<u64>,
}

impl Cli {
    /// Overlay explicit flags on loaded settings.
    fn apply(&self, settings: &mut RippleSettings) {
        if let Some(ref host) = self.host {
            settings.server.host.clone_from(host);
        }
        if let Some(port) = self.port {
            settings.server.port = port;
        }
        if self.reuse_port {
            settings.server.reuse_port = true;
        }
        if let Some(format) = self.log_format {
            settings.logging.format = format;
        }
        if let Some(ms) = self.drain_timeout_ms {
            settings.server.drain_timeout_ms = Some(ms);
        }
    }
}

fn parse_log_format(s: &str) -> Result<LogFormat, String> {
    LogFormat::parse(s).ok_or_else(|| format!("unknown log format `{s}` (expected pretty or json)"))
}

fn load_settings(cli: &Cli) -> Result<RippleSettings> {
    let mut settings = match cli.config {
        Some(ref path) => {
            if !path.exists() {
                bail!("Settings file not found: {}", path.display());
            }
            ripple_settings::load_settings_from_path(path)
                .with_context(|| format!("Failed to load settings from {}", path.display()))?
        }
        None => ripple_settings::load_settings().context("Failed to load settings")?,
    };
    cli.apply(&mut settings);
    settings.validate().context("Invalid settings")?;
    Ok(settings)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let settings = load_settings(&cli)?;
    let _ = ripple_logging::init_logging(&settings.logging);

    let server = EchoServer::new(ServerConfig::from(&settings.server));
    let signals = TerminationSignals::install().context("Failed to install signal handlers")?;
    let (addr, handle) = server.listen().await.context("Failed to bind server")?;
    info!(
        %addr,
        version = env!("CARGO_PKG_VERSION"),
        drain_timeout = ?server.config().drain_timeout,
        "ripple started"
    );

    let signal_task = spawn_signal_listener(Arc::clone(server.shutdown()), signals);
    handle
        .await
        .map_err(ServerError::from)
        .context("Server stopped abnormally")?;
    let _ = signal_task.await;

    info!("Shutdown complete");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_defaults_leave_settings_alone() {
        let cli = Cli::parse_from(["ripple"]);
        let mut settings = RippleSettings::default();
        cli.apply(&mut settings);
        assert_eq!(settings.server.host, "0.0.0.0");
        assert_eq!(settings.server.port, 8080);
        assert!(!settings.server.reuse_port);
        assert!(settings.server.drain_timeout_ms.is_none());
        assert_eq!(settings.logging.format, LogFormat::Pretty);
    }

    #[test]
    fn cli_overrides_settings() {
        let cli = Cli::parse_from([
            "ripple",
            "--host",
            "127.0.0.1",
            "--port",
            "9001",
            "--reuse-port",
            "--log-format",
            "json",
            "--drain-timeout-ms",
            "2500",
        ]);
        let mut settings = RippleSettings::default();
        cli.apply(&mut settings);
        assert_eq!(settings.server.host, "127.0.0.1");
        assert_eq!(settings.server.port, 9001);
        assert!(settings.server.reuse_port);
        assert_eq!(settings.server.drain_timeout_ms, Some(2500));
        assert_eq!(settings.logging.format, LogFormat::Json);
    }

    #[test]
    fn cli_config_path() {
        let cli = Cli::parse_from(["ripple", "--config", "/tmp/ripple.json"]);
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/ripple.json")));
    }

    #[test]
    fn cli_rejects_unknown_log_format() {
        assert!(Cli::try_parse_from(["ripple", "--log-format", "xml"]).is_err());
    }

    #[test]
    fn missing_explicit_config_is_error() {
        let cli = Cli::parse_from(["ripple", "--config", "/nonexistent/ripple/settings.json"]);
        assert!(load_settings(&cli).is_err());
    }

    #[test]
    fn cli_empty_host_fails_validation() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{"server":{"port":9100}}"#).unwrap();

        let cli = Cli::parse_from(["ripple", "--config", path.to_str().unwrap(), "--host", ""]);
        assert!(load_settings(&cli).is_err());
    }

    #[test]
    fn cli_flag_repairs_invalid_file_value() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{"server":{"host":"","port":9100}}"#).unwrap();

        let cli = Cli::parse_from([
            "ripple",
            "--config",
            path.to_str().unwrap(),
            "--host",
            "127.0.0.1",
        ]);
        let settings = load_settings(&cli).unwrap();
        assert_eq!(settings.server.host, "127.0.0.1");
        assert_eq!(settings.server.port, 9100);
    }
}
