//! # ripple-logging
//!
//! Structured logging with `tracing`.
//!
//! `RUST_LOG` wins when set; otherwise the configured level applies to every
//! target. Output is either human-readable or one JSON object per line.

#![deny(unsafe_code)]

use ripple_settings::{LogFormat, LoggingSettings};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// Build the filter used when `RUST_LOG` is absent or unparsable.
pub fn default_filter(settings: &LoggingSettings) -> EnvFilter {
    EnvFilter::new(settings.level.to_string())
}

fn env_filter(settings: &LoggingSettings) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter(settings))
}

/// Initialize the global subscriber. Call once at startup.
///
/// Returns `false` if a global subscriber was already installed.
pub fn init_logging(settings: &LoggingSettings) -> bool {
    let filter = env_filter(settings);

    let fmt_layer = match settings.format {
        LogFormat::Json => tracing_subscriber::fmt::layer()
            .json()
            .with_target(true)
            .with_span_list(true)
            .with_filter(filter)
            .boxed(),
        LogFormat::Pretty => tracing_subscriber::fmt::layer()
            .with_target(true)
            .with_filter(filter)
            .boxed(),
    };

    tracing_subscriber::registry()
        .with(fmt_layer)
        .try_init()
        .is_ok()
}
