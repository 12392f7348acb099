//! # ripple-server
//!
//! WebSocket echo server with graceful shutdown.
//!
//! - Supervisor: binds the listener, accepts connections and spawns one
//!   tracked handler task per connection
//! - Handler: WebSocket handshake, ordered echo, keepalive pings, close
//!   escalation during a timed-out drain
//! - Graceful shutdown via `CancellationToken` + `TaskTracker`: stop
//!   accepting, drop the listener, wait for in-flight handlers

#![deny(unsafe_code)]

pub mod config;
pub mod error;
pub mod listener;
pub mod server;
pub mod shutdown;
pub mod signal;
pub mod websocket;

pub use config::ServerConfig;
pub use error::{ConnectionError, ServerError};
pub use server::{EchoServer, ServerState};
pub use shutdown::{DrainOutcome, ShutdownCoordinator};
