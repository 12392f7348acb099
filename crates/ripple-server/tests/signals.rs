//! Termination signals delivered to the test process.
//!
//! Kept in its own test binary: a signal sent to our pid reaches every
//! listener installed in the process.

#![cfg(unix)]

use std::process::Command;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::timeout;

use ripple_server::signal::{TerminationSignals, spawn_signal_listener};
use ripple_server::{EchoServer, ServerConfig, ServerState};

const TIMEOUT: Duration = Duration::from_secs(5);

#[tokio::test]
async fn sigterm_drains_and_stops_server() {
    let server = EchoServer::new(ServerConfig {
        host: "127.0.0.1".into(),
        port: 0,
        keepalive_interval: None,
        ..ServerConfig::default()
    });
    let signals = TerminationSignals::install().unwrap();
    let (_addr, handle) = server.listen().await.unwrap();
    let listener = spawn_signal_listener(Arc::clone(server.shutdown()), signals);

    let status = Command::new("kill")
        .args(["-TERM", &std::process::id().to_string()])
        .status()
        .unwrap();
    assert!(status.success());

    timeout(TIMEOUT, handle).await.unwrap().unwrap();
    assert_eq!(server.state(), ServerState::Stopped);
    assert!(server.shutdown().is_shutting_down());
    timeout(TIMEOUT, listener).await.unwrap().unwrap();
}
