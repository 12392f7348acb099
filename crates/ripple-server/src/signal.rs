//! Termination signals (`SIGTERM`, `SIGINT`) as a shutdown source.

use std::io;
use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::info;

use crate::shutdown::ShutdownCoordinator;

/// Listeners for the signals that should stop the server.
///
/// Installed up front so a signal arriving while the server is still
/// binding is not lost.
pub struct TerminationSignals {
    #[cfg(unix)]
    term: tokio::signal::unix::Signal,
    #[cfg(unix)]
    int: tokio::signal::unix::Signal,
}

impl TerminationSignals {
    /// Register the signal handlers. Must be called inside a Tokio runtime.
    #[cfg(unix)]
    pub fn install() -> io::Result<Self> {
        use tokio::signal::unix::{SignalKind, signal};

        Ok(Self {
            term: signal(SignalKind::terminate())?,
            int: signal(SignalKind::interrupt())?,
        })
    }

    /// Register the signal handlers. Must be called inside a Tokio runtime.
    #[cfg(not(unix))]
    pub fn install() -> io::Result<Self> {
        Ok(Self {})
    }

    /// Wait for the next termination signal and return its name.
    #[cfg(unix)]
    pub async fn recv(&mut self) -> &'static str {
        tokio::select! {
            _ = self.term.recv() => "SIGTERM",
            _ = self.int.recv() => "SIGINT",
        }
    }

    /// Wait for the next termination signal and return its name.
    #[cfg(not(unix))]
    pub async fn recv(&mut self) -> &'static str {
        match tokio::signal::ctrl_c().await {
            Ok(()) => "ctrl-c",
            // Without a handler there is nothing left to wait for.
            Err(_) => std::future::pending().await,
        }
    }
}

/// Request shutdown on the first termination signal.
///
/// The task also ends if shutdown is initiated some other way.
pub fn spawn_signal_listener(
    shutdown: Arc<ShutdownCoordinator>,
    mut signals: TerminationSignals,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        tokio::select! {
            signal = signals.recv() => {
                info!(signal, "termination signal received");
                let _ = shutdown.shutdown();
            }
            () = shutdown.cancelled() => {}
        }
    })
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn install_succeeds_and_waits() {
        let mut signals = TerminationSignals::install().unwrap();
        let waited = tokio::time::timeout(Duration::from_millis(50), signals.recv()).await;
        assert!(waited.is_err());
    }

    #[tokio::test]
    async fn listener_exits_when_shutdown_elsewhere() {
        let shutdown = Arc::new(ShutdownCoordinator::new());
        let signals = TerminationSignals::install().unwrap();
        let handle = spawn_signal_listener(Arc::clone(&shutdown), signals);

        let _ = shutdown.shutdown();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();
    }
}
