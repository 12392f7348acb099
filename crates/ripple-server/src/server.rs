//! `EchoServer`: owns the listener, runs the accept loop and drains
//! connections on shutdown.

use std::fmt;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::task::TaskTracker;
use tracing::{Instrument, debug, info, info_span, warn};

use crate::config::ServerConfig;
use crate::error::ServerError;
use crate::listener;
use crate::shutdown::ShutdownCoordinator;
use crate::websocket::{ConnectionRegistry, HandlerOptions, handle_connection};

/// Pause after a failed `accept` (e.g. out of file descriptors).
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// Lifecycle of an [`EchoServer`]. Only ever moves forward.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum ServerState {
    /// Constructed, not yet bound.
    Created,
    /// Accepting connections.
    Listening,
    /// Listener closed, waiting for handlers to finish.
    Draining,
    /// Every handler has finished.
    Stopped,
}

impl fmt::Display for ServerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Created => "created",
            Self::Listening => "listening",
            Self::Draining => "draining",
            Self::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

/// WebSocket echo server.
pub struct EchoServer {
    config: ServerConfig,
    shutdown: Arc<ShutdownCoordinator>,
    state: Arc<watch::Sender<ServerState>>,
    connections: Arc<ConnectionRegistry>,
    tracker: TaskTracker,
    options: Arc<HandlerOptions>,
    started: AtomicBool,
    local_addr: OnceLock<SocketAddr>,
}

impl EchoServer {
    /// Create a new server in the `Created` state.
    pub fn new(config: ServerConfig) -> Self {
        let options = Arc::new(HandlerOptions::from(&config));
        let (state, _) = watch::channel(ServerState::Created);
        Self {
            config,
            shutdown: Arc::new(ShutdownCoordinator::new()),
            state: Arc::new(state),
            connections: Arc::new(ConnectionRegistry::new()),
            tracker: TaskTracker::new(),
            options,
            started: AtomicBool::new(false),
            local_addr: OnceLock::new(),
        }
    }

    /// Bind the listener and spawn the accept loop.
    ///
    /// Returns the bound address and a handle that completes once the server
    /// is `Stopped`. A bind failure is returned before anything is accepted
    /// and leaves the server in `Created`.
    pub async fn listen(&self) -> Result<(SocketAddr, JoinHandle<()>), ServerError> {
        if self.started.swap(true, Ordering::AcqRel) {
            return Err(ServerError::AlreadyStarted);
        }

        let (listener, addr) = match self.bind().await {
            Ok(bound) => bound,
            Err(e) => {
                self.started.store(false, Ordering::Release);
                return Err(e);
            }
        };
        let _ = self.local_addr.set(addr);
        let _ = self.state.send_replace(ServerState::Listening);
        info!(%addr, reuse_port = self.config.reuse_port, "echo server listening");

        let accept = AcceptLoop {
            shutdown: Arc::clone(&self.shutdown),
            state: Arc::clone(&self.state),
            connections: Arc::clone(&self.connections),
            tracker: self.tracker.clone(),
            options: Arc::clone(&self.options),
            drain_timeout: self.config.drain_timeout,
        };
        let handle = tokio::spawn(accept.run(listener));
        Ok((addr, handle))
    }

    async fn bind(&self) -> Result<(TcpListener, SocketAddr), ServerError> {
        let listener = listener::bind(&self.config).await?;
        let addr = listener.local_addr().map_err(|source| ServerError::Bind {
            addr: self.config.bind_addr(),
            source,
        })?;
        Ok((listener, addr))
    }

    /// Listen and wait until the server has stopped.
    ///
    /// A panic in the accept loop is returned as [`ServerError::Supervisor`].
    pub async fn run(&self) -> Result<(), ServerError> {
        let (_, handle) = self.listen().await?;
        handle.await?;
        Ok(())
    }

    /// Ask the server to stop accepting and drain.
    ///
    /// Safe to call any number of times from any task, before or after
    /// [`listen`](Self::listen). Returns `true` only for the call that
    /// initiated shutdown.
    pub fn request_shutdown(&self) -> bool {
        self.shutdown.shutdown()
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ServerState {
        *self.state.borrow()
    }

    /// Watch lifecycle transitions.
    pub fn subscribe_state(&self) -> watch::Receiver<ServerState> {
        self.state.subscribe()
    }

    /// Number of connections whose handler has not finished.
    pub fn active_connections(&self) -> usize {
        self.connections.count()
    }

    /// The bound address, once listening.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr.get().copied()
    }

    /// Get the shutdown coordinator.
    pub fn shutdown(&self) -> &Arc<ShutdownCoordinator> {
        &self.shutdown
    }

    /// Get the server configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }
}

/// State moved into the accept-loop task.
struct AcceptLoop {
    shutdown: Arc<ShutdownCoordinator>,
    state: Arc<watch::Sender<ServerState>>,
    connections: Arc<ConnectionRegistry>,
    tracker: TaskTracker,
    options: Arc<HandlerOptions>,
    drain_timeout: Option<Duration>,
}

impl AcceptLoop {
    async fn run(self, listener: TcpListener) {
        loop {
            tokio::select! {
                biased;
                () = self.shutdown.cancelled() => break,
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer)) => self.spawn_handler(stream, peer),
                    Err(e) => {
                        warn!(error = %e, "accept failed");
                        tokio::select! {
                            biased;
                            () = self.shutdown.cancelled() => break,
                            () = tokio::time::sleep(ACCEPT_BACKOFF) => {}
                        }
                    }
                },
            }
        }

        // New connection attempts are refused from here on.
        drop(listener);
        let _ = self.state.send_replace(ServerState::Draining);
        info!(
            active = self.connections.count(),
            "stopped accepting, draining connections"
        );

        let outcome = self.shutdown.drain(&self.tracker, self.drain_timeout).await;
        let _ = self.state.send_replace(ServerState::Stopped);
        info!(?outcome, "echo server stopped");
    }

    fn spawn_handler(&self, stream: TcpStream, peer: SocketAddr) {
        if let Err(e) = stream.set_nodelay(true) {
            debug!(%peer, error = %e, "failed to set TCP_NODELAY");
        }

        let record = self.connections.register(peer);
        let span = info_span!("connection", conn_id = %record.id, %peer);
        let connections = Arc::clone(&self.connections);
        let options = Arc::clone(&self.options);
        let close = self.shutdown.close_token();

        let _ = self.tracker.spawn(
            async move {
                debug!(active = connections.count(), "connection accepted");
                match handle_connection(stream, &record, &options, close).await {
                    Ok(()) => debug!(
                        echoed = record.echoed(),
                        age = ?record.age(),
                        "connection closed"
                    ),
                    Err(e) => warn!(
                        error = %e,
                        echoed = record.echoed(),
                        "connection failed"
                    ),
                }
                let _ = connections.unregister(&record.id);
            }
            .instrument(span),
        );
    }
}
