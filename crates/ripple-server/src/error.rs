//! Server and connection error types.

use std::io::ErrorKind;
use std::time::Duration;

use thiserror::Error;
use tokio::task::JoinError;
use tokio_tungstenite::tungstenite::Error as WsError;
use tokio_tungstenite::tungstenite::error::ProtocolError;

/// Fatal errors surfaced to whoever starts the server.
#[derive(Debug, Error)]
pub enum ServerError {
    /// The listening socket could not be acquired (in use, no permission,
    /// unresolvable or invalid address).
    #[error("failed to bind {addr}: {source}")]
    Bind {
        /// The `host:port` that was requested.
        addr: String,
        /// The underlying OS error.
        #[source]
        source: std::io::Error,
    },
    /// `listen` was called on a server that is already running.
    #[error("server already started")]
    AlreadyStarted,
    /// The accept-loop task panicked or was aborted.
    #[error("accept loop task failed: {0}")]
    Supervisor(#[from] JoinError),
}

/// Failure of a single connection. Never escapes its handler task.
#[derive(Debug, Error)]
pub enum ConnectionError {
    /// The WebSocket opening handshake failed.
    #[error("websocket handshake failed: {0}")]
    Handshake(#[source] WsError),
    /// The peer did not complete the handshake in time.
    #[error("websocket handshake timed out after {0:?}")]
    HandshakeTimeout(Duration),
    /// Reading the next message failed.
    #[error("read failed: {0}")]
    Read(#[source] WsError),
    /// Writing an echo, ping or close frame failed.
    #[error("write failed: {0}")]
    Write(#[source] WsError),
    /// No pong arrived within one keepalive interval.
    #[error("peer missed keepalive pong")]
    KeepaliveTimeout,
}

/// Whether `err` means the peer went away rather than misbehaved.
///
/// Abrupt disconnects end a connection normally and are not reported as
/// handler failures.
pub fn is_peer_disconnect(err: &WsError) -> bool {
    match err {
        WsError::ConnectionClosed
        | WsError::AlreadyClosed
        | WsError::Protocol(ProtocolError::ResetWithoutClosingHandshake) => true,
        WsError::Io(io) => matches!(
            io.kind(),
            ErrorKind::ConnectionReset
                | ErrorKind::ConnectionAborted
                | ErrorKind::BrokenPipe
                | ErrorKind::UnexpectedEof
        ),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bind_error_display_includes_addr() {
        let err = ServerError::Bind {
            addr: "0.0.0.0:8080".into(),
            source: std::io::Error::new(ErrorKind::AddrInUse, "address in use"),
        };
        let msg = err.to_string();
        assert!(msg.contains("0.0.0.0:8080"));
        assert!(msg.contains("address in use"));
    }

    #[test]
    fn bind_error_exposes_source() {
        let err = ServerError::Bind {
            addr: "x".into(),
            source: std::io::Error::new(ErrorKind::PermissionDenied, "denied"),
        };
        let source = std::error::Error::source(&err).unwrap();
        assert!(source.to_string().contains("denied"));
    }

    #[tokio::test]
    async fn panicked_accept_loop_is_supervisor_error() {
        let joined = tokio::spawn(async { panic!("accept loop exploded") }).await;
        let err = ServerError::from(joined.unwrap_err());
        assert!(matches!(err, ServerError::Supervisor(ref e) if e.is_panic()));
        assert!(err.to_string().starts_with("accept loop task failed"));
    }

    #[test]
    fn handshake_timeout_display() {
        let err = ConnectionError::HandshakeTimeout(Duration::from_millis(250));
        assert_eq!(err.to_string(), "websocket handshake timed out after 250ms");
    }

    #[test]
    fn reset_without_close_is_disconnect() {
        let err = WsError::Protocol(ProtocolError::ResetWithoutClosingHandshake);
        assert!(is_peer_disconnect(&err));
    }

    #[test]
    fn closed_states_are_disconnects() {
        assert!(is_peer_disconnect(&WsError::ConnectionClosed));
        assert!(is_peer_disconnect(&WsError::AlreadyClosed));
    }

    #[test]
    fn io_reset_is_disconnect() {
        let err = WsError::Io(std::io::Error::new(ErrorKind::ConnectionReset, "reset"));
        assert!(is_peer_disconnect(&err));
        let err = WsError::Io(std::io::Error::new(ErrorKind::BrokenPipe, "pipe"));
        assert!(is_peer_disconnect(&err));
    }

    #[test]
    fn other_io_is_failure() {
        let err = WsError::Io(std::io::Error::new(ErrorKind::PermissionDenied, "nope"));
        assert!(!is_peer_disconnect(&err));
    }

    #[test]
    fn protocol_violation_is_failure() {
        let err = WsError::Protocol(ProtocolError::NonZeroReservedBits);
        assert!(!is_peer_disconnect(&err));
    }
}
