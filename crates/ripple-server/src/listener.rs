//! Listening socket setup.

use std::io;
use std::net::SocketAddr;

use tokio::net::{TcpListener, TcpSocket};
use tracing::debug;

use crate::config::ServerConfig;
use crate::error::ServerError;

/// Resolve, bind and listen according to `config`.
///
/// Every failure, including an unresolvable host, is reported as
/// [`ServerError::Bind`].
pub async fn bind(config: &ServerConfig) -> Result<TcpListener, ServerError> {
    let addr_str = config.bind_addr();
    let bind_err = |source: io::Error| ServerError::Bind {
        addr: addr_str.clone(),
        source,
    };

    let addr = resolve(&addr_str).await.map_err(bind_err)?;
    let socket = if addr.is_ipv4() {
        TcpSocket::new_v4()
    } else {
        TcpSocket::new_v6()
    }
    .map_err(bind_err)?;

    // Matches what std's `TcpListener::bind` does on Unix; does not allow
    // sharing a port that is actively listening.
    #[cfg(unix)]
    socket.set_reuseaddr(true).map_err(bind_err)?;

    if config.reuse_port {
        enable_reuse_port(&socket).map_err(bind_err)?;
    }

    socket.bind(addr).map_err(bind_err)?;
    let listener = socket.listen(config.backlog).map_err(bind_err)?;
    debug!(%addr, reuse_port = config.reuse_port, "listener bound");
    Ok(listener)
}

async fn resolve(addr: &str) -> io::Result<SocketAddr> {
    tokio::net::lookup_host(addr).await?.next().ok_or_else(|| {
        io::Error::new(
            io::ErrorKind::AddrNotAvailable,
            format!("no addresses resolved for {addr}"),
        )
    })
}

#[cfg(all(unix, not(target_os = "solaris"), not(target_os = "illumos")))]
fn enable_reuse_port(socket: &TcpSocket) -> io::Result<()> {
    socket.set_reuseport(true)
}

#[cfg(not(all(unix, not(target_os = "solaris"), not(target_os = "illumos"))))]
fn enable_reuse_port(_socket: &TcpSocket) -> io::Result<()> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        "SO_REUSEPORT is not available on this platform",
    ))
}
