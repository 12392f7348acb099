//! Per-connection echo handler.
//!
//! Each message is written back before the next one is read, so a
//! connection's echoes always come back in receive order.

use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::time::{self, Instant, Interval, MissedTickBehavior};
use tokio_tungstenite::tungstenite::Error as WsError;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::Utf8Bytes;
use tokio_tungstenite::tungstenite::protocol::frame::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::WebSocketConfig;
use tokio_tungstenite::{WebSocketStream, accept_async_with_config};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use super::connection::ConnectionRecord;
use crate::config::ServerConfig;
use crate::error::{ConnectionError, is_peer_disconnect};

const SHUTDOWN_REASON: &str = "server shutting down";

/// Settings a handler needs, extracted once from [`ServerConfig`].
#[derive(Clone, Debug)]
pub struct HandlerOptions {
    /// Max message and frame size. `None` is unlimited.
    pub max_message_size: Option<usize>,
    /// Time allowed for the opening handshake.
    pub handshake_timeout: Duration,
    /// Ping interval. `None` disables keepalive.
    pub keepalive_interval: Option<Duration>,
    /// How long to wait for the peer after sending Close.
    pub close_timeout: Duration,
}

impl HandlerOptions {
    fn websocket_config(&self) -> WebSocketConfig {
        WebSocketConfig::default()
            .max_message_size(self.max_message_size)
            .max_frame_size(self.max_message_size)
    }
}

impl From<&ServerConfig> for HandlerOptions {
    fn from(config: &ServerConfig) -> Self {
        Self {
            max_message_size: config.max_message_size,
            handshake_timeout: config.handshake_timeout,
            keepalive_interval: config.keepalive_interval,
            close_timeout: config.close_timeout,
        }
    }
}

/// Run one connection to completion.
///
/// Returns `Ok` when the peer closes the stream, completes a close
/// handshake or disconnects abruptly. Any other read or write failure is
/// returned as a [`ConnectionError`] for the caller to log.
pub async fn handle_connection<S>(
    stream: S,
    record: &ConnectionRecord,
    options: &HandlerOptions,
    close: CancellationToken,
) -> Result<(), ConnectionError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let handshake = accept_async_with_config(stream, Some(options.websocket_config()));
    let ws = match time::timeout(options.handshake_timeout, handshake).await {
        Ok(Ok(ws)) => ws,
        Ok(Err(e)) => return Err(ConnectionError::Handshake(e)),
        Err(_) => return Err(ConnectionError::HandshakeTimeout(options.handshake_timeout)),
    };
    debug!("websocket handshake complete");

    echo(ws, record, options, close).await
}

async fn echo<S>(
    mut ws: WebSocketStream<S>,
    record: &ConnectionRecord,
    options: &HandlerOptions,
    close: CancellationToken,
) -> Result<(), ConnectionError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut keepalive = options.keepalive_interval.map(|period| {
        let mut interval = time::interval_at(Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        interval
    });
    let mut awaiting_pong = false;
    let mut close_deadline: Option<Instant> = None;

    loop {
        tokio::select! {
            incoming = ws.next() => {
                let message = match incoming {
                    None => break,
                    Some(Ok(message)) => message,
                    Some(Err(e)) if is_peer_disconnect(&e) => {
                        debug!(error = %e, "peer disconnected");
                        break;
                    }
                    Some(Err(e)) => return Err(ConnectionError::Read(e)),
                };

                match message {
                    Message::Text(_) | Message::Binary(_) => {
                        // Data after our Close frame cannot be answered.
                        if close_deadline.is_some() {
                            continue;
                        }
                        match send_unless_closed(&mut ws, message, &close).await {
                            Write::Sent => record.record_echo(),
                            Write::Disconnected => break,
                            Write::Failed(e) => return Err(ConnectionError::Write(e)),
                            Write::Interrupted => {
                                keepalive = None;
                                if !begin_close(&mut ws, record, options, &mut close_deadline).await? {
                                    break;
                                }
                            }
                        }
                    }
                    Message::Pong(_) => awaiting_pong = false,
                    Message::Close(frame) => {
                        record.mark_closing();
                        debug!(?frame, "peer initiated close");
                    }
                    // Pings are answered by the protocol layer.
                    Message::Ping(_) | Message::Frame(_) => {}
                }
            }
            () = next_tick(&mut keepalive) => {
                if awaiting_pong {
                    return Err(ConnectionError::KeepaliveTimeout);
                }
                match send_unless_closed(&mut ws, Message::Ping(Vec::new().into()), &close).await {
                    Write::Sent => {
                        awaiting_pong = true;
                        trace!("sent keepalive ping");
                    }
                    Write::Disconnected => break,
                    Write::Failed(e) => return Err(ConnectionError::Write(e)),
                    Write::Interrupted => {
                        keepalive = None;
                        if !begin_close(&mut ws, record, options, &mut close_deadline).await? {
                            break;
                        }
                    }
                }
            }
            () = close.cancelled(), if close_deadline.is_none() => {
                keepalive = None;
                if !begin_close(&mut ws, record, options, &mut close_deadline).await? {
                    break;
                }
            }
            () = deadline_elapsed(close_deadline) => {
                debug!("peer did not finish close handshake");
                break;
            }
        }
    }

    Ok(())
}

/// Result of a write raced against the close token.
enum Write {
    Sent,
    Disconnected,
    Failed(WsError),
    /// The close token fired while the peer was not draining its socket.
    Interrupted,
}

async fn send_unless_closed<S>(
    ws: &mut WebSocketStream<S>,
    message: Message,
    close: &CancellationToken,
) -> Write
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    tokio::select! {
        biased;
        result = ws.send(message) => match result {
            Ok(()) => Write::Sent,
            Err(e) if is_peer_disconnect(&e) => {
                debug!(error = %e, "peer disconnected during write");
                Write::Disconnected
            }
            Err(e) => Write::Failed(e),
        },
        () = close.cancelled() => Write::Interrupted,
    }
}

/// Send Close `1001` and arm the close deadline.
///
/// Returns `false` when the connection should end right away: the peer is
/// gone, or it did not take the frame before `close_timeout` elapsed.
async fn begin_close<S>(
    ws: &mut WebSocketStream<S>,
    record: &ConnectionRecord,
    options: &HandlerOptions,
    close_deadline: &mut Option<Instant>,
) -> Result<bool, ConnectionError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    record.mark_closing();
    let deadline = Instant::now() + options.close_timeout;
    *close_deadline = Some(deadline);

    let frame = CloseFrame {
        code: CloseCode::Away,
        reason: Utf8Bytes::from_static(SHUTDOWN_REASON),
    };
    match time::timeout_at(deadline, ws.close(Some(frame))).await {
        Ok(Ok(())) => {
            debug!("sent close frame");
            Ok(true)
        }
        Ok(Err(e)) if is_peer_disconnect(&e) => Ok(false),
        Ok(Err(e)) => Err(ConnectionError::Write(e)),
        Err(_) => {
            debug!("peer is not reading, abandoning close handshake");
            Ok(false)
        }
    }
}

async fn next_tick(interval: &mut Option<Interval>) {
    match interval {
        Some(interval) => {
            let _ = interval.tick().await;
        }
        None => std::future::pending().await,
    }
}

async fn deadline_elapsed(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
