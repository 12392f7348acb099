//! WebSocket connection tracking and the echo handler.

pub mod connection;
pub mod handler;

pub use connection::{ConnectionId, ConnectionRecord, ConnectionRegistry, ConnectionState};
pub use handler::{HandlerOptions, handle_connection};
