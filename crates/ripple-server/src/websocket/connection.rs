//! Connection records and the registry of live connections.

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use dashmap::DashMap;
use uuid::Uuid;

/// Unique connection identifier.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ConnectionId(String);

impl ConnectionId {
    /// Generate a fresh, time-ordered id.
    pub fn new() -> Self {
        Self(format!("conn_{}", Uuid::now_v7()))
    }

    /// The id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Liveness of a connection. Only ever moves forward.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum ConnectionState {
    /// Handshake in progress or echoing.
    Open = 0,
    /// A Close frame was sent or received.
    Closing = 1,
    /// The handler has finished.
    Closed = 2,
}

impl ConnectionState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Open,
            1 => Self::Closing,
            _ => Self::Closed,
        }
    }
}

/// Shared view of one accepted connection.
///
/// The stream itself is owned by the handler task; this record only carries
/// what other parts of the server may observe.
pub struct ConnectionRecord {
    /// Unique connection ID.
    pub id: ConnectionId,
    /// Remote address.
    pub peer: SocketAddr,
    /// When the TCP connection was accepted.
    pub accepted_at: Instant,
    state: AtomicU8,
    echoed: AtomicU64,
}

impl ConnectionRecord {
    /// Create an `Open` record for `peer`.
    pub fn new(peer: SocketAddr) -> Self {
        Self {
            id: ConnectionId::new(),
            peer,
            accepted_at: Instant::now(),
            state: AtomicU8::new(ConnectionState::Open as u8),
            echoed: AtomicU64::new(0),
        }
    }

    /// Current liveness state.
    pub fn state(&self) -> ConnectionState {
        ConnectionState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Move to `Closing` unless already further along.
    pub fn mark_closing(&self) {
        let _ = self
            .state
            .fetch_max(ConnectionState::Closing as u8, Ordering::AcqRel);
    }

    /// Move to `Closed`.
    pub fn mark_closed(&self) {
        let _ = self
            .state
            .fetch_max(ConnectionState::Closed as u8, Ordering::AcqRel);
    }

    /// Count one echoed message.
    pub fn record_echo(&self) {
        let _ = self.echoed.fetch_add(1, Ordering::Relaxed);
    }

    /// Messages echoed so far.
    pub fn echoed(&self) -> u64 {
        self.echoed.load(Ordering::Relaxed)
    }

    /// Connection age.
    pub fn age(&self) -> Duration {
        self.accepted_at.elapsed()
    }
}

/// Registry of connections whose handler has not finished yet.
#[derive(Default)]
pub struct ConnectionRegistry {
    connections: DashMap<ConnectionId, Arc<ConnectionRecord>>,
}

impl ConnectionRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a newly accepted connection.
    pub fn register(&self, peer: SocketAddr) -> Arc<ConnectionRecord> {
        let record = Arc::new(ConnectionRecord::new(peer));
        let _ = self
            .connections
            .insert(record.id.clone(), Arc::clone(&record));
        record
    }

    /// Remove a connection and mark it `Closed`.
    pub fn unregister(&self, id: &ConnectionId) -> Option<Arc<ConnectionRecord>> {
        let (_, record) = self.connections.remove(id)?;
        record.mark_closed();
        Some(record)
    }

    /// Number of live connections.
    pub fn count(&self) -> usize {
        self.connections.len()
    }
}
