//! Connection registry implementation
//!
//! The set of live clients. The I/O thread adds and removes connections, the
//! producer takes snapshots to broadcast to.

use std::sync::Arc;

use parking_lot::Mutex;

use super::connection::{Connection, ConnectionId};

/// Thread-safe registry of live connections, in registration order
///
/// All mutations happen under one mutex. `snapshot` copies the list under
/// the same lock and releases it immediately, so iterating a snapshot (which
/// may involve slow I/O) never holds up connect/disconnect handling.
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    connections: Mutex<Vec<Arc<Connection>>>,
}

impl ConnectionRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a connection
    pub fn add(&self, conn: Arc<Connection>) {
        let mut connections = self.connections.lock();
        connections.push(conn);

        tracing::debug!(clients = connections.len(), "Connection registered");
    }

    /// Unregister a connection, returning it if it was present
    pub fn remove(&self, id: ConnectionId) -> Option<Arc<Connection>> {
        let mut connections = self.connections.lock();
        let index = connections.iter().position(|c| c.id() == id)?;
        let conn = connections.remove(index);

        tracing::debug!(
            connection_id = %id,
            clients = connections.len(),
            "Connection unregistered"
        );

        Some(conn)
    }

    /// Point-in-time copy of the registered connections
    pub fn snapshot(&self) -> Vec<Arc<Connection>> {
        self.connections.lock().clone()
    }

    /// Unregister every connection at once
    pub fn drain(&self) -> Vec<Arc<Connection>> {
        std::mem::take(&mut *self.connections.lock())
    }

    /// Number of registered connections
    pub fn len(&self) -> usize {
        self.connections.lock().len()
    }

    /// Whether no connection is registered
    pub fn is_empty(&self) -> bool {
        self.connections.lock().is_empty()
    }
}
