//! Statistics for the relay

use std::sync::atomic::{AtomicU64, Ordering};

use crate::queue::{Delivery, FailureKind};

/// Relay-wide counters, updated by the producer and the I/O thread
#[derive(Debug, Default)]
pub struct RelayStats {
    total_connections: AtomicU64,
    active_connections: AtomicU64,
    refused_connections: AtomicU64,
    broadcasts: AtomicU64,
    delivered: AtomicU64,
    dropped: AtomicU64,
    failed: AtomicU64,
    timed_out: AtomicU64,
    bytes_sent: AtomicU64,
}

impl RelayStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn connection_opened(&self) {
        self.total_connections.fetch_add(1, Ordering::Relaxed);
        self.active_connections.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn connection_closed(&self) {
        // Saturate: a sweep after a stuck shutdown may double-count
        let _ = self
            .active_connections
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| {
                Some(n.saturating_sub(1))
            });
    }

    pub(crate) fn connection_refused(&self) {
        self.refused_connections.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn bytes_written(&self, bytes: usize) {
        self.bytes_sent.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    /// Record the per-connection outcomes of one broadcast call
    pub(crate) fn record_broadcast<'a>(&self, outcomes: impl IntoIterator<Item = &'a Delivery>) {
        self.broadcasts.fetch_add(1, Ordering::Relaxed);
        for outcome in outcomes {
            let counter = match outcome {
                Delivery::Delivered => &self.delivered,
                Delivery::Dropped => &self.dropped,
                Delivery::Failed(FailureKind::Timeout) => {
                    self.timed_out.fetch_add(1, Ordering::Relaxed);
                    &self.failed
                }
                Delivery::Failed(_) => &self.failed,
            };
            counter.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Copy the current counter values
    pub fn snapshot(&self) -> ServerStats {
        ServerStats {
            total_connections: self.total_connections.load(Ordering::Relaxed),
            active_connections: self.active_connections.load(Ordering::Relaxed),
            refused_connections: self.refused_connections.load(Ordering::Relaxed),
            broadcasts: self.broadcasts.load(Ordering::Relaxed),
            delivered: self.delivered.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            timed_out: self.timed_out.load(Ordering::Relaxed),
            bytes_sent: self.bytes_sent.load(Ordering::Relaxed),
        }
    }
}

/// Server-wide statistics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServerStats {
    /// Total connections ever registered
    pub total_connections: u64,
    /// Currently registered connections
    pub active_connections: u64,
    /// Connections refused by the connection limit
    pub refused_connections: u64,
    /// Broadcast calls that reached at least one connection
    pub broadcasts: u64,
    /// Per-connection deliveries that completed
    pub delivered: u64,
    /// Per-connection pushes that overflowed the queue
    pub dropped: u64,
    /// Per-connection deliveries that failed (including timeouts)
    pub failed: u64,
    /// Failed deliveries caused by the send timeout
    pub timed_out: u64,
    /// Payload bytes written to clients
    pub bytes_sent: u64,
}
