//! Broadcast dispatcher
//!
//! The producer-facing send path. One call fans a message out to every
//! registered connection and blocks until each connection's write completed,
//! or until the send timeout elapses. Connections that time out are failed
//! and scheduled for closure, so one stalled client delays the producer by at
//! most one timeout.

use std::collections::HashSet;
use std::sync::mpsc::RecvTimeoutError;
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;

use crate::queue::{completion, Delivery, FailureKind, OutboundMessage};
use crate::registry::{ConnectionId, ConnectionRegistry, Enqueued};
use crate::stats::RelayStats;

/// Per-connection outcomes of one broadcast, in snapshot order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    results: Vec<(ConnectionId, Delivery)>,
}

impl BroadcastReport {
    /// Report for a broadcast that reached no connection
    pub fn empty() -> Self {
        Self::default()
    }

    /// All per-connection results
    pub fn results(&self) -> &[(ConnectionId, Delivery)] {
        &self.results
    }

    /// Outcome for one connection, if it was part of the broadcast
    pub fn outcome(&self, id: ConnectionId) -> Option<Delivery> {
        self.results
            .iter()
            .find(|(conn, _)| *conn == id)
            .map(|(_, outcome)| *outcome)
    }

    /// Number of connections the broadcast targeted
    pub fn len(&self) -> usize {
        self.results.len()
    }

    /// Whether no connection was targeted
    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    pub fn delivered(&self) -> usize {
        self.count(Delivery::is_delivered)
    }

    pub fn dropped(&self) -> usize {
        self.count(|d| matches!(d, Delivery::Dropped))
    }

    pub fn failed(&self) -> usize {
        self.count(|d| matches!(d, Delivery::Failed(_)))
    }

    pub fn timed_out(&self) -> usize {
        self.count(|d| matches!(d, Delivery::Failed(FailureKind::Timeout)))
    }

    /// Whether every live connection finished its delivery attempt
    ///
    /// Failed writes and closed connections count as finished attempts; only
    /// a timeout means the producer gave up waiting.
    pub fn is_complete(&self) -> bool {
        self.timed_out() == 0
    }

    /// Whether every targeted connection received the message
    pub fn all_delivered(&self) -> bool {
        self.delivered() == self.len()
    }

    fn count(&self, pred: impl Fn(&Delivery) -> bool) -> usize {
        self.results.iter().filter(|(_, d)| pred(d)).count()
    }

    fn set(&mut self, id: ConnectionId, outcome: Delivery) {
        if let Some(slot) = self.results.iter_mut().find(|(conn, _)| *conn == id) {
            slot.1 = outcome;
        }
    }
}

/// Fans messages out to the registry's connections
#[derive(Debug)]
pub struct BroadcastDispatcher {
    registry: Arc<ConnectionRegistry>,
    stats: Arc<RelayStats>,
    send_timeout: Duration,
}

impl BroadcastDispatcher {
    pub fn new(
        registry: Arc<ConnectionRegistry>,
        stats: Arc<RelayStats>,
        send_timeout: Duration,
    ) -> Self {
        Self {
            registry,
            stats,
            send_timeout,
        }
    }

    /// Deliver `data` to every registered connection
    ///
    /// Returns immediately with an empty report when no client is connected.
    pub fn broadcast(&self, data: Bytes) -> BroadcastReport {
        let connections = self.registry.snapshot();
        if connections.is_empty() {
            return BroadcastReport::empty();
        }

        let (completions, rx) = completion::channel();
        let mut report = BroadcastReport {
            results: Vec::with_capacity(connections.len()),
        };
        let mut pending = HashSet::with_capacity(connections.len());

        for conn in &connections {
            let id = conn.id();
            let msg = OutboundMessage::with_completion(data.clone(), completions.completion(id));

            // Placeholder until the completion arrives
            let outcome = match conn.enqueue(msg) {
                Enqueued::Accepted => {
                    pending.insert(id);
                    Delivery::Failed(FailureKind::Timeout)
                }
                Enqueued::Dropped => {
                    tracing::debug!(connection_id = %id, "Outbound queue full, dropped oldest");
                    Delivery::Dropped
                }
                Enqueued::Closed => Delivery::Failed(FailureKind::Closed),
            };
            if outcome != Delivery::Failed(FailureKind::Closed) {
                conn.request_writable();
            }
            report.results.push((id, outcome));
        }

        // Only queued completions keep the channel open now
        drop(completions);

        // A timeout too large to represent waits without a deadline
        let deadline = Instant::now().checked_add(self.send_timeout);
        while !pending.is_empty() {
            let received = match deadline {
                Some(deadline) => {
                    rx.recv_timeout(deadline.saturating_duration_since(Instant::now()))
                }
                None => rx.recv().map_err(|_| RecvTimeoutError::Disconnected),
            };
            match received {
                Ok((id, outcome)) => {
                    if pending.remove(&id) {
                        report.set(id, outcome);
                    }
                }
                Err(RecvTimeoutError::Timeout) => break,
                Err(RecvTimeoutError::Disconnected) => {
                    // Every completion was resolved or dropped
                    for id in pending.drain() {
                        report.set(id, Delivery::Failed(FailureKind::Closed));
                    }
                }
            }
        }

        for id in pending {
            if let Some(conn) = connections.iter().find(|c| c.id() == id) {
                tracing::warn!(
                    connection_id = %id,
                    peer = %conn.peer_addr(),
                    queued = conn.pending(),
                    timeout_ms = self.send_timeout.as_millis() as u64,
                    "Client did not complete send in time, closing"
                );
                conn.schedule_close();
            }
        }

        self.stats
            .record_broadcast(report.results.iter().map(|(_, outcome)| outcome));

        report
    }
}
