//! Per-client connection handle
//!
//! A `Connection` is the part of a client shared between the producer and the
//! I/O thread: its identity, its outbound queue, the writable notification
//! and the close token. The WebSocket stream itself never leaves the I/O
//! thread.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use tokio::sync::Notify;
use tokio_util::sync::{CancellationToken, WaitForCancellationFuture};

use crate::queue::{Delivery, FailureKind, OutboundMessage, OutboundQueue, PushOutcome};

/// Unique identity of an accepted connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Wrap a raw id
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// Raw id value
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Result of enqueueing a message on a connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Enqueued {
    /// Queued, nothing evicted
    Accepted,
    /// Queued, but the oldest pending message was evicted
    Dropped,
    /// The connection is being torn down
    Closed,
}

/// Shared handle for one connected client
#[derive(Debug)]
pub struct Connection {
    id: ConnectionId,
    peer_addr: SocketAddr,
    queue: OutboundQueue,
    writable: Notify,
    close: CancellationToken,
    connected_at: Instant,
    messages_sent: AtomicU64,
    bytes_sent: AtomicU64,
    messages_dropped: AtomicU64,
}

impl Connection {
    /// Create a connection with an empty queue of `queue_capacity` slots
    ///
    /// `close` is normally a child of the server-wide shutdown token.
    pub fn new(
        id: ConnectionId,
        peer_addr: SocketAddr,
        queue_capacity: usize,
        close: CancellationToken,
    ) -> Self {
        Self {
            id,
            peer_addr,
            queue: OutboundQueue::new(queue_capacity),
            writable: Notify::new(),
            close,
            connected_at: Instant::now(),
            messages_sent: AtomicU64::new(0),
            bytes_sent: AtomicU64::new(0),
            messages_dropped: AtomicU64::new(0),
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }

    /// Push a message onto the outbound queue
    ///
    /// An evicted message is completed as [`Delivery::Dropped`].
    pub fn enqueue(&self, msg: OutboundMessage) -> Enqueued {
        match self.queue.push(msg) {
            PushOutcome::Accepted => Enqueued::Accepted,
            PushOutcome::Dropped(evicted) => {
                self.messages_dropped.fetch_add(1, Ordering::Relaxed);
                evicted.complete(Delivery::Dropped);
                Enqueued::Dropped
            }
            PushOutcome::Closed(rejected) => {
                rejected.complete(Delivery::Failed(FailureKind::Closed));
                Enqueued::Closed
            }
        }
    }

    /// Take the next message to write
    pub fn next_message(&self) -> Option<OutboundMessage> {
        self.queue.pop()
    }

    /// Whether messages are waiting to be written
    pub fn has_pending(&self) -> bool {
        !self.queue.is_empty()
    }

    /// Number of messages waiting to be written
    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    /// Ask the I/O thread to service this connection
    pub fn request_writable(&self) {
        self.writable.notify_one();
    }

    /// Resolves once a writable notification has been requested
    pub async fn writable(&self) {
        self.writable.notified().await
    }

    /// Ask the I/O thread to close this connection
    pub fn schedule_close(&self) {
        self.close.cancel();
    }

    /// Whether a close has been requested (directly or by server shutdown)
    pub fn is_closing(&self) -> bool {
        self.close.is_cancelled()
    }

    /// Resolves once a close has been requested
    pub fn closed(&self) -> WaitForCancellationFuture<'_> {
        self.close.cancelled()
    }

    /// Close the queue and fail everything still pending
    ///
    /// Must be called after the connection left the registry.
    pub fn teardown(&self) -> usize {
        let pending = self.queue.close();
        let count = pending.len();
        for msg in pending {
            msg.complete(Delivery::Failed(FailureKind::Closed));
        }
        count
    }

    pub(crate) fn record_sent(&self, bytes: usize) {
        self.messages_sent.fetch_add(1, Ordering::Relaxed);
        self.bytes_sent.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    /// Messages written to this client
    pub fn messages_sent(&self) -> u64 {
        self.messages_sent.load(Ordering::Relaxed)
    }

    /// Payload bytes written to this client
    pub fn bytes_sent(&self) -> u64 {
        self.bytes_sent.load(Ordering::Relaxed)
    }

    /// Messages evicted by queue overflow
    pub fn messages_dropped(&self) -> u64 {
        self.messages_dropped.load(Ordering::Relaxed)
    }

    /// Time since the connection was registered
    pub fn age(&self) -> Duration {
        self.connected_at.elapsed()
    }
}
