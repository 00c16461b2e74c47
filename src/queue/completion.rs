//! Completion signals from the I/O thread back to the producer
//!
//! Each broadcast call opens one completion channel. Every message it queues
//! carries a [`Completion`] tagged with the target connection; the I/O thread
//! signals it once the write finished. A completion that is dropped without
//! being signalled reports [`FailureKind::Closed`], so a waiting producer is
//! always released.

use std::sync::mpsc;

use crate::registry::ConnectionId;

/// Why a delivery to one connection failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// The transport write failed or was cut short
    Transport,
    /// No completion arrived within the send timeout
    Timeout,
    /// The connection was torn down before the message was written
    Closed,
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FailureKind::Transport => write!(f, "transport write failed"),
            FailureKind::Timeout => write!(f, "send timed out"),
            FailureKind::Closed => write!(f, "connection closed"),
        }
    }
}

/// Outcome of delivering one message to one connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Written to the transport in full
    Delivered,
    /// Queue overflow evicted a message
    Dropped,
    /// Delivery failed
    Failed(FailureKind),
}

impl Delivery {
    /// Whether the message reached the transport
    pub fn is_delivered(&self) -> bool {
        matches!(self, Delivery::Delivered)
    }
}

/// Receiving side of a completion channel, held by the producer
pub type CompletionReceiver = mpsc::Receiver<(ConnectionId, Delivery)>;

/// Sending side of a completion channel
#[derive(Debug, Clone)]
pub struct CompletionSender {
    tx: mpsc::Sender<(ConnectionId, Delivery)>,
}

impl CompletionSender {
    /// Create a completion for a message queued on `connection`
    pub fn completion(&self, connection: ConnectionId) -> Completion {
        Completion {
            connection,
            tx: Some(self.tx.clone()),
        }
    }
}

/// Open a new completion channel
pub fn channel() -> (CompletionSender, CompletionReceiver) {
    let (tx, rx) = mpsc::channel();
    (CompletionSender { tx }, rx)
}

/// One-shot completion signal for a single (message, connection) pair
#[derive(Debug)]
pub struct Completion {
    connection: ConnectionId,
    tx: Option<mpsc::Sender<(ConnectionId, Delivery)>>,
}

impl Completion {
    /// Connection this completion belongs to
    pub fn connection(&self) -> ConnectionId {
        self.connection
    }

    /// Report the outcome. The producer may already have stopped waiting.
    pub fn signal(mut self, outcome: Delivery) {
        self.send(outcome);
    }

    fn send(&mut self, outcome: Delivery) {
        if let Some(tx) = self.tx.take() {
            let _ = tx.send((self.connection, outcome));
        }
    }
}

impl Drop for Completion {
    fn drop(&mut self) {
        self.send(Delivery::Failed(FailureKind::Closed));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signal_delivers_outcome() {
        let (tx, rx) = channel();
        let completion = tx.completion(ConnectionId::new(7));

        completion.signal(Delivery::Delivered);

        assert_eq!(rx.try_recv().unwrap(), (ConnectionId::new(7), Delivery::Delivered));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_drop_signals_closed() {
        let (tx, rx) = channel();
        drop(tx.completion(ConnectionId::new(3)));

        assert_eq!(
            rx.try_recv().unwrap(),
            (ConnectionId::new(3), Delivery::Failed(FailureKind::Closed))
        );
    }

    #[test]
    fn test_signal_after_receiver_gone() {
        let (tx, rx) = channel();
        let completion = tx.completion(ConnectionId::new(1));
        drop(rx);

        // Must not panic
        completion.signal(Delivery::Dropped);
    }

    #[test]
    fn test_channel_disconnects_when_all_completions_resolved() {
        let (tx, rx) = channel();
        let a = tx.completion(ConnectionId::new(1));
        let b = tx.completion(ConnectionId::new(2));
        drop(tx);

        a.signal(Delivery::Delivered);
        drop(b);

        assert_eq!(rx.recv().unwrap().1, Delivery::Delivered);
        assert_eq!(rx.recv().unwrap().1, Delivery::Failed(FailureKind::Closed));
        assert!(rx.recv().is_err());
    }
}
