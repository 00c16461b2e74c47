//! Per-connection bounded outbound queue
//!
//! Each connection owns one queue. When it is full the oldest pending
//! message is evicted to make room: for a live broadcast the freshest data is
//! what matters, and a stuck client should not sit on a stale backlog.
//!
//! Every operation takes only this queue's lock, so a slow client never
//! blocks pushes to the others.

use std::collections::VecDeque;

use parking_lot::Mutex;

use super::message::OutboundMessage;

/// Result of pushing onto an [`OutboundQueue`]
#[derive(Debug)]
pub enum PushOutcome {
    /// Queued without eviction
    Accepted,
    /// Queued after evicting the oldest pending message, which is returned
    Dropped(OutboundMessage),
    /// The queue was torn down; the rejected message is handed back
    Closed(OutboundMessage),
}

#[derive(Debug)]
struct QueueInner {
    items: VecDeque<OutboundMessage>,
    closed: bool,
}

/// Bounded FIFO of pending messages with drop-oldest overflow
#[derive(Debug)]
pub struct OutboundQueue {
    capacity: usize,
    inner: Mutex<QueueInner>,
}

impl OutboundQueue {
    /// Create a queue holding at most `capacity` messages (minimum 1)
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            inner: Mutex::new(QueueInner {
                items: VecDeque::with_capacity(capacity),
                closed: false,
            }),
        }
    }

    /// Maximum number of pending messages
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Append a message, evicting the oldest one if the queue is full
    pub fn push(&self, msg: OutboundMessage) -> PushOutcome {
        let mut inner = self.inner.lock();

        if inner.closed {
            return PushOutcome::Closed(msg);
        }

        let evicted = if inner.items.len() >= self.capacity {
            inner.items.pop_front()
        } else {
            None
        };
        inner.items.push_back(msg);

        match evicted {
            Some(old) => PushOutcome::Dropped(old),
            None => PushOutcome::Accepted,
        }
    }

    /// Take the oldest pending message
    pub fn pop(&self) -> Option<OutboundMessage> {
        self.inner.lock().items.pop_front()
    }

    /// Number of pending messages
    pub fn len(&self) -> usize {
        self.inner.lock().items.len()
    }

    /// Whether no message is pending
    pub fn is_empty(&self) -> bool {
        self.inner.lock().items.is_empty()
    }

    /// Whether the queue has been torn down
    pub fn is_closed(&self) -> bool {
        self.inner.lock().closed
    }

    /// Tear the queue down and return everything still pending
    ///
    /// Later pushes are rejected with [`PushOutcome::Closed`].
    pub fn close(&self) -> Vec<OutboundMessage> {
        let mut inner = self.inner.lock();
        inner.closed = true;
        inner.items.drain(..).collect()
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;

    use super::*;
    use crate::queue::completion::{self, Delivery, FailureKind};
    use crate::registry::ConnectionId;

    fn msg(byte: u8) -> OutboundMessage {
        OutboundMessage::new(Bytes::from(vec![byte]))
    }

    fn first_byte(msg: &OutboundMessage) -> u8 {
        msg.data()[0]
    }

    #[test]
    fn test_fifo_order() {
        let queue = OutboundQueue::new(4);
        for i in 0..3 {
            assert!(matches!(queue.push(msg(i)), PushOutcome::Accepted));
        }

        assert_eq!(queue.len(), 3);
        assert_eq!(first_byte(&queue.pop().unwrap()), 0);
        assert_eq!(first_byte(&queue.pop().unwrap()), 1);
        assert_eq!(first_byte(&queue.pop().unwrap()), 2);
        assert!(queue.pop().is_none());
        assert!(queue.is_empty());
    }

    #[test]
    fn test_drop_oldest_keeps_most_recent() {
        let queue = OutboundQueue::new(2);

        assert!(matches!(queue.push(msg(1)), PushOutcome::Accepted));
        assert!(matches!(queue.push(msg(2)), PushOutcome::Accepted));
        match queue.push(msg(3)) {
            PushOutcome::Dropped(evicted) => assert_eq!(first_byte(&evicted), 1),
            other => panic!("expected eviction, got {:?}", other),
        }

        assert_eq!(queue.len(), 2);
        assert_eq!(first_byte(&queue.pop().unwrap()), 2);
        assert_eq!(first_byte(&queue.pop().unwrap()), 3);
    }

    #[test]
    fn test_zero_capacity_clamped() {
        let queue = OutboundQueue::new(0);
        assert_eq!(queue.capacity(), 1);

        assert!(matches!(queue.push(msg(1)), PushOutcome::Accepted));
        assert!(matches!(queue.push(msg(2)), PushOutcome::Dropped(_)));
        assert_eq!(first_byte(&queue.pop().unwrap()), 2);
    }

    #[test]
    fn test_close_drains_and_rejects() {
        let queue = OutboundQueue::new(4);
        queue.push(msg(1));
        queue.push(msg(2));

        let drained = queue.close();
        assert_eq!(drained.len(), 2);
        assert!(queue.is_closed());
        assert!(queue.is_empty());

        match queue.push(msg(3)) {
            PushOutcome::Closed(rejected) => assert_eq!(first_byte(&rejected), 3),
            other => panic!("expected rejection, got {:?}", other),
        }
    }

    #[test]
    fn test_drained_completions_resolve_as_failed() {
        let (tx, rx) = completion::channel();
        let queue = OutboundQueue::new(4);
        let id = ConnectionId::new(9);
        queue.push(OutboundMessage::with_completion(
            Bytes::from_static(b"abc"),
            tx.completion(id),
        ));

        for pending in queue.close() {
            pending.complete(Delivery::Failed(FailureKind::Closed));
        }

        assert_eq!(
            rx.try_recv().unwrap(),
            (id, Delivery::Failed(FailureKind::Closed))
        );
    }
}
