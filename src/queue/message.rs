//! Outbound message type
//!
//! Payloads are `bytes::Bytes`, so fanning one producer buffer out to many
//! connections only bumps a reference count.

use bytes::Bytes;

use super::completion::{Completion, Delivery};

/// A message waiting in a connection's outbound queue
#[derive(Debug)]
pub struct OutboundMessage {
    data: Bytes,
    completion: Option<Completion>,
}

impl OutboundMessage {
    /// Create a message nobody waits on
    pub fn new(data: Bytes) -> Self {
        Self {
            data,
            completion: None,
        }
    }

    /// Create a message whose outcome is reported through `completion`
    pub fn with_completion(data: Bytes, completion: Completion) -> Self {
        Self {
            data,
            completion: Some(completion),
        }
    }

    /// Payload
    pub fn data(&self) -> &Bytes {
        &self.data
    }

    /// Payload length in bytes
    pub(crate) fn len(&self) -> usize {
        self.data.len()
    }

    /// Release the message, reporting `outcome` to whoever waits on it
    pub fn complete(mut self, outcome: Delivery) {
        if let Some(completion) = self.completion.take() {
            completion.signal(outcome);
        }
    }
}
