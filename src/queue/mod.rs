//! Per-connection outbound queues and completion signalling

pub mod completion;
pub mod message;
pub mod outbound;

pub use completion::{Completion, CompletionReceiver, CompletionSender, Delivery, FailureKind};
pub use message::OutboundMessage;
pub use outbound::{OutboundQueue, PushOutcome};
