//! Connection registry
//!
//! The registry holds the live WebSocket clients. The I/O thread registers a
//! client after its handshake and unregisters it when it closes; the producer
//! broadcasts to a snapshot.
//!
//! # Architecture
//!
//! ```text
//!                       Arc<ConnectionRegistry>
//!                    ┌──────────────────────────┐
//!                    │ Mutex<Vec<Arc<Connection │
//!                    │   { queue, writable,     │
//!                    │     close }>>>           │
//!                    └────────────┬─────────────┘
//!                                 │
//!        ┌────────────────────────┼────────────────────────┐
//!        │                        │                        │
//!        ▼                        ▼                        ▼
//!   [Producer]               [I/O thread]             [I/O thread]
//!   snapshot()               add() on open            remove() on close
//!   queue.push()             queue.pop() ──► TCP      queue.close()
//! ```
//!
//! No code path holds the registry lock and a queue lock at the same time.

pub mod connection;
pub mod store;

pub use connection::{Connection, ConnectionId, Enqueued};
pub use store::ConnectionRegistry;
