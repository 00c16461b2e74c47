//! Synchronous broadcast relay from a media producer to WebSocket clients
//!
//! A single-threaded producer (typically a media pipeline emitting buffers at
//! its own cadence) calls [`RelayServer::broadcast`] once per output unit and
//! gets a definite per-client outcome back before producing the next one.
//! Clients connect and disconnect independently; they are served by one
//! dedicated I/O thread.
//!
//! ```text
//!  producer thread                          I/O thread (ws-relay-io)
//!  ───────────────                          ────────────────────────
//!  broadcast(bytes)                         accept ─► handshake ─► registry.add
//!    snapshot registry
//!    push onto each connection queue ──►    writable ─► queue.pop ─► ws.send
//!    wait (bounded) for completions  ◄──    completion(Delivered / Failed)
//!  ◄─ BroadcastReport                       close ─► registry.remove ─► drain
//! ```
//!
//! Each connection has its own bounded queue with drop-oldest overflow, so a
//! slow client only ever loses its own stale data. A client that does not
//! complete a write within the send timeout is reported as failed and closed.
//!
//! # Example
//!
//! ```no_run
//! use ws_relay::{RelayConfig, RelayServer};
//!
//! let relay = RelayServer::new(RelayConfig::with_addr("127.0.0.1", 8080));
//! relay.start()?;
//!
//! let report = relay.broadcast(vec![0x01, 0x02, 0x03]);
//! println!("delivered to {} of {} clients", report.delivered(), report.len());
//!
//! relay.stop()?;
//! # Ok::<(), ws_relay::Error>(())
//! ```

pub mod error;
pub mod queue;
pub mod registry;
pub mod server;
pub mod stats;

pub use error::{Error, Result};
pub use queue::{Delivery, FailureKind};
pub use registry::ConnectionId;
pub use server::{BroadcastReport, PipelineTransition, RelayConfig, RelayServer, ServerState};
pub use stats::ServerStats;
