//! WebSocket relay server
//!
//! - `relay`: the producer-facing [`RelayServer`] (start / stop / broadcast)
//! - `dispatcher`: fan-out with bounded completion waits
//! - `lifecycle`: state machine and the dedicated I/O thread
//! - `listener`: accept loop run on the I/O thread
//! - `connection`: per-client write/read/close task

pub mod config;
pub(crate) mod connection;
pub mod dispatcher;
pub mod lifecycle;
pub(crate) mod listener;
pub mod relay;

pub use config::RelayConfig;
pub use dispatcher::{BroadcastDispatcher, BroadcastReport};
pub use lifecycle::{PipelineTransition, RelayContext, ServerState, StateCell};
pub use relay::RelayServer;
