//! Relay lifecycle state machine
//!
//! `Stopped → Starting → Running → Stopping → Stopped`. The state is readable
//! from any thread without locking; transitions are serialized by the
//! [`RelayServer`](super::RelayServer) control lock.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};
use crate::registry::ConnectionRegistry;
use crate::stats::RelayStats;

use super::config::RelayConfig;
use super::listener::{self, IoService};

/// Name of the dedicated I/O thread
pub const IO_THREAD_NAME: &str = "ws-relay-io";

/// Process-wide relay state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerState {
    /// Not listening, no I/O thread
    Stopped,
    /// Binding and spawning the I/O thread
    Starting,
    /// Accepting clients and broadcasts
    Running,
    /// Closing clients and joining the I/O thread
    Stopping,
}

impl ServerState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => ServerState::Starting,
            2 => ServerState::Running,
            3 => ServerState::Stopping,
            _ => ServerState::Stopped,
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            ServerState::Stopped => 0,
            ServerState::Starting => 1,
            ServerState::Running => 2,
            ServerState::Stopping => 3,
        }
    }

    /// Whether new broadcasts should be accepted
    pub fn accepts_work(&self) -> bool {
        *self == ServerState::Running
    }
}

impl std::fmt::Display for ServerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ServerState::Stopped => "stopped",
            ServerState::Starting => "starting",
            ServerState::Running => "running",
            ServerState::Stopping => "stopping",
        };
        f.write_str(name)
    }
}

/// Lock-free holder for the current [`ServerState`]
#[derive(Debug)]
pub struct StateCell(AtomicU8);

impl StateCell {
    pub fn new() -> Self {
        Self(AtomicU8::new(ServerState::Stopped.as_u8()))
    }

    pub fn get(&self) -> ServerState {
        ServerState::from_u8(self.0.load(Ordering::Acquire))
    }

    /// Move to `next`, returning the previous state
    pub fn set(&self, next: ServerState) -> ServerState {
        let prev = ServerState::from_u8(self.0.swap(next.as_u8(), Ordering::AcqRel));
        if prev != next {
            tracing::debug!(from = %prev, to = %next, "Relay state changed");
        }
        prev
    }
}

impl Default for StateCell {
    fn default() -> Self {
        Self::new()
    }
}

/// External pipeline transitions the relay follows
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineTransition {
    /// Start serving
    ReadyToPaused,
    /// No-op, the relay keeps serving
    PausedToPlaying,
    /// No-op, the relay keeps serving
    PlayingToPaused,
    /// Stop serving
    PausedToReady,
}

/// State shared by the producer-facing API and the I/O thread
#[derive(Debug, Default)]
pub struct RelayContext {
    pub registry: Arc<ConnectionRegistry>,
    pub stats: Arc<RelayStats>,
    pub state: StateCell,
}

impl RelayContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Unregister every connection and fail whatever they still had queued
    pub(crate) fn sweep_connections(&self) -> usize {
        let leftovers = self.registry.drain();
        for conn in &leftovers {
            conn.schedule_close();
            conn.teardown();
            self.stats.connection_closed();
        }
        leftovers.len()
    }
}

/// Handle to a running I/O thread
pub(crate) struct IoThread {
    handle: thread::JoinHandle<()>,
    exited: mpsc::Receiver<()>,
    shutdown: CancellationToken,
    local_addr: SocketAddr,
}

impl IoThread {
    /// Bind the listener and spawn the I/O thread
    ///
    /// Nothing is spawned if binding fails.
    pub(crate) fn spawn(config: &RelayConfig, context: Arc<RelayContext>) -> Result<Self> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(Error::Runtime)?;

        let listener = runtime.block_on(listener::bind(&config.host, config.port))?;
        let local_addr = listener.local_addr()?;

        let shutdown = CancellationToken::new();
        let service = IoService::new(listener, config.clone(), context, shutdown.clone());
        let (exited_tx, exited) = mpsc::channel();

        let handle = thread::Builder::new()
            .name(IO_THREAD_NAME.to_string())
            .spawn(move || {
                runtime.block_on(service.run());
                drop(runtime);
                let _ = exited_tx.send(());
            })
            .map_err(Error::Spawn)?;

        Ok(Self {
            handle,
            exited,
            shutdown,
            local_addr,
        })
    }

    pub(crate) fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Interrupt the I/O loop, including a poll in progress
    pub(crate) fn cancel(&self) {
        self.shutdown.cancel();
    }

    /// Wait up to `timeout` for the thread to exit
    pub(crate) fn join(self, timeout: Duration) -> Result<()> {
        match self.exited.recv_timeout(timeout) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                self.handle.join().map_err(|_| Error::IoThreadPanicked)
            }
            Err(RecvTimeoutError::Timeout) => Err(Error::ShutdownTimeout(timeout)),
        }
    }
}
