//! Relay server
//!
//! Producer-facing entry point. `start` and `stop` follow the pipeline's
//! state changes; `broadcast` is called once per produced buffer from the
//! streaming thread.

use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::Mutex;

use crate::error::{Error, Result};
use crate::stats::ServerStats;

use super::config::RelayConfig;
use super::dispatcher::{BroadcastDispatcher, BroadcastReport};
use super::lifecycle::{IoThread, PipelineTransition, RelayContext, ServerState};

/// Broadcast relay from one producer to every connected WebSocket client
pub struct RelayServer {
    config: RelayConfig,
    context: Arc<RelayContext>,
    dispatcher: BroadcastDispatcher,
    control: Mutex<Option<IoThread>>,
}

impl RelayServer {
    /// Create a stopped relay with the given configuration
    pub fn new(config: RelayConfig) -> Self {
        let context = Arc::new(RelayContext::new());
        let dispatcher = BroadcastDispatcher::new(
            Arc::clone(&context.registry),
            Arc::clone(&context.stats),
            config.send_timeout,
        );

        Self {
            config,
            context,
            dispatcher,
            control: Mutex::new(None),
        }
    }

    /// Get the relay configuration
    pub fn config(&self) -> &RelayConfig {
        &self.config
    }

    /// Start listening on the configured host and port
    ///
    /// Returns the bound address. On failure the relay stays stopped and no
    /// thread is left running.
    pub fn start(&self) -> Result<SocketAddr> {
        self.start_with(&self.config)
    }

    /// Start listening on `host:port` instead of the configured address
    pub fn start_at(&self, host: &str, port: u16) -> Result<SocketAddr> {
        let config = self.config.clone().host(host).port(port);
        self.start_with(&config)
    }

    fn start_with(&self, config: &RelayConfig) -> Result<SocketAddr> {
        let mut control = self.control.lock();
        if control.is_some() {
            return Err(Error::AlreadyRunning);
        }

        self.context.state.set(ServerState::Starting);

        match IoThread::spawn(config, Arc::clone(&self.context)) {
            Ok(io) => {
                let addr = io.local_addr();
                *control = Some(io);
                self.context.state.set(ServerState::Running);
                tracing::info!(addr = %addr, "Relay started");
                Ok(addr)
            }
            Err(e) => {
                self.context.state.set(ServerState::Stopped);
                tracing::error!(addr = %config.bind_addr(), error = %e, "Relay failed to start");
                Err(e)
            }
        }
    }

    /// Stop serving: interrupt the I/O loop, close every client, join the thread
    ///
    /// Idempotent and safe after a failed `start`. Pending broadcasts are
    /// released with failed outcomes. An I/O thread that does not exit within
    /// the stop timeout yields a fatal error.
    pub fn stop(&self) -> Result<()> {
        let mut control = self.control.lock();
        let Some(io) = control.take() else {
            return Ok(());
        };

        self.context.state.set(ServerState::Stopping);
        tracing::info!(clients = self.context.registry.len(), "Stopping relay");

        io.cancel();
        let result = io.join(self.config.stop_timeout);

        // Normally a no-op; after a stuck shutdown this still releases producers
        self.context.sweep_connections();
        self.context.state.set(ServerState::Stopped);

        match &result {
            Ok(()) => tracing::info!("Relay stopped"),
            Err(e) => tracing::error!(error = %e, "Relay did not stop cleanly"),
        }
        result
    }

    /// Follow an external pipeline state change
    ///
    /// A failed start leaves the relay fully stopped.
    pub fn on_transition(&self, transition: PipelineTransition) -> Result<()> {
        match transition {
            PipelineTransition::ReadyToPaused => self.start().map(|_| ()),
            PipelineTransition::PausedToReady => self.stop(),
            PipelineTransition::PausedToPlaying | PipelineTransition::PlayingToPaused => Ok(()),
        }
    }

    /// Deliver one message to every connected client
    ///
    /// Blocks until each client's write completed or the send timeout
    /// elapsed. Returns an empty report without blocking when the relay is
    /// not running or nobody is connected.
    pub fn broadcast(&self, data: impl Into<Bytes>) -> BroadcastReport {
        if !self.context.state.get().accepts_work() {
            return BroadcastReport::empty();
        }

        self.dispatcher.broadcast(data.into())
    }

    /// Current lifecycle state
    pub fn state(&self) -> ServerState {
        self.context.state.get()
    }

    /// Whether the relay is running
    pub fn is_running(&self) -> bool {
        self.state() == ServerState::Running
    }

    /// Bound address while running
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.control.lock().as_ref().map(IoThread::local_addr)
    }

    /// Number of registered clients
    pub fn connection_count(&self) -> usize {
        self.context.registry.len()
    }

    /// Relay-wide statistics
    pub fn stats(&self) -> ServerStats {
        self.context.stats.snapshot()
    }
}

impl Default for RelayServer {
    fn default() -> Self {
        Self::new(RelayConfig::default())
    }
}

impl Drop for RelayServer {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            tracing::error!(error = %e, "Failed to stop relay on drop");
        }
    }
}
