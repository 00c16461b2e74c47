//! I/O service loop
//!
//! Runs on the dedicated I/O thread: accepts TCP clients, performs the
//! WebSocket handshake, registers connections and spawns one service task per
//! client. Every wait is raced against the shutdown token, so `stop` interrupts
//! a pending accept immediately rather than on the next tick.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::net::{TcpListener, TcpSocket, TcpStream};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};
use crate::registry::{Connection, ConnectionId};

use super::config::{RelayConfig, MIN_POLL_TIMEOUT};
use super::connection;
use super::lifecycle::RelayContext;

/// Listen backlog for the relay socket
const LISTEN_BACKLOG: u32 = 1024;

/// Resolve `host:port` and bind a listening socket with address reuse
pub(crate) async fn bind(host: &str, port: u16) -> Result<TcpListener> {
    let addr = format!("{}:{}", host, port);
    let bind_error = |source| Error::Bind {
        addr: addr.clone(),
        source,
    };

    let candidates = tokio::net::lookup_host((host, port))
        .await
        .map_err(bind_error)?;

    let mut last_err = None;
    for candidate in candidates {
        match bind_socket(candidate) {
            Ok(listener) => {
                tracing::info!(addr = %candidate, "WebSocket relay listening");
                return Ok(listener);
            }
            Err(e) => {
                tracing::debug!(addr = %candidate, error = %e, "Bind attempt failed");
                last_err = Some(e);
            }
        }
    }

    Err(bind_error(last_err.unwrap_or_else(|| {
        std::io::Error::new(
            std::io::ErrorKind::AddrNotAvailable,
            "host resolved to no addresses",
        )
    })))
}

fn bind_socket(addr: SocketAddr) -> std::io::Result<TcpListener> {
    let socket = if addr.is_ipv4() {
        TcpSocket::new_v4()?
    } else {
        TcpSocket::new_v6()?
    };
    socket.set_reuseaddr(true)?;
    socket.bind(addr)?;
    socket.listen(LISTEN_BACKLOG)
}

/// The I/O service loop and its accept state
pub(crate) struct IoService {
    listener: TcpListener,
    config: RelayConfig,
    context: Arc<RelayContext>,
    shutdown: CancellationToken,
    next_connection_id: AtomicU64,
    connection_semaphore: Option<Arc<Semaphore>>,
}

impl IoService {
    pub(crate) fn new(
        listener: TcpListener,
        mut config: RelayConfig,
        context: Arc<RelayContext>,
        shutdown: CancellationToken,
    ) -> Self {
        // The fields are public, so the builder clamp may have been bypassed
        config.poll_timeout = config.poll_timeout.max(MIN_POLL_TIMEOUT);

        let connection_semaphore = if config.max_connections > 0 {
            Some(Arc::new(Semaphore::new(config.max_connections)))
        } else {
            None
        };

        Self {
            listener,
            config,
            context,
            shutdown,
            next_connection_id: AtomicU64::new(1),
            connection_semaphore,
        }
    }

    /// Run until the shutdown token is cancelled, then close every client
    pub(crate) async fn run(self) {
        tracing::info!("I/O service loop started");

        let mut tasks = JoinSet::new();
        let mut ticker = tokio::time::interval(self.config.poll_timeout);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                biased;

                _ = self.shutdown.cancelled() => break,

                accepted = self.listener.accept() => match accepted {
                    Ok((socket, peer_addr)) => self.handle_connection(&mut tasks, socket, peer_addr),
                    Err(e) => tracing::error!(error = %e, "Failed to accept connection"),
                },

                _ = ticker.tick() => reap(&mut tasks),
            }
        }

        let IoService {
            listener,
            config,
            context,
            ..
        } = self;

        // Stop accepting before closing existing clients
        drop(listener);
        tracing::info!(clients = context.registry.len(), "Stopped listening, closing clients");

        // Every connection token is a child of the shutdown token, so the
        // tasks are already closing; give them one poll interval.
        let drained = tokio::time::timeout(config.poll_timeout, async {
            while tasks.join_next().await.is_some() {}
        })
        .await;

        if drained.is_err() {
            tracing::warn!(
                remaining = tasks.len(),
                "Connections did not close in time, aborting"
            );
            tasks.shutdown().await;
        }

        let swept = context.sweep_connections();
        if swept > 0 {
            tracing::debug!(swept, "Swept leftover connections");
        }

        tracing::info!("I/O service loop exited");
    }

    fn handle_connection(
        &self,
        tasks: &mut JoinSet<()>,
        socket: TcpStream,
        peer_addr: SocketAddr,
    ) {
        // Check connection limit
        let permit = if let Some(ref sem) = self.connection_semaphore {
            match sem.clone().try_acquire_owned() {
                Ok(permit) => Some(permit),
                Err(_) => {
                    tracing::warn!(peer = %peer_addr, "Connection refused: limit reached");
                    self.context.stats.connection_refused();
                    return;
                }
            }
        } else {
            None
        };

        let id = ConnectionId::new(self.next_connection_id.fetch_add(1, Ordering::Relaxed));

        if self.config.tcp_nodelay {
            if let Err(e) = socket.set_nodelay(true) {
                tracing::debug!(connection_id = %id, error = %e, "Failed to set TCP_NODELAY");
            }
        }

        tracing::debug!(connection_id = %id, peer = %peer_addr, "New TCP connection");

        let context = Arc::clone(&self.context);
        let shutdown = self.shutdown.clone();
        let handshake_timeout = self.config.handshake_timeout;
        let queue_capacity = self.config.queue_capacity;
        let poll_timeout = self.config.poll_timeout;

        tasks.spawn(async move {
            let _permit = permit;

            let handshake = tokio::time::timeout(
                handshake_timeout,
                tokio_tungstenite::accept_async(socket),
            );
            let ws = tokio::select! {
                _ = shutdown.cancelled() => return,
                result = handshake => match result {
                    Ok(Ok(ws)) => ws,
                    Ok(Err(e)) => {
                        tracing::debug!(connection_id = %id, error = %e, "WebSocket handshake failed");
                        return;
                    }
                    Err(_) => {
                        tracing::debug!(connection_id = %id, "WebSocket handshake timed out");
                        return;
                    }
                },
            };

            let conn = Arc::new(Connection::new(
                id,
                peer_addr,
                queue_capacity,
                shutdown.child_token(),
            ));
            context.registry.add(Arc::clone(&conn));
            context.stats.connection_opened();

            tracing::info!(connection_id = %id, peer = %peer_addr, "Client connected");

            connection::serve(conn, ws, &context, &shutdown, poll_timeout).await;

            tracing::info!(connection_id = %id, peer = %peer_addr, "Client disconnected");
        });
    }
}

/// Collect finished connection tasks
fn reap(tasks: &mut JoinSet<()>) {
    while let Some(result) = tasks.try_join_next() {
        if let Err(e) = result {
            if e.is_panic() {
                tracing::error!(error = %e, "Connection task panicked");
            }
        }
    }
}
