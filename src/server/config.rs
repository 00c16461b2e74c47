//! Relay configuration

use std::time::Duration;

/// Default bind host (all interfaces)
pub const DEFAULT_HOST: &str = "0.0.0.0";

/// Default bind port
pub const DEFAULT_PORT: u16 = 8080;

/// Default per-connection queue capacity
pub const DEFAULT_QUEUE_CAPACITY: usize = 4;

/// Shortest I/O poll interval accepted
pub const MIN_POLL_TIMEOUT: Duration = Duration::from_millis(1);

/// Relay configuration options
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Host or interface address to bind to
    pub host: String,

    /// Port to bind to (0 = ephemeral)
    pub port: u16,

    /// Pending messages kept per connection before the oldest is dropped
    pub queue_capacity: usize,

    /// How long `broadcast` waits for a connection's write to complete
    pub send_timeout: Duration,

    /// Upper bound on one I/O loop poll; also bounds the close handshake on stop
    pub poll_timeout: Duration,

    /// WebSocket handshake must complete within this time
    pub handshake_timeout: Duration,

    /// How long `stop` waits for the I/O thread to exit
    pub stop_timeout: Duration,

    /// Maximum concurrent connections (0 = unlimited)
    pub max_connections: usize,

    /// Enable TCP_NODELAY (disable Nagle's algorithm)
    pub tcp_nodelay: bool,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            send_timeout: Duration::from_secs(1),
            poll_timeout: Duration::from_millis(100),
            handshake_timeout: Duration::from_secs(5),
            stop_timeout: Duration::from_secs(5),
            max_connections: 0, // Unlimited
            tcp_nodelay: true,  // Frames go out as soon as they are produced
        }
    }
}

impl RelayConfig {
    /// Create a new config bound to `host:port`
    pub fn with_addr(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            ..Default::default()
        }
    }

    /// Set the bind host
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    /// Set the bind port
    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Set the per-connection queue capacity (at least 1)
    pub fn queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity.max(1);
        self
    }

    /// Set the producer wait timeout
    pub fn send_timeout(mut self, timeout: Duration) -> Self {
        self.send_timeout = timeout;
        self
    }

    /// Set the I/O poll timeout (at least [`MIN_POLL_TIMEOUT`])
    pub fn poll_timeout(mut self, timeout: Duration) -> Self {
        self.poll_timeout = timeout.max(MIN_POLL_TIMEOUT);
        self
    }

    /// Set the handshake timeout
    pub fn handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    /// Set the stop timeout
    pub fn stop_timeout(mut self, timeout: Duration) -> Self {
        self.stop_timeout = timeout;
        self
    }

    /// Set maximum connections
    pub fn max_connections(mut self, max: usize) -> Self {
        self.max_connections = max;
        self
    }

    /// Enable or disable TCP_NODELAY
    pub fn tcp_nodelay(mut self, enabled: bool) -> Self {
        self.tcp_nodelay = enabled;
        self
    }

    /// `host:port` as used in logs and errors
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
