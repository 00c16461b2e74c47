//! Relay error types
//!
//! Only lifecycle operations fail with [`Error`]. Per-connection problems
//! (write failures, send timeouts, queue overflow) are reported per client in
//! a [`BroadcastReport`](crate::server::BroadcastReport) instead.

use std::time::Duration;

/// Error type for relay lifecycle operations
#[derive(Debug)]
pub enum Error {
    /// The listening socket could not be created or bound
    Bind {
        /// Requested `host:port`
        addr: String,
        /// Underlying socket error
        source: std::io::Error,
    },
    /// The I/O runtime could not be built
    Runtime(std::io::Error),
    /// The I/O thread could not be spawned
    Spawn(std::io::Error),
    /// `start` was called while the relay is already running
    AlreadyRunning,
    /// The I/O thread did not exit within the stop timeout
    ShutdownTimeout(Duration),
    /// The I/O thread panicked
    IoThreadPanicked,
    /// Other I/O error
    Io(std::io::Error),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::Bind { addr, source } => write!(f, "Failed to bind {}: {}", addr, source),
            Error::Runtime(e) => write!(f, "Failed to build I/O runtime: {}", e),
            Error::Spawn(e) => write!(f, "Failed to spawn I/O thread: {}", e),
            Error::AlreadyRunning => write!(f, "Relay is already running"),
            Error::ShutdownTimeout(timeout) => {
                write!(f, "I/O thread did not exit within {:?}", timeout)
            }
            Error::IoThreadPanicked => write!(f, "I/O thread panicked"),
            Error::Io(e) => write!(f, "I/O error: {}", e),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Bind { source, .. } => Some(source),
            Error::Runtime(e) | Error::Spawn(e) | Error::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(e)
    }
}

impl Error {
    /// Whether this error means the I/O thread could not be shut down cleanly
    ///
    /// Callers should treat these as unrecoverable.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::ShutdownTimeout(_) | Error::IoThreadPanicked)
    }
}

/// Result alias for relay operations
pub type Result<T> = std::result::Result<T, Error>;
