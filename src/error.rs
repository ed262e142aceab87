//! Error types for Netscope

use std::io;
use std::net::SocketAddr;
use thiserror::Error;

/// Result type for Netscope operations
pub type Result<T> = std::result::Result<T, NetscopeError>;

/// Errors that can occur in Netscope
///
/// Failures of the host's own network traffic never appear here; they are
/// handed back to the host in its own error type.
#[derive(Debug, Error)]
pub enum NetscopeError {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Viewer server could not bind its port
    #[error("Failed to bind {addr}: {source}")]
    Bind {
        /// Address the server tried to bind
        addr: SocketAddr,
        /// Underlying socket error
        source: io::Error,
    },

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),
}

/// Failure reported by a store observer
///
/// The store drops an observer as soon as it reports one of these.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ObserverError {
    /// The observer's consumer has gone away
    #[error("observer disconnected")]
    Disconnected,

    /// The observer failed to handle the record
    #[error("observer failed: {0}")]
    Failed(String),
}
