//! Error types for the recorder

use std::io;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Result type for recorder operations
pub type Result<T> = std::result::Result<T, RecorderError>;

/// Errors that can occur while recording
#[derive(Debug, Error)]
pub enum RecorderError {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Invalid command input, raised before any I/O happens
    #[error("{0}")]
    Validation(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// No project directory above the starting directory
    #[error("unable to find protomok project directory from {}", .0.display())]
    ProjectNotFound(PathBuf),

    /// Listener could not be bound
    #[error("failed to bind recorder on {addr}: {source}")]
    Bind {
        /// Address we tried to bind
        addr: SocketAddr,
        /// Underlying socket error
        source: io::Error,
    },

    /// Listener failed while accepting connections
    #[error("server error: {0}")]
    Listener(io::Error),

    /// Open connections did not finish within the graceful bound
    #[error("failed to shut down recorder gracefully within {0:?}")]
    ShutdownTimeout(Duration),

    /// Forwarding to the target failed
    #[error("upstream request failed: {0}")]
    Upstream(String),

    /// Target did not answer in time
    #[error("upstream request timed out after {0:?}")]
    UpstreamTimeout(Duration),

    /// Request/response body over its configured limit
    #[error("Data too large: body exceeds limit of {limit} bytes")]
    DataTooLarge {
        /// Size limit
        limit: usize,
    },

    /// Response body could not be decoded for an artifact
    #[error("failed to decode response body: {0}")]
    Decode(#[from] serde_json::Error),

    /// The capture pipeline did not take the exchange
    #[error("capture hand-off failed: {0}")]
    HandOff(&'static str),

    /// Generic error with context
    #[error("{0}")]
    Other(String),
}
