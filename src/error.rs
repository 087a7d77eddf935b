//! Error types for the recorder

use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use thiserror::Error;

/// Result type for recorder operations
pub type Result<T> = std::result::Result<T, RecorderError>;

/// Errors that can occur while registering expectations, dispatching requests
/// or waiting for them
#[derive(Debug, Error)]
pub enum RecorderError {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The listener could not bind its address
    #[error("Failed to bind {addr}: {source}")]
    Bind {
        /// Address that was requested
        addr: SocketAddr,
        /// Underlying socket error
        source: io::Error,
    },

    /// A response source cannot be turned into a response cycle
    #[error("Invalid response source: {0}")]
    InvalidResponseSource(String),

    /// More than one expectation accepted the same request
    #[error("{recorder} got a request that would match multiple expectations: {}", .expectations.join(", "))]
    AmbiguousMatch {
        /// Display name of the recorder
        recorder: String,
        /// Every expectation that claimed the request, in registration order
        expectations: Vec<String>,
    },

    /// A `wait()` call gave up before its response slot was fulfilled
    #[error("{expectation} timed out after {timeout:?} waiting for a request")]
    WaitTimeout {
        /// Display name of the expectation
        expectation: String,
        /// Timeout that elapsed
        timeout: Duration,
    },

    /// A `wait()` call went past the last response of a finite expectation
    #[error("{expectation} has no response left to wait for")]
    ResponsesExhausted {
        /// Display name of the expectation
        expectation: String,
    },

    /// Internal bookkeeping is inconsistent
    #[error("Invariant violated: {0}")]
    InvariantViolation(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// The request body could not be read from the connection
    #[error("Failed to read request body: {0}")]
    BodyRead(String),

    /// Request too large
    #[error("Data too large: {size} bytes exceeds limit of {limit} bytes")]
    DataTooLarge {
        /// Announced size, or the first size past the limit for streamed bodies
        size: usize,
        /// Size limit
        limit: usize,
    },
}

impl RecorderError {
    /// Whether this error is the timeout of a `wait()` call
    ///
    /// Tests asserting that a request never arrived match on this.
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::WaitTimeout { .. })
    }
}
