//! Error handling for SmoothieHost
//!
//! Provides error types for every layer of the controller link:
//! - Connection errors (endpoint, transport, send queue)
//! - Stream errors (file streaming and SD-card upload)
//! - Protocol errors (malformed replies, used inside the classifier)
//!
//! All error types use `thiserror` for ergonomic error handling.

use thiserror::Error;

/// Connection error type
///
/// Represents errors related to the transport to the controller,
/// including serial port and network socket issues and the send queue.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConnectionError {
    /// A connection already exists
    #[error("Already connected")]
    AlreadyConnected,

    /// No connection is open
    #[error("Not connected")]
    NotConnected,

    /// Endpoint string could not be understood
    #[error("Invalid endpoint {endpoint}: {reason}")]
    InvalidEndpoint {
        /// The endpoint string as given.
        endpoint: String,
        /// Why it was rejected.
        reason: String,
    },

    /// Failed to open the transport
    #[error("Failed to open {endpoint}: {reason}")]
    FailedToOpen {
        /// The endpoint that failed to open.
        endpoint: String,
        /// The reason the open failed.
        reason: String,
    },

    /// Transport open did not complete in time
    #[error("Connection timeout after {timeout_ms}ms")]
    ConnectionTimeout {
        /// The timeout duration in milliseconds.
        timeout_ms: u64,
    },

    /// Connection lost
    #[error("Connection lost: {reason}")]
    ConnectionLost {
        /// The reason the connection was lost.
        reason: String,
    },

    /// Normal priority queue is at capacity
    #[error("Send queue full ({capacity} messages pending)")]
    QueueFull {
        /// Capacity of the normal priority queue.
        capacity: usize,
    },

    /// Send queue was closed by a disconnect
    #[error("Send queue closed")]
    QueueClosed,

    /// Serial port error
    #[error("Serial port error: {reason}")]
    SerialError {
        /// The reason for the serial port error.
        reason: String,
    },
}

/// Stream error type
///
/// Represents failures of a file stream or SD-card upload session.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StreamError {
    /// A stream session is already active
    #[error("A stream is already in progress")]
    AlreadyStreaming,

    /// No stream session is active
    #[error("No stream in progress")]
    NotStreaming,

    /// The controller did not acknowledge a line in time
    #[error("Timed out after {timeout_ms}ms waiting for ok at line {line}")]
    AckTimeout {
        /// The timeout duration in milliseconds.
        timeout_ms: u64,
        /// Last line number that was acknowledged.
        line: u64,
    },

    /// The source file could not be read
    #[error("File error on {path}: {reason}")]
    FileError {
        /// Path of the file.
        path: String,
        /// The underlying failure.
        reason: String,
    },

    /// The controller rejected an SD-card upload
    #[error("Upload rejected: {reason}")]
    UploadRejected {
        /// Reply line that rejected the upload.
        reason: String,
    },

    /// The session was aborted
    #[error("Stream aborted")]
    Aborted,
}

/// Protocol error type
///
/// Raised by the individual report parsers. The classifier catches these
/// and degrades the line to plain log text.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// A report did not have the expected number of fields
    #[error("Malformed {kind} report: expected at least {expected} fields, got {actual}")]
    FieldCount {
        /// Kind of report being parsed.
        kind: &'static str,
        /// Minimum number of fields.
        expected: usize,
        /// Number of fields found.
        actual: usize,
    },

    /// A numeric value could not be parsed
    #[error("Invalid number '{value}' in {kind} report")]
    InvalidNumber {
        /// Kind of report being parsed.
        kind: &'static str,
        /// The offending token.
        value: String,
    },

    /// A required field was absent
    #[error("Missing {field} in {kind} report")]
    MissingField {
        /// Kind of report being parsed.
        kind: &'static str,
        /// Name of the missing field.
        field: &'static str,
    },
}

/// Main error type for SmoothieHost
///
/// A unified error type that can represent any error from all layers.
/// This is the primary error type used in public APIs.
#[derive(Error, Debug)]
pub enum Error {
    /// Connection error
    #[error(transparent)]
    Connection(#[from] ConnectionError),

    /// Stream error
    #[error(transparent)]
    Stream(#[from] StreamError),

    /// Protocol error
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// Standard I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create an error from a string message
    pub fn other(msg: impl Into<String>) -> Self {
        Error::Other(msg.into())
    }

    /// Check if this is a timeout error
    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            Error::Stream(StreamError::AckTimeout { .. })
                | Error::Connection(ConnectionError::ConnectionTimeout { .. })
        )
    }

    /// Check if this is a connection error
    pub fn is_connection_error(&self) -> bool {
        matches!(self, Error::Connection(_))
    }

    /// Check if this is a stream error
    pub fn is_stream_error(&self) -> bool {
        matches!(self, Error::Stream(_))
    }
}

/// Result type using Error
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_predicates() {
        let err: Error = StreamError::AckTimeout {
            timeout_ms: 1000,
            line: 12,
        }
        .into();
        assert!(err.is_timeout());
        assert!(err.is_stream_error());
        assert!(!err.is_connection_error());

        let err: Error = ConnectionError::ConnectionTimeout { timeout_ms: 5000 }.into();
        assert!(err.is_timeout());
        assert!(err.is_connection_error());
    }

    #[test]
    fn test_display_messages() {
        let err = ConnectionError::InvalidEndpoint {
            endpoint: "usb:/x".to_string(),
            reason: "unknown scheme".to_string(),
        };
        assert_eq!(err.to_string(), "Invalid endpoint usb:/x: unknown scheme");
        assert_eq!(
            Error::from(StreamError::AlreadyStreaming).to_string(),
            "A stream is already in progress"
        );
    }
}
