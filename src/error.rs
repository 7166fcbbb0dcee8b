//! Error types for simftp.

use thiserror::Error;

use crate::ftp::HandshakeStep;

/// Main error type for all simftp operations.
///
/// Every variant that can happen mid-download carries the file offset it
/// happened at, so the caller can report where the session aborted.
#[derive(Debug, Error)]
pub enum SimftpError {
    /// I/O error on the transport or a sink.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error while loading a configuration file.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The serial port could not be opened or configured.
    #[error("unable to open serial port {port}: {source}")]
    TransportOpen {
        port: String,
        #[source]
        source: tokio_serial::Error,
    },

    /// A command could not be fully written to the transport.
    #[error("failed to send {command}: {source}")]
    CommandWrite {
        command: String,
        #[source]
        source: std::io::Error,
    },

    /// The device did not confirm a handshake step in time.
    #[error("{step} timed out waiting for the modem")]
    HandshakeTimeout { step: HandshakeStep },

    /// The device answered a chunk request with `ERROR`.
    #[error("modem reported ERROR at offset {offset}")]
    ServerError { offset: u64 },

    /// Code 14 was returned too many times for one offset.
    #[error("exceeded {attempts} retries at offset {offset}")]
    RetryBudgetExhausted { offset: u64, attempts: u32 },

    /// A declared binary frame did not arrive completely in time.
    #[error("timed out draining {expected}-byte frame at offset {offset}")]
    FrameTimeout { offset: u64, expected: usize },

    /// No status line arrived for a chunk request in time.
    #[error("no status line for chunk at offset {offset}")]
    StatusTimeout { offset: u64 },

    /// The device sent something the protocol does not allow.
    #[error("protocol violation: {0}")]
    ProtocolViolation(String),

    /// The sink refused a write.
    #[error("sink rejected data at offset {offset}: {source}")]
    Sink {
        offset: u64,
        #[source]
        source: std::io::Error,
    },

    /// A caller-supplied value cannot be sent to the modem.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The background reader task panicked or was aborted.
    #[error("reader task failed: {0}")]
    ReaderTask(String),
}

/// Result type alias using SimftpError.
pub type Result<T> = std::result::Result<T, SimftpError>;
