//! Error types for the playback remote client.

use thiserror::Error;

/// Errors that can occur when using the remote client.
#[derive(Debug, Error)]
pub enum RemoteError {
    /// Failed to send an event through the transport session.
    #[error("transport send error: {0}")]
    TransportSend(String),

    /// Failed to receive an event from the transport session.
    #[error("transport receive error: {0}")]
    TransportReceive(String),

    /// The transport session was closed.
    #[error("transport session closed")]
    TransportClosed,

    /// The transport could not be constructed or configured.
    #[error("transport initialization failed: {0}")]
    Init(String),

    /// Failed to serialize or deserialize a wire frame.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The background connection task is not running (never started, or gone).
    #[error("connection task is not running")]
    NotRunning,

    /// The client was shut down and cannot be used again.
    #[error("client has been shut down")]
    ShutDown,

    /// An operation timed out.
    #[error("operation timed out")]
    Timeout,

    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A specialized [`Result`] type for remote client operations.
pub type Result<T> = std::result::Result<T, RemoteError>;

/// Reasons an inbound event payload could not be decoded.
///
/// A decode failure only ever drops the offending update; it never affects
/// the connection status.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// The event carried no argument where one was required.
    #[error("`{event}` is missing its argument")]
    MissingArgument {
        /// Event name.
        event: String,
    },

    /// The argument was present but of the wrong JSON type.
    #[error("`{event}` expected {expected}, got {found}")]
    WrongType {
        /// Event name.
        event: String,
        /// Human-readable expected type.
        expected: &'static str,
        /// The JSON value that was received.
        found: String,
    },

    /// The event name is not part of the playback protocol.
    #[error("unknown event `{0}`")]
    UnknownEvent(String),
}
