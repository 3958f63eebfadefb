//! Error types for the client runtime.

use parley_core::ConnectionError;
use parley_proto::ProtocolError;
use thiserror::Error;

/// Transport errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    /// The socket task is gone.
    #[error("transport closed")]
    Closed,

    /// Connecting failed.
    #[error("connection failed: {0}")]
    Connect(String),

    /// Reading or writing the socket failed.
    #[error("socket error: {0}")]
    Socket(String),
}

/// Errors from the HTTP chat collaborator.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ApiError {
    /// The request did not complete.
    #[error("request failed: {0}")]
    Request(String),

    /// The server answered with a non-success status.
    #[error("server returned {status}: {body}")]
    Status {
        /// HTTP status code
        status: u16,
        /// Response body, for diagnostics
        body: String,
    },

    /// No response within the request timeout.
    #[error("request timed out")]
    Timeout,

    /// The response body did not have the expected shape.
    #[error("invalid response: {0}")]
    Decode(String),
}

/// Errors returned through [`ClientHandle`](crate::ClientHandle).
#[derive(Debug, Error)]
pub enum ClientError {
    /// Rejected by the connection state machine.
    #[error(transparent)]
    Connection(#[from] ConnectionError),

    /// HTTP collaborator failed.
    #[error(transparent)]
    Api(#[from] ApiError),

    /// Payload could not be framed.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// Operation needs an active room.
    #[error("no active room")]
    NoActiveRoom,

    /// The runtime task has stopped.
    #[error("client runtime is not running")]
    RuntimeClosed,
}

impl ClientError {
    /// Returns true if this should be shown to the end user rather than only
    /// logged.
    pub fn is_user_visible(&self) -> bool {
        match self {
            Self::Connection(e) => e.is_user_visible(),
            Self::Api(_) | Self::NoActiveRoom | Self::RuntimeClosed => true,
            Self::Protocol(_) => false,
        }
    }
}
