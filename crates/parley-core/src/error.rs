//! Error types for the client core.
//!
//! Connection errors are returned to the caller of an operation; they never
//! tear down the connection. Handler errors are produced by subscribers and
//! only ever logged by the router.

use thiserror::Error;

use crate::connection::ConnectionState;

/// Errors returned by [`ConnectionManager`](crate::ConnectionManager)
/// operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConnectionError {
    /// Operation is not valid from the current state
    #[error("invalid state transition: cannot {operation} from {state:?}")]
    InvalidState {
        /// Current state when error occurred
        state: ConnectionState,
        /// Operation that was attempted
        operation: &'static str,
    },

    /// Operation needs an open connection
    #[error("not connected: {operation} rejected in state {state:?}")]
    NotConnected {
        /// Current state when error occurred
        state: ConnectionState,
        /// Operation that was attempted
        operation: &'static str,
    },

    /// Credential was empty
    #[error("credential must not be empty")]
    EmptyCredential,
}

impl ConnectionError {
    /// Returns true if retrying after the connection comes back may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::NotConnected { state, .. } => {
                matches!(state, ConnectionState::Connecting | ConnectionState::Reconnecting)
            },
            Self::InvalidState { .. } | Self::EmptyCredential => false,
        }
    }

    /// Returns true if this should be shown to the end user rather than only
    /// logged.
    pub fn is_user_visible(&self) -> bool {
        matches!(self, Self::NotConnected { .. } | Self::EmptyCredential)
    }
}

/// Failure reported by an event subscriber.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("handler failed: {0}")]
pub struct HandlerError(pub String);

impl HandlerError {
    /// Build from any displayable reason.
    pub fn new(reason: impl Into<String>) -> Self {
        Self(reason.into())
    }
}
