//! Protocol error types.

use thiserror::Error;

/// Result alias for protocol operations.
pub type Result<T> = std::result::Result<T, ProtocolError>;

/// Errors produced while encoding or decoding frames.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// Frame text is not valid JSON.
    #[error("malformed JSON: {0}")]
    MalformedJson(String),

    /// Frame is valid JSON but not an object.
    #[error("frame is not a JSON object")]
    NotAnObject,

    /// Frame object has no string `type` field.
    #[error("frame has no `type` discriminator")]
    MissingType,

    /// Known event type whose body does not match the expected shape.
    #[error("invalid `{event_type}` payload: {reason}")]
    InvalidPayload {
        /// Event type from the `type` field.
        event_type: String,
        /// Deserializer diagnostic.
        reason: String,
    },

    /// Outbound frame could not be serialized.
    #[error("encode failed: {0}")]
    Encode(String),
}
