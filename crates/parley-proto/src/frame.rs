//! Client-to-server control frames.

use serde::Serialize;
use serde_json::Value;

use crate::{
    errors::{ProtocolError, Result},
    types::RoomId,
};

/// Frames the client sends over the persistent connection.
///
/// # Invariants
///
/// - Every encoded frame is a JSON object with a string `type` field. For
///   [`OutboundFrame::Custom`] this is checked at construction time.
#[derive(Debug, Clone, PartialEq)]
pub enum OutboundFrame {
    /// Subscribe to push events for a conversation.
    JoinConversation {
        /// Conversation to subscribe to.
        room_id: RoomId,
    },

    /// Drop the push subscription for a conversation.
    LeaveConversation {
        /// Conversation to unsubscribe from.
        room_id: RoomId,
    },

    /// Keep-alive probe. The server answers with `pong`.
    Ping,

    /// Caller-provided JSON object, sent verbatim.
    Custom(Value),
}

/// Serialized shape of the fixed control frames.
#[derive(Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ControlFrame {
    JoinConversation { conversation_id: RoomId },
    LeaveConversation { conversation_id: RoomId },
    Ping,
}

impl OutboundFrame {
    /// Wrap a caller payload.
    ///
    /// # Errors
    ///
    /// - `ProtocolError::NotAnObject` if `payload` is not a JSON object
    /// - `ProtocolError::MissingType` if it has no string `type` field
    pub fn custom(payload: Value) -> Result<Self> {
        let object = payload.as_object().ok_or(ProtocolError::NotAnObject)?;
        if !object.get("type").is_some_and(Value::is_string) {
            return Err(ProtocolError::MissingType);
        }
        Ok(Self::Custom(payload))
    }

    /// Value of the `type` field this frame is sent with.
    pub fn type_tag(&self) -> &str {
        match self {
            Self::JoinConversation { .. } => "join_conversation",
            Self::LeaveConversation { .. } => "leave_conversation",
            Self::Ping => "ping",
            Self::Custom(value) => value.get("type").and_then(Value::as_str).unwrap_or("custom"),
        }
    }

    /// Room this frame targets, if any.
    pub fn room_id(&self) -> Option<RoomId> {
        match self {
            Self::JoinConversation { room_id } | Self::LeaveConversation { room_id } => {
                Some(*room_id)
            },
            Self::Ping | Self::Custom(_) => None,
        }
    }

    /// Encode as JSON text ready for a WebSocket text message.
    ///
    /// # Errors
    ///
    /// - `ProtocolError::Encode` if serialization fails
    pub fn encode(&self) -> Result<String> {
        let encoded = match self {
            Self::JoinConversation { room_id } => {
                serde_json::to_string(&ControlFrame::JoinConversation { conversation_id: *room_id })
            },
            Self::LeaveConversation { room_id } => serde_json::to_string(
                &ControlFrame::LeaveConversation { conversation_id: *room_id },
            ),
            Self::Ping => serde_json::to_string(&ControlFrame::Ping),
            Self::Custom(value) => serde_json::to_string(value),
        };
        encoded.map_err(|e| ProtocolError::Encode(e.to_string()))
    }
}
