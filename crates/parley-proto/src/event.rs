//! Server push events.
//!
//! Decoding is two-step: the frame is parsed as a generic JSON object to read
//! the `type` tag, then the body is deserialized into the shape that tag
//! promises. An unrecognized tag is not an error; the raw object is kept as
//! [`InboundEvent::Unknown`] so subscribers can still see it.

use serde::{Deserialize, de::DeserializeOwned};
use serde_json::Value;

use crate::{
    errors::{ProtocolError, Result},
    types::{Conversation, Message, RoomId, UserId, UserRef},
};

/// Typed event decoded from one inbound frame.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundEvent {
    /// A message was posted (`new_message`).
    NewMessage(Message),

    /// A user came online or went offline (`user_online` / `user_offline`).
    UserPresenceChanged {
        /// User whose presence changed.
        user_id: UserId,
        /// New presence.
        online: bool,
    },

    /// Conversation metadata changed (`conversation_updated`).
    ConversationUpdated(Conversation),

    /// A member was added to a conversation (`member_added`).
    MemberAdded {
        /// Conversation the member joined.
        room_id: RoomId,
        /// The new member.
        user: UserRef,
        /// Who added them.
        added_by: UserRef,
    },

    /// A member was removed from a conversation (`member_kicked`).
    MemberRemoved {
        /// Conversation the member left.
        room_id: RoomId,
        /// The removed member.
        user: UserRef,
        /// Who removed them.
        removed_by: UserRef,
    },

    /// This client was removed from a conversation
    /// (`kicked_from_conversation`).
    KickedFromRoom {
        /// Conversation the client was removed from.
        room_id: RoomId,
        /// Human-readable notice from the server.
        reason: String,
    },

    /// Reply to a keep-alive probe (`pong`).
    KeepAliveAck,

    /// Any other `type`.
    Unknown {
        /// The unrecognized `type` value.
        event_type: String,
        /// The whole frame object.
        payload: Value,
    },
}

#[derive(Deserialize)]
struct NewMessageBody {
    message: Message,
}

#[derive(Deserialize)]
struct PresenceBody {
    user_id: UserId,
}

#[derive(Deserialize)]
struct ConversationBody {
    conversation: Conversation,
}

#[derive(Deserialize)]
struct MemberAddedBody {
    conversation_id: RoomId,
    new_user: UserRef,
    added_by: UserRef,
}

#[derive(Deserialize)]
struct MemberKickedBody {
    conversation_id: RoomId,
    kicked_user: UserRef,
    kicked_by: UserRef,
}

#[derive(Deserialize)]
struct KickedBody {
    conversation_id: RoomId,
    #[serde(default)]
    message: String,
}

impl InboundEvent {
    /// Decode one frame of JSON text.
    ///
    /// # Errors
    ///
    /// - `ProtocolError::MalformedJson` if the text is not JSON
    /// - `ProtocolError::NotAnObject` if the top level is not an object
    /// - `ProtocolError::MissingType` if there is no string `type`
    /// - `ProtocolError::InvalidPayload` if a known type has the wrong shape
    pub fn decode(text: &str) -> Result<Self> {
        let value: Value =
            serde_json::from_str(text).map_err(|e| ProtocolError::MalformedJson(e.to_string()))?;
        Self::from_value(value)
    }

    /// Decode an already-parsed JSON value.
    ///
    /// # Errors
    ///
    /// Same as [`InboundEvent::decode`], minus `MalformedJson`.
    pub fn from_value(value: Value) -> Result<Self> {
        let event_type = value
            .as_object()
            .ok_or(ProtocolError::NotAnObject)?
            .get("type")
            .and_then(Value::as_str)
            .ok_or(ProtocolError::MissingType)?
            .to_owned();

        let event = match event_type.as_str() {
            "new_message" => {
                let body: NewMessageBody = body(&event_type, value)?;
                Self::NewMessage(body.message)
            },
            "user_online" | "user_offline" => {
                let online = event_type == "user_online";
                let body: PresenceBody = body(&event_type, value)?;
                Self::UserPresenceChanged { user_id: body.user_id, online }
            },
            "conversation_updated" => {
                let body: ConversationBody = body(&event_type, value)?;
                Self::ConversationUpdated(body.conversation)
            },
            "member_added" => {
                let body: MemberAddedBody = body(&event_type, value)?;
                Self::MemberAdded {
                    room_id: body.conversation_id,
                    user: body.new_user,
                    added_by: body.added_by,
                }
            },
            "member_kicked" => {
                let body: MemberKickedBody = body(&event_type, value)?;
                Self::MemberRemoved {
                    room_id: body.conversation_id,
                    user: body.kicked_user,
                    removed_by: body.kicked_by,
                }
            },
            "kicked_from_conversation" => {
                let body: KickedBody = body(&event_type, value)?;
                Self::KickedFromRoom { room_id: body.conversation_id, reason: body.message }
            },
            "pong" => Self::KeepAliveAck,
            _ => Self::Unknown { event_type, payload: value },
        };

        Ok(event)
    }

    /// Wire `type` tag of this event.
    pub fn type_tag(&self) -> &str {
        match self {
            Self::NewMessage(_) => "new_message",
            Self::UserPresenceChanged { online: true, .. } => "user_online",
            Self::UserPresenceChanged { online: false, .. } => "user_offline",
            Self::ConversationUpdated(_) => "conversation_updated",
            Self::MemberAdded { .. } => "member_added",
            Self::MemberRemoved { .. } => "member_kicked",
            Self::KickedFromRoom { .. } => "kicked_from_conversation",
            Self::KeepAliveAck => "pong",
            Self::Unknown { event_type, .. } => event_type,
        }
    }

    /// Conversation this event concerns, if it names one.
    pub fn room_id(&self) -> Option<RoomId> {
        match self {
            Self::NewMessage(message) => Some(message.room_id),
            Self::ConversationUpdated(conversation) => Some(conversation.id),
            Self::MemberAdded { room_id, .. }
            | Self::MemberRemoved { room_id, .. }
            | Self::KickedFromRoom { room_id, .. } => Some(*room_id),
            Self::UserPresenceChanged { .. } | Self::KeepAliveAck | Self::Unknown { .. } => None,
        }
    }
}

fn body<T: DeserializeOwned>(event_type: &str, value: Value) -> Result<T> {
    serde_json::from_value(value).map_err(|e| ProtocolError::InvalidPayload {
        event_type: event_type.to_owned(),
        reason: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_new_message() {
        let event = InboundEvent::decode(
            r#"{"type":"new_message","message":{"id":3,"conversation_id":7,"sender_id":1,
                "sender_username":"ana","content":"hello","created_at":"2024-05-01T10:00:00"}}"#,
        )
        .unwrap();

        let InboundEvent::NewMessage(message) = event else {
            panic!("expected NewMessage, got {event:?}");
        };
        assert_eq!(message.id, 3);
        assert_eq!(message.room_id, 7);
        assert_eq!(message.content, "hello");
    }

    #[test]
    fn decode_presence_both_directions() {
        let online = InboundEvent::decode(r#"{"type":"user_online","user_id":5}"#).unwrap();
        let offline = InboundEvent::decode(r#"{"type":"user_offline","user_id":5}"#).unwrap();

        assert_eq!(online, InboundEvent::UserPresenceChanged { user_id: 5, online: true });
        assert_eq!(offline, InboundEvent::UserPresenceChanged { user_id: 5, online: false });
        assert_eq!(online.type_tag(), "user_online");
        assert_eq!(offline.type_tag(), "user_offline");
    }

    #[test]
    fn decode_membership_events() {
        let added = InboundEvent::decode(
            r#"{"type":"member_added","conversation_id":4,
                "new_user":{"id":8,"username":"bo"},"added_by":{"id":1,"username":"ana"}}"#,
        )
        .unwrap();
        assert!(matches!(added, InboundEvent::MemberAdded { room_id: 4, ref user, .. } if user.id == 8));

        let kicked = InboundEvent::decode(
            r#"{"type":"member_kicked","conversation_id":4,
                "kicked_user":{"id":8,"username":"bo"},"kicked_by":{"id":1,"username":"ana"}}"#,
        )
        .unwrap();
        assert!(matches!(kicked, InboundEvent::MemberRemoved { room_id: 4, ref removed_by, .. } if removed_by.id == 1));
    }

    #[test]
    fn decode_kicked_from_room() {
        let event = InboundEvent::decode(
            r#"{"type":"kicked_from_conversation","conversation_id":9,"message":"removed by ana"}"#,
        )
        .unwrap();
        assert_eq!(
            event,
            InboundEvent::KickedFromRoom { room_id: 9, reason: "removed by ana".to_string() }
        );
        assert_eq!(event.room_id(), Some(9));
    }

    #[test]
    fn decode_conversation_update_without_members() {
        let event = InboundEvent::decode(
            r#"{"type":"conversation_updated","conversation":{"id":2,"name":"team","type":"group"}}"#,
        )
        .unwrap();
        let InboundEvent::ConversationUpdated(conversation) = event else {
            panic!("expected ConversationUpdated");
        };
        assert_eq!(conversation.name.as_deref(), Some("team"));
        assert!(conversation.is_group());
    }

    #[test]
    fn pong_is_keepalive_ack() {
        assert_eq!(InboundEvent::decode(r#"{"type":"pong"}"#).unwrap(), InboundEvent::KeepAliveAck);
    }

    #[test]
    fn unknown_type_passes_through() {
        let event = InboundEvent::decode(r#"{"type":"echo","data":{"x":1}}"#).unwrap();
        match event {
            InboundEvent::Unknown { ref event_type, ref payload } => {
                assert_eq!(event_type, "echo");
                assert_eq!(payload["data"]["x"], 1);
            },
            other => panic!("expected Unknown, got {other:?}"),
        }
        assert_eq!(event.type_tag(), "echo");
    }

    #[test]
    fn malformed_frames_are_errors() {
        assert!(matches!(InboundEvent::decode("{not json"), Err(ProtocolError::MalformedJson(_))));
        assert_eq!(InboundEvent::decode("[1,2]"), Err(ProtocolError::NotAnObject));
        assert_eq!(InboundEvent::decode(r#"{"user_id":1}"#), Err(ProtocolError::MissingType));
        assert_eq!(InboundEvent::decode(r#"{"type":7}"#), Err(ProtocolError::MissingType));
    }

    #[test]
    fn known_type_with_wrong_body_is_invalid_payload() {
        let err = InboundEvent::decode(r#"{"type":"new_message","message":"oops"}"#).unwrap_err();
        assert!(matches!(err, ProtocolError::InvalidPayload { ref event_type, .. } if event_type == "new_message"));
    }
}
