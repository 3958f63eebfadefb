//! Payload value types.
//!
//! Field names follow the server's JSON. Where the Rust name differs (a
//! conversation is a "room" on this side of the wire) the serde attribute
//! carries the wire name.

use serde::{Deserialize, Serialize};

/// Server-assigned conversation identifier.
pub type RoomId = u64;

/// Server-assigned message identifier.
pub type MessageId = u64;

/// Server-assigned user identifier.
pub type UserId = u64;

/// A chat message.
///
/// Identity is by `id` alone: two values with the same id are the same logical
/// message whether they arrived by push or by history fetch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Unique, server-assigned id.
    pub id: MessageId,

    /// Conversation the message belongs to.
    #[serde(rename = "conversation_id")]
    pub room_id: RoomId,

    /// Author.
    pub sender_id: UserId,

    /// Author's display name, when the server includes it.
    #[serde(rename = "sender_username", default, skip_serializing_if = "Option::is_none")]
    pub sender_display_name: Option<String>,

    /// Message text.
    pub content: String,

    /// Server timestamp (ISO 8601, passed through verbatim).
    pub created_at: String,
}

/// Conversation metadata as returned by the conversation list and pushed in
/// `conversation_updated` events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conversation {
    /// Conversation id.
    pub id: RoomId,

    /// Display name. Direct conversations usually have none.
    #[serde(default)]
    pub name: Option<String>,

    /// `"direct"` or `"group"`.
    #[serde(rename = "type", default = "Conversation::default_kind")]
    pub kind: String,

    /// Current member ids.
    #[serde(default)]
    pub member_ids: Vec<UserId>,
}

impl Conversation {
    fn default_kind() -> String {
        "direct".to_string()
    }

    /// True for multi-member group conversations.
    pub fn is_group(&self) -> bool {
        self.kind == "group"
    }
}

/// Member entry from the conversation-membership endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Member {
    /// User id.
    pub id: UserId,

    /// Login name.
    #[serde(default)]
    pub username: Option<String>,

    /// Membership role (`"admin"` or `"member"`).
    #[serde(default)]
    pub role: Option<String>,

    /// Conversation owner.
    #[serde(default)]
    pub is_owner: bool,
}

impl Member {
    /// Whether this member may moderate the conversation.
    pub fn is_admin(&self) -> bool {
        self.is_owner || self.role.as_deref() == Some("admin")
    }
}

/// Compact user reference embedded in membership events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRef {
    /// User id.
    pub id: UserId,

    /// Login name.
    #[serde(default)]
    pub username: Option<String>,
}

impl UserRef {
    /// Name for diagnostics, falling back to the numeric id.
    pub fn label(&self) -> String {
        self.username.clone().unwrap_or_else(|| format!("user {}", self.id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_uses_wire_field_names() {
        let json = r#"{
            "id": 3,
            "conversation_id": 7,
            "sender_id": 11,
            "sender_username": "ana",
            "content": "hi",
            "created_at": "2024-05-01T10:00:00"
        }"#;

        let message: Message = serde_json::from_str(json).unwrap();
        assert_eq!(message.room_id, 7);
        assert_eq!(message.sender_display_name.as_deref(), Some("ana"));
    }

    #[test]
    fn message_without_username_decodes() {
        let json = r#"{"id":1,"conversation_id":2,"sender_id":3,"content":"x","created_at":"t"}"#;
        let message: Message = serde_json::from_str(json).unwrap();
        assert_eq!(message.sender_display_name, None);
    }

    #[test]
    fn conversation_defaults() {
        let conversation: Conversation = serde_json::from_str(r#"{"id":4}"#).unwrap();
        assert_eq!(conversation.kind, "direct");
        assert!(!conversation.is_group());
        assert!(conversation.member_ids.is_empty());
    }

    #[test]
    fn user_ref_label_falls_back_to_id() {
        let user = UserRef { id: 9, username: None };
        assert_eq!(user.label(), "user 9");
    }
}
