//! Out-of-band chat collaborator: history, sends, room lists, member lists.

use async_trait::async_trait;
use parley_proto::{Conversation, Member, Message, RoomId};

use crate::error::ApiError;

/// Request/response operations that do not travel over the push connection.
#[async_trait]
pub trait ChatApi: Send + Sync + 'static {
    /// Page of `room_id` messages, oldest first. `skip` counts back from the
    /// newest message.
    async fn fetch_messages(
        &self,
        room_id: RoomId,
        skip: usize,
        limit: usize,
    ) -> Result<Vec<Message>, ApiError>;

    /// Post a message. Returns the server's copy with its final id and
    /// timestamp.
    async fn send_message(&self, room_id: RoomId, content: String) -> Result<Message, ApiError>;

    /// Every conversation the user belongs to.
    async fn fetch_conversations(&self) -> Result<Vec<Conversation>, ApiError>;

    /// Members of `room_id` with their roles.
    async fn fetch_members(&self, room_id: RoomId) -> Result<Vec<Member>, ApiError>;
}
