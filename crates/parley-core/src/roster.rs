//! Per-room member lists and moderation rights.
//!
//! Seeded from the membership endpoint and kept current by `member_added` /
//! `member_kicked` pushes. Admin checks answer from this data only; a room
//! whose member list was never loaded grants nobody admin rights.

use std::collections::HashMap;

use parley_proto::{InboundEvent, Member, RoomId, UserId};

/// Member lists keyed by room.
#[derive(Debug, Clone, Default)]
pub struct Roster {
    rooms: HashMap<RoomId, Vec<Member>>,
}

impl Roster {
    /// Empty roster.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the member list of `room_id` with a freshly fetched one.
    pub fn set_members(&mut self, room_id: RoomId, members: Vec<Member>) {
        self.rooms.insert(room_id, members);
    }

    /// Members of `room_id`, if loaded.
    #[must_use]
    pub fn members(&self, room_id: RoomId) -> Option<&[Member]> {
        self.rooms.get(&room_id).map(Vec::as_slice)
    }

    /// Whether `user_id` may moderate `room_id`.
    #[must_use]
    pub fn is_admin(&self, room_id: RoomId, user_id: UserId) -> bool {
        self.rooms
            .get(&room_id)
            .and_then(|members| members.iter().find(|m| m.id == user_id))
            .is_some_and(Member::is_admin)
    }

    /// Apply a membership push. Returns true if the roster changed.
    ///
    /// Events for rooms whose list was never loaded are ignored; the next
    /// fetch will include them.
    pub fn apply(&mut self, event: &InboundEvent) -> bool {
        match event {
            InboundEvent::MemberAdded { room_id, user, .. } => {
                let Some(members) = self.rooms.get_mut(room_id) else {
                    return false;
                };
                if members.iter().any(|m| m.id == user.id) {
                    return false;
                }
                members.push(Member {
                    id: user.id,
                    username: user.username.clone(),
                    role: Some("member".to_string()),
                    is_owner: false,
                });
                true
            },
            InboundEvent::MemberRemoved { room_id, user, .. } => {
                let Some(members) = self.rooms.get_mut(room_id) else {
                    return false;
                };
                let before = members.len();
                members.retain(|m| m.id != user.id);
                members.len() != before
            },
            InboundEvent::KickedFromRoom { room_id, .. } => self.rooms.remove(room_id).is_some(),
            _ => false,
        }
    }
}
