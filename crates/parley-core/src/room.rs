//! Active room subscription.

use parley_proto::{OutboundFrame, RoomId};

use crate::time::Instant;

/// The room the client is currently subscribed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoomSubscription<I> {
    /// Subscribed room
    pub room_id: RoomId,
    /// When the subscription was created
    pub joined_at: I,
}

/// Tracks at most one active room and produces the control frames that move
/// the subscription.
///
/// Join is a re-assertion on the server side, so re-sending it for the same
/// room (after a reconnect, or a repeated join) is harmless.
#[derive(Debug, Clone)]
pub struct RoomMembership<I> {
    active: Option<RoomSubscription<I>>,
}

impl<I: Instant> Default for RoomMembership<I> {
    fn default() -> Self {
        Self::new()
    }
}

impl<I: Instant> RoomMembership<I> {
    /// No active room.
    pub fn new() -> Self {
        Self { active: None }
    }

    /// Currently active room.
    #[must_use]
    pub fn active_room(&self) -> Option<RoomId> {
        self.active.map(|sub| sub.room_id)
    }

    /// Full subscription record.
    #[must_use]
    pub fn subscription(&self) -> Option<RoomSubscription<I>> {
        self.active
    }

    /// Make `room_id` the active room.
    ///
    /// Returns `leave_conversation` for the previous room when it differs,
    /// followed by `join_conversation` for the new one.
    pub fn join(&mut self, room_id: RoomId, now: I) -> Vec<OutboundFrame> {
        let mut frames = Vec::with_capacity(2);

        match self.active {
            Some(current) if current.room_id == room_id => {
                frames.push(OutboundFrame::JoinConversation { room_id });
                return frames;
            },
            Some(current) => {
                frames.push(OutboundFrame::LeaveConversation { room_id: current.room_id });
            },
            None => {},
        }

        self.active = Some(RoomSubscription { room_id, joined_at: now });
        frames.push(OutboundFrame::JoinConversation { room_id });
        frames
    }

    /// Clear the active room, returning its `leave_conversation` frame.
    pub fn leave(&mut self) -> Option<OutboundFrame> {
        self.active.take().map(|sub| OutboundFrame::LeaveConversation { room_id: sub.room_id })
    }

    /// `join_conversation` for the remembered room, sent after a reconnect.
    #[must_use]
    pub fn rejoin(&self) -> Option<OutboundFrame> {
        self.active.map(|sub| OutboundFrame::JoinConversation { room_id: sub.room_id })
    }

    /// Drop the subscription without sending anything, if `room_id` is the
    /// active room. Returns whether it was.
    pub fn forget(&mut self, room_id: RoomId) -> bool {
        if self.active_room() == Some(room_id) {
            self.active = None;
            true
        } else {
            false
        }
    }

    /// Drop any subscription without sending anything.
    pub fn clear(&mut self) {
        self.active = None;
    }
}
