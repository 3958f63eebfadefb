//! Reconciliation of pushed messages against fetched history.
//!
//! The visible message list of the active room is fed from two directions:
//! history pages fetched out of band, and `new_message` pushes. This module
//! merges both into one list in which every message id appears exactly once.
//!
//! # Ordering
//!
//! - History pages render in the order fetched (oldest first).
//! - Live messages render in arrival order, after the initial page.
//! - Live messages arriving while the initial page is in flight are held back
//!   and appended right after it.
//! - Older pages are prepended.
//!
//! # Stale fetches
//!
//! Every fetch is tagged with a [`HistoryToken`]. A result whose token is not
//! the one currently awaited (the user switched rooms, or selected the same
//! room again) is discarded without touching state.
//!
//! Sends are never rendered locally. The server-confirmed message from a send
//! only refreshes the room preview; the body appears once, when its push
//! arrives.

use std::collections::{HashMap, HashSet};

use parley_proto::{Conversation, InboundEvent, Message, MessageId, RoomId};
use tracing::debug;

/// Messages per history page.
pub const DEFAULT_PAGE_SIZE: usize = 50;

/// Reconciler configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconcilerConfig {
    /// `limit` used for every history fetch
    pub page_size: usize,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self { page_size: DEFAULT_PAGE_SIZE }
    }
}

/// Identifies one outstanding history fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HistoryToken(u64);

/// A history fetch the driver should perform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HistoryRequest {
    /// Pass back to [`StateReconciler::apply_history`]
    pub token: HistoryToken,
    /// Room to fetch
    pub room_id: RoomId,
    /// Messages to skip, counting back from the newest
    pub skip: usize,
    /// Page size
    pub limit: usize,
}

/// Summary line for one room in the room list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomPreview {
    /// Room id
    pub room_id: RoomId,
    /// Display name, if the room has one
    pub name: Option<String>,
    /// Text of the most recent message seen
    pub last_message: Option<String>,
    /// Timestamp of the most recent message seen
    pub last_activity: Option<String>,
}

/// Change to visible state, for the UI to apply.
#[derive(Debug, Clone, PartialEq)]
pub enum ViewUpdate {
    /// Initial page for the active room. Replaces the visible list.
    HistoryLoaded {
        /// Room the page belongs to
        room_id: RoomId,
        /// Messages, oldest first
        messages: Vec<Message>,
    },

    /// Older page. Goes before everything visible.
    OlderLoaded {
        /// Room the page belongs to
        room_id: RoomId,
        /// Messages not already visible, oldest first
        messages: Vec<Message>,
    },

    /// Live message for the active room. Goes after everything visible.
    MessageAppended(Message),

    /// A room's preview changed and it moved to the front of the list.
    PreviewUpdated(RoomPreview),

    /// Room list replaced from a fresh fetch, most recent first.
    RoomsReset(Vec<RoomPreview>),

    /// A room left the room list.
    RoomRemoved {
        /// Removed room
        room_id: RoomId,
    },

    /// The active room is no longer viewable; clear the message pane.
    RoomCleared {
        /// Room that was active
        room_id: RoomId,
        /// Notice for the user
        reason: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FetchKind {
    Initial,
    Older,
}

#[derive(Debug, Clone, Copy)]
struct PendingFetch {
    token: HistoryToken,
    kind: FetchKind,
    limit: usize,
}

/// Visible state of the active room plus room previews.
///
/// # Invariants
///
/// - Every id in the visible list is in the seen set, and appears once.
/// - The seen set only holds ids of the active room; it is cleared whenever
///   the active room changes.
/// - At most one fetch is awaited at a time.
#[derive(Debug, Clone, Default)]
pub struct StateReconciler {
    config: ReconcilerConfig,
    active: Option<RoomId>,
    seen: HashSet<MessageId>,
    visible: Vec<Message>,
    pending: Option<PendingFetch>,
    held: Vec<Message>,
    exhausted: bool,
    next_token: u64,
    previews: HashMap<RoomId, RoomPreview>,
    order: Vec<RoomId>,
}

impl StateReconciler {
    /// Empty reconciler with no active room.
    pub fn new(config: ReconcilerConfig) -> Self {
        Self { config, ..Self::default() }
    }

    /// Room currently displayed.
    #[must_use]
    pub fn active_room(&self) -> Option<RoomId> {
        self.active
    }

    /// Visible messages of the active room, in display order.
    #[must_use]
    pub fn visible(&self) -> &[Message] {
        &self.visible
    }

    /// Whether `id` has been applied to the active room.
    #[must_use]
    pub fn has_seen(&self, id: MessageId) -> bool {
        self.seen.contains(&id)
    }

    /// Whether a history fetch is awaited.
    #[must_use]
    pub fn is_fetch_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Whether the last page came back short, meaning there is nothing older.
    #[must_use]
    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }

    /// Preview for one room.
    #[must_use]
    pub fn preview(&self, room_id: RoomId) -> Option<&RoomPreview> {
        self.previews.get(&room_id)
    }

    /// Room previews, most recent first.
    pub fn previews(&self) -> impl Iterator<Item = &RoomPreview> + '_ {
        self.order.iter().filter_map(|id| self.previews.get(id))
    }

    /// Display `room_id`: clear the visible list and ask for its first page.
    ///
    /// Selecting the room that is already active starts over the same way,
    /// and invalidates any fetch still in flight.
    pub fn select_room(&mut self, room_id: RoomId) -> HistoryRequest {
        self.active = Some(room_id);
        self.seen.clear();
        self.visible.clear();
        self.held.clear();
        self.exhausted = false;

        self.request(room_id, FetchKind::Initial, 0)
    }

    /// Stop displaying any room.
    pub fn clear_room(&mut self) {
        self.active = None;
        self.seen.clear();
        self.visible.clear();
        self.held.clear();
        self.pending = None;
        self.exhausted = false;
    }

    /// Ask for the page before everything visible.
    ///
    /// Returns `None` without an active room, while another fetch is in
    /// flight, or once history is exhausted.
    pub fn load_older(&mut self) -> Option<HistoryRequest> {
        let room_id = self.active?;
        if self.pending.is_some() || self.exhausted {
            return None;
        }
        let skip = self.visible.len();
        Some(self.request(room_id, FetchKind::Older, skip))
    }

    /// Apply a fetched page.
    ///
    /// Pages whose token is not the awaited one are stale and discarded.
    pub fn apply_history(&mut self, token: HistoryToken, messages: Vec<Message>) -> Vec<ViewUpdate> {
        let Some(fetch) = self.take_pending(token) else {
            return Vec::new();
        };
        let Some(room_id) = self.active else {
            return Vec::new();
        };

        self.exhausted = messages.len() < fetch.limit;

        let fresh: Vec<Message> = messages
            .into_iter()
            .filter(|m| m.room_id == room_id && self.seen.insert(m.id))
            .collect();

        match fetch.kind {
            FetchKind::Initial => {
                self.visible.clone_from(&fresh);
                let mut updates = vec![ViewUpdate::HistoryLoaded { room_id, messages: fresh }];
                for message in std::mem::take(&mut self.held) {
                    if self.seen.insert(message.id) {
                        self.visible.push(message.clone());
                        updates.push(ViewUpdate::MessageAppended(message));
                    }
                }
                updates
            },
            FetchKind::Older => {
                if fresh.is_empty() {
                    return Vec::new();
                }
                self.visible.splice(0..0, fresh.iter().cloned());
                vec![ViewUpdate::OlderLoaded { room_id, messages: fresh }]
            },
        }
    }

    /// A fetch failed. Releases held live messages so they are not lost.
    pub fn history_failed(&mut self, token: HistoryToken) -> Vec<ViewUpdate> {
        let Some(fetch) = self.take_pending(token) else {
            return Vec::new();
        };
        if fetch.kind == FetchKind::Older {
            return Vec::new();
        }

        std::mem::take(&mut self.held)
            .into_iter()
            .filter(|m| self.seen.insert(m.id))
            .inspect(|m| self.visible.push(m.clone()))
            .map(ViewUpdate::MessageAppended)
            .collect()
    }

    /// Apply a routed event.
    pub fn apply(&mut self, event: &InboundEvent) -> Vec<ViewUpdate> {
        match event {
            InboundEvent::NewMessage(message) => self.apply_new_message(message),
            InboundEvent::ConversationUpdated(conversation) => {
                let preview = self.preview_entry(conversation.id);
                preview.name.clone_from(&conversation.name);
                vec![ViewUpdate::PreviewUpdated(preview.clone())]
            },
            InboundEvent::KickedFromRoom { room_id, reason } => {
                let mut updates = Vec::new();
                if self.previews.remove(room_id).is_some() {
                    self.order.retain(|id| id != room_id);
                    updates.push(ViewUpdate::RoomRemoved { room_id: *room_id });
                }
                if self.active == Some(*room_id) {
                    self.clear_room();
                    updates
                        .push(ViewUpdate::RoomCleared { room_id: *room_id, reason: reason.clone() });
                }
                updates
            },
            _ => Vec::new(),
        }
    }

    /// A locally sent message was confirmed by the server. Updates the preview
    /// only; the message renders when its push arrives.
    pub fn confirm_sent(&mut self, message: &Message) -> Vec<ViewUpdate> {
        vec![self.touch_preview(message)]
    }

    /// Replace the room list with a fresh fetch, keeping known last-message
    /// data.
    pub fn seed_rooms(&mut self, conversations: Vec<Conversation>) -> Vec<ViewUpdate> {
        let mut previews = HashMap::with_capacity(conversations.len());
        let mut order = Vec::with_capacity(conversations.len());

        for conversation in conversations {
            let mut preview = self.previews.remove(&conversation.id).unwrap_or_else(|| {
                RoomPreview {
                    room_id: conversation.id,
                    name: None,
                    last_message: None,
                    last_activity: None,
                }
            });
            preview.name = conversation.name;
            if previews.insert(conversation.id, preview).is_none() {
                order.push(conversation.id);
            }
        }

        self.previews = previews;
        self.order = order;
        vec![ViewUpdate::RoomsReset(self.previews().cloned().collect())]
    }

    fn apply_new_message(&mut self, message: &Message) -> Vec<ViewUpdate> {
        let mut updates = Vec::with_capacity(2);

        if self.active == Some(message.room_id) {
            if self.seen.contains(&message.id) || self.held.iter().any(|m| m.id == message.id) {
                debug!(message_id = message.id, "dropping duplicate message");
            } else if matches!(self.pending, Some(PendingFetch { kind: FetchKind::Initial, .. })) {
                self.held.push(message.clone());
            } else {
                self.seen.insert(message.id);
                self.visible.push(message.clone());
                updates.push(ViewUpdate::MessageAppended(message.clone()));
            }
        }

        updates.push(self.touch_preview(message));
        updates
    }

    fn touch_preview(&mut self, message: &Message) -> ViewUpdate {
        let preview = self.preview_entry(message.room_id);
        preview.last_message = Some(message.content.clone());
        preview.last_activity = Some(message.created_at.clone());
        let preview = preview.clone();

        self.order.retain(|id| *id != message.room_id);
        self.order.insert(0, message.room_id);

        ViewUpdate::PreviewUpdated(preview)
    }

    fn preview_entry(&mut self, room_id: RoomId) -> &mut RoomPreview {
        if !self.previews.contains_key(&room_id) {
            self.order.push(room_id);
        }
        self.previews.entry(room_id).or_insert_with(|| RoomPreview {
            room_id,
            name: None,
            last_message: None,
            last_activity: None,
        })
    }

    fn request(&mut self, room_id: RoomId, kind: FetchKind, skip: usize) -> HistoryRequest {
        let token = HistoryToken(self.next_token);
        self.next_token += 1;

        let limit = self.config.page_size;
        self.pending = Some(PendingFetch { token, kind, limit });

        HistoryRequest { token, room_id, skip, limit }
    }

    fn take_pending(&mut self, token: HistoryToken) -> Option<PendingFetch> {
        match self.pending {
            Some(fetch) if fetch.token == token => self.pending.take(),
            _ => {
                debug!(?token, "discarding stale history fetch");
                None
            },
        }
    }
}
