//! Online-user tracking from presence events.

use std::collections::HashSet;

use parley_proto::UserId;

/// Set of users last reported online.
///
/// Presence is only as fresh as the events received on this connection; it is
/// cleared on disconnect because updates missed while offline cannot be
/// recovered.
#[derive(Debug, Clone, Default)]
pub struct PresenceBook {
    online: HashSet<UserId>,
}

impl PresenceBook {
    /// Empty book.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a presence change. Returns true if the stored value changed.
    pub fn set(&mut self, user_id: UserId, online: bool) -> bool {
        if online { self.online.insert(user_id) } else { self.online.remove(&user_id) }
    }

    /// Whether `user_id` was last reported online.
    #[must_use]
    pub fn is_online(&self, user_id: UserId) -> bool {
        self.online.contains(&user_id)
    }

    /// Forget everything.
    pub fn clear(&mut self) {
        self.online.clear();
    }
}
