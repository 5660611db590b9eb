//! Which session each user currently has open.
//!
//! This is view state only. Leaving a session never touches stored
//! memberships or votes, so a user who rejoins picks up where they were.

use std::collections::HashMap;

use shared::domain::{ImageId, Participation, SessionId, UserId};

#[derive(Debug, Default)]
pub struct Presence {
    active: HashMap<UserId, SessionId>,
}

impl Presence {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes `session_id` the user's active session, replacing any other.
    pub fn enter(&mut self, user_id: UserId, session_id: SessionId) {
        self.active.insert(user_id, session_id);
    }

    /// Returns `false` if `session_id` was not the user's active session.
    pub fn leave(&mut self, user_id: UserId, session_id: &SessionId) -> bool {
        if self.is_active(user_id, session_id) {
            self.active.remove(&user_id);
            true
        } else {
            false
        }
    }

    pub fn active_session(&self, user_id: UserId) -> Option<&SessionId> {
        self.active.get(&user_id)
    }

    pub fn is_active(&self, user_id: UserId, session_id: &SessionId) -> bool {
        self.active.get(&user_id) == Some(session_id)
    }

    pub fn participation(
        &self,
        user_id: UserId,
        session_id: &SessionId,
        vote: Option<ImageId>,
    ) -> Participation {
        if !self.is_active(user_id, session_id) {
            return Participation::NotJoined;
        }
        match vote {
            Some(image_id) => Participation::Voted { image_id },
            None => Participation::Joined,
        }
    }
}
