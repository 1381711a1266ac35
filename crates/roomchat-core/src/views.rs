use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, PoisonError};

use uuid::Uuid;

use roomchat_types::models::{Identity, Room};

use crate::{Chat, ChatError, ChatResult};

/// Rooms each account has hidden from its room list without leaving them.
/// Kept in memory only; a restart shows every joined room again.
#[derive(Default)]
pub(crate) struct DismissedRooms {
    inner: Mutex<HashMap<Uuid, HashSet<Uuid>>>,
}

impl DismissedRooms {
    fn dismiss(&self, account_id: Uuid, room_id: Uuid) {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(account_id)
            .or_default()
            .insert(room_id);
    }

    pub(crate) fn restore(&self, account_id: Uuid, room_id: Uuid) {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(rooms) = inner.get_mut(&account_id) {
            rooms.remove(&room_id);
            if rooms.is_empty() {
                inner.remove(&account_id);
            }
        }
    }

    fn hidden_for(&self, account_id: Uuid) -> HashSet<Uuid> {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&account_id)
            .cloned()
            .unwrap_or_default()
    }
}

impl Chat {
    /// Hide a room from the caller's room list. Membership is untouched;
    /// joining the room again brings it back.
    pub fn dismiss(&self, identity: &Identity, code: &str) -> ChatResult<()> {
        let room = self.require_room(code)?;
        if !self.is_member(identity, code)? {
            return Err(ChatError::NotAMember);
        }
        self.views.dismiss(identity.account_id, room.id);
        Ok(())
    }

    /// Joined rooms minus the dismissed ones.
    pub fn visible_rooms(&self, identity: &Identity) -> ChatResult<Vec<Room>> {
        let hidden = self.views.hidden_for(identity.account_id);
        let mut rooms = self.rooms_for(identity)?;
        rooms.retain(|room| !hidden.contains(&room.id));
        Ok(rooms)
    }
}
