use anyhow::anyhow;
use tracing::info;

use roomchat_types::models::{Identity, Membership, Room};

use crate::{Chat, ChatError, ChatResult, convert};

/// Result of a join. Joining a room twice is not an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JoinOutcome {
    Joined(Membership),
    AlreadyMember(Membership),
}

impl JoinOutcome {
    pub fn membership(&self) -> &Membership {
        match self {
            Self::Joined(m) | Self::AlreadyMember(m) => m,
        }
    }

    pub fn already_member(&self) -> bool {
        matches!(self, Self::AlreadyMember(_))
    }
}

impl Chat {
    /// Enroll the caller in the room with this code. Also restores the room
    /// to the caller's view if it had been dismissed.
    pub fn join(&self, identity: &Identity, code: &str) -> ChatResult<(Room, JoinOutcome)> {
        let room = self.require_room(code)?;
        let account_id = identity.account_id.to_string();
        let room_id = room.id.to_string();

        let outcome = match self.db.insert_membership(&account_id, &room_id)? {
            Some(row) => {
                info!("{} joined room {}", identity.username, room.code);
                JoinOutcome::Joined(convert::membership(&row)?)
            }
            None => {
                let row = self
                    .db
                    .get_membership(&account_id, &room_id)?
                    .ok_or_else(|| anyhow!("membership of {} in {} vanished", account_id, room_id))?;
                JoinOutcome::AlreadyMember(convert::membership(&row)?)
            }
        };

        self.views.restore(identity.account_id, room.id);
        Ok((room, outcome))
    }

    /// Every room the caller currently belongs to, in join order.
    pub fn rooms_for(&self, identity: &Identity) -> ChatResult<Vec<Room>> {
        self.db
            .get_rooms_for_account(&identity.account_id.to_string())?
            .iter()
            .map(|row| convert::room(row).map_err(ChatError::from))
            .collect()
    }

    pub fn is_member(&self, identity: &Identity, code: &str) -> ChatResult<bool> {
        let room = self.require_room(code)?;
        Ok(self
            .db
            .get_membership(&identity.account_id.to_string(), &room.id.to_string())?
            .is_some())
    }

    /// Remove the caller's membership. Returns false if there was none.
    pub fn leave(&self, identity: &Identity, code: &str) -> ChatResult<bool> {
        let room = self.require_room(code)?;
        let removed = self
            .db
            .delete_membership(&identity.account_id.to_string(), &room.id.to_string())?;
        if removed {
            let revoked = self
                .publisher
                .revoke(identity.account_id, &identity.username, &room.code);
            info!(
                "{} left room {} ({} live subscriptions dropped)",
                identity.username, room.code, revoked
            );
        }
        self.views.restore(identity.account_id, room.id);
        Ok(removed)
    }
}
