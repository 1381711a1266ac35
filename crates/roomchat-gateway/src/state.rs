use std::collections::BTreeSet;

use thiserror::Error;

use roomchat_types::models::Identity;

/// Lifecycle of one gateway connection. A session starts `Authenticated`
/// once identify succeeds; `disconnect` is the single way back to
/// `Disconnected`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Authenticated(Identity),
    Subscribed {
        identity: Identity,
        rooms: BTreeSet<String>,
    },
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum StateError {
    #[error("connection is not identified")]
    NotAuthenticated,
}

impl ConnectionState {
    pub fn identity(&self) -> Option<&Identity> {
        match self {
            Self::Disconnected => None,
            Self::Authenticated(identity) | Self::Subscribed { identity, .. } => Some(identity),
        }
    }

    /// Returns true if the room was newly added.
    pub fn subscribe(&mut self, room: &str) -> Result<bool, StateError> {
        match self {
            Self::Disconnected => Err(StateError::NotAuthenticated),
            Self::Authenticated(identity) => {
                *self = Self::Subscribed {
                    identity: identity.clone(),
                    rooms: BTreeSet::from([room.to_string()]),
                };
                Ok(true)
            }
            Self::Subscribed { rooms, .. } => Ok(rooms.insert(room.to_string())),
        }
    }

    /// Returns true if the room had been subscribed.
    pub fn unsubscribe(&mut self, room: &str) -> bool {
        let Self::Subscribed { identity, rooms } = self else {
            return false;
        };
        let removed = rooms.remove(room);
        if rooms.is_empty() {
            *self = Self::Authenticated(identity.clone());
        }
        removed
    }

    /// Keep only the rooms `keep` accepts. Returns the rooms dropped.
    pub fn retain_rooms<F>(&mut self, mut keep: F) -> Vec<String>
    where
        F: FnMut(&str) -> bool,
    {
        let Self::Subscribed { identity, rooms } = self else {
            return Vec::new();
        };
        let mut dropped = Vec::new();
        rooms.retain(|room| {
            let kept = keep(room.as_str());
            if !kept {
                dropped.push(room.clone());
            }
            kept
        });
        if rooms.is_empty() {
            *self = Self::Authenticated(identity.clone());
        }
        dropped
    }

    pub fn is_subscribed(&self, room: &str) -> bool {
        matches!(self, Self::Subscribed { rooms, .. } if rooms.contains(room))
    }

    /// Back to `Disconnected`. Returns the rooms that were subscribed.
    pub fn disconnect(&mut self) -> Vec<String> {
        match std::mem::take(self) {
            Self::Subscribed { rooms, .. } => rooms.into_iter().collect(),
            _ => Vec::new(),
        }
    }
}
