use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Wire format for message timestamps (`YYYY-MM-DD HH:MM:SS`, UTC).
pub const WIRE_TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Room codes are this many characters long.
pub const ROOM_CODE_LEN: usize = 4;

/// Alphabet room codes are drawn from.
pub const ROOM_CODE_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub id: Uuid,
    pub username: String,
    pub created_at: DateTime<Utc>,
}

/// The authenticated caller. Every core operation takes one explicitly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub account_id: Uuid,
    pub username: String,
}

impl From<&Account> for Identity {
    fn from(account: &Account) -> Self {
        Self {
            account_id: account.id,
            username: account.username.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Room {
    pub id: Uuid,
    pub code: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Membership {
    pub account_id: Uuid,
    pub room_id: Uuid,
    pub joined_at: DateTime<Utc>,
}

/// A message as stored in a room's log. Never mutated once created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: Uuid,
    pub room_id: Uuid,
    pub author_id: Uuid,
    pub author_username: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

impl Message {
    pub fn wire_timestamp(&self) -> String {
        self.created_at.format(WIRE_TIMESTAMP_FORMAT).to_string()
    }
}

/// True if `code` has the shape of a room code (length and alphabet).
pub fn is_room_code(code: &str) -> bool {
    code.len() == ROOM_CODE_LEN && code.bytes().all(|b| ROOM_CODE_ALPHABET.contains(&b))
}
