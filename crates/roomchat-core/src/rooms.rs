use rand::Rng;
use tracing::{debug, info, warn};
use uuid::Uuid;

use roomchat_types::models::{Identity, ROOM_CODE_ALPHABET, ROOM_CODE_LEN, Room};

use crate::{Chat, ChatError, ChatResult, convert};

/// Codes drawn before room creation gives up with `CodeSpaceExhausted`.
pub const MAX_CODE_ATTEMPTS: usize = 16;

pub const ROOM_NAME_MAX_LEN: usize = 100;

/// A uniformly random room code, e.g. `7QXK`.
pub fn generate_room_code() -> String {
    let mut rng = rand::rng();
    (0..ROOM_CODE_LEN)
        .map(|_| ROOM_CODE_ALPHABET[rng.random_range(0..ROOM_CODE_ALPHABET.len())] as char)
        .collect()
}

impl Chat {
    /// Create a room under a fresh code and enroll `creator` in it.
    pub fn create_room(&self, creator: &Identity, name: &str) -> ChatResult<Room> {
        self.create_room_with(creator, name, generate_room_code)
    }

    pub(crate) fn create_room_with<G>(&self, creator: &Identity, name: &str, mut next_code: G) -> ChatResult<Room>
    where
        G: FnMut() -> String,
    {
        let name = name.trim();
        if name.is_empty() || name.chars().count() > ROOM_NAME_MAX_LEN {
            return Err(ChatError::invalid(format!(
                "room name must be 1-{ROOM_NAME_MAX_LEN} characters"
            )));
        }

        let owner_id = creator.account_id.to_string();
        for attempt in 1..=MAX_CODE_ATTEMPTS {
            let code = next_code();
            let id = Uuid::new_v4();

            match self
                .db
                .create_room_with_owner(&id.to_string(), &code, name, &owner_id)?
            {
                Some((row, _)) => {
                    info!("{} created room {} ({})", creator.username, code, name);
                    return Ok(convert::room(&row)?);
                }
                None => debug!(
                    "Room code {} taken (attempt {}/{})",
                    code, attempt, MAX_CODE_ATTEMPTS
                ),
            }
        }

        warn!("Gave up allocating a room code after {} attempts", MAX_CODE_ATTEMPTS);
        Err(ChatError::CodeSpaceExhausted(MAX_CODE_ATTEMPTS))
    }

    /// Exact-match lookup.
    pub fn find_room(&self, code: &str) -> ChatResult<Option<Room>> {
        match self.db.get_room_by_code(code)? {
            Some(row) => Ok(Some(convert::room(&row)?)),
            None => Ok(None),
        }
    }

    pub(crate) fn require_room(&self, code: &str) -> ChatResult<Room> {
        self.find_room(code)?.ok_or(ChatError::RoomNotFound)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{chat, user};
    use roomchat_types::models::is_room_code;

    #[test]
    fn generated_codes_have_room_code_shape() {
        for _ in 0..200 {
            assert!(is_room_code(&generate_room_code()));
        }
    }

    #[test]
    fn created_room_is_findable_and_creator_joined() {
        let (_dir, chat, _) = chat();
        let alice = user(&chat, "alice");

        let room = chat.create_room(&alice, "  Lobby ").unwrap();
        assert_eq!(room.name, "Lobby");
        assert!(is_room_code(&room.code));
        assert_eq!(chat.find_room(&room.code).unwrap(), Some(room.clone()));
        assert!(chat.is_member(&alice, &room.code).unwrap());
    }

    #[test]
    fn find_room_is_exact_match() {
        let (_dir, chat, _) = chat();
        let alice = user(&chat, "alice");
        chat.create_room_with(&alice, "Lobby", || "7QXK".into()).unwrap();

        assert!(chat.find_room("7QXK").unwrap().is_some());
        assert!(chat.find_room("7qxk").unwrap().is_none());
        assert!(chat.find_room("ZZZZ").unwrap().is_none());
    }

    #[test]
    fn collision_retries_with_a_new_code() {
        let (_dir, chat, _) = chat();
        let alice = user(&chat, "alice");
        chat.create_room_with(&alice, "First", || "AAAA".into()).unwrap();

        let mut codes = vec!["BBBB", "AAAA"];
        let room = chat
            .create_room_with(&alice, "Second", || codes.pop().unwrap().to_string())
            .unwrap();
        assert_eq!(room.code, "BBBB");
        assert_eq!(chat.find_room("AAAA").unwrap().unwrap().name, "First");
    }

    #[test]
    fn exhausted_code_space_fails_cleanly() {
        let (_dir, chat, _) = chat();
        let alice = user(&chat, "alice");
        chat.create_room_with(&alice, "First", || "AAAA".into()).unwrap();

        let mut draws = 0;
        let result = chat.create_room_with(&alice, "Second", || {
            draws += 1;
            "AAAA".into()
        });
        assert!(matches!(result, Err(ChatError::CodeSpaceExhausted(MAX_CODE_ATTEMPTS))));
        assert_eq!(draws, MAX_CODE_ATTEMPTS);
        assert_eq!(chat.rooms_for(&alice).unwrap().len(), 1);
    }

    #[test]
    fn blank_room_name_rejected() {
        let (_dir, chat, _) = chat();
        let alice = user(&chat, "alice");
        assert!(matches!(chat.create_room(&alice, "   "), Err(ChatError::InvalidInput(_))));
        assert!(matches!(
            chat.create_room(&alice, &"x".repeat(101)),
            Err(ChatError::InvalidInput(_))
        ));
    }
}
