use anyhow::anyhow;
use tracing::{debug, error};
use uuid::Uuid;

use roomchat_db::queries::NewMessage;
use roomchat_types::events::GatewayEvent;
use roomchat_types::models::{Identity, Message};

use crate::{Chat, ChatError, ChatResult, convert};

pub const MESSAGE_MAX_LEN: usize = 500;

impl Chat {
    /// Append to a room's log and publish it to the room's subscribers.
    ///
    /// Membership is checked in the same transaction as the insert. The event
    /// is published after commit but before the storage writer is released,
    /// so subscribers observe messages in commit order.
    pub fn append(&self, author: &Identity, code: &str, content: &str) -> ChatResult<Message> {
        let content = content.trim();
        if content.is_empty() || content.chars().count() > MESSAGE_MAX_LEN {
            return Err(ChatError::invalid(format!(
                "message must be 1-{MESSAGE_MAX_LEN} characters"
            )));
        }

        let room = self.require_room(code)?;
        let id = Uuid::new_v4().to_string();
        let room_id = room.id.to_string();
        let author_id = author.account_id.to_string();

        let mut appended = None;
        let row = self.db.append_message(
            &NewMessage {
                id: &id,
                room_id: &room_id,
                author_id: &author_id,
                content,
            },
            |row| match convert::message(row) {
                Ok(msg) => {
                    let delivered = self
                        .publisher
                        .publish(&room.code, GatewayEvent::message(&room.code, &msg));
                    debug!(
                        "{} -> room {} (seq {}, {} subscribers)",
                        author.username, room.code, row.seq, delivered
                    );
                    appended = Some(msg);
                }
                Err(e) => error!("Stored message {} is unreadable: {:#}", row.id, e),
            },
        )?;

        match (row, appended) {
            (None, _) => Err(ChatError::NotAMember),
            (Some(_), Some(msg)) => Ok(msg),
            (Some(row), None) => Err(anyhow!("stored message {} is unreadable", row.id).into()),
        }
    }

    /// The room's full log, oldest first. Each call is a fresh read.
    pub fn history(&self, code: &str) -> ChatResult<Vec<Message>> {
        let room = self.require_room(code)?;
        self.db
            .get_messages(&room.id.to_string())?
            .iter()
            .map(|row| convert::message(row).map_err(ChatError::from))
            .collect()
    }
}
