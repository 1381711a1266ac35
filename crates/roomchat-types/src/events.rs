use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::Message;

/// Events sent over the WebSocket gateway.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum GatewayEvent {
    /// Server confirms successful authentication
    Ready { user_id: Uuid, username: String },

    /// A message was appended to a room's log
    Message {
        room: String,
        user: String,
        message: String,
        timestamp: String,
    },

    /// System-authored presence notice, e.g. "alice joined"
    Notice { room: String, message: String },

    /// Delivered only to the connection whose command failed
    Error { message: String },
}

impl GatewayEvent {
    pub fn message(room: &str, msg: &Message) -> Self {
        Self::Message {
            room: room.to_string(),
            user: msg.author_username.clone(),
            message: msg.content.clone(),
            timestamp: msg.wire_timestamp(),
        }
    }

    pub fn joined(room: &str, username: &str) -> Self {
        Self::Notice {
            room: room.to_string(),
            message: format!("{username} joined"),
        }
    }

    pub fn left(room: &str, username: &str) -> Self {
        Self::Notice {
            room: room.to_string(),
            message: format!("{username} left"),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }
}

/// Commands sent FROM client TO server over WebSocket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum GatewayCommand {
    /// Authenticate the WebSocket connection
    Identify { token: String },

    /// Subscribe this connection to a room the caller is a member of.
    /// `username`, when sent, must match the authenticated identity.
    Join {
        room: String,
        #[serde(default)]
        username: Option<String>,
    },

    /// Append a message to a room and broadcast it
    Message { room: String, message: String },

    /// Stop receiving a room's events on this connection. Membership is kept.
    Leave { room: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn join_command_accepts_optional_username() {
        let cmd: GatewayCommand =
            serde_json::from_str(r#"{"type":"join","data":{"room":"7QXK"}}"#).unwrap();
        assert_eq!(
            cmd,
            GatewayCommand::Join {
                room: "7QXK".into(),
                username: None
            }
        );

        let cmd: GatewayCommand = serde_json::from_str(
            r#"{"type":"join","data":{"room":"7QXK","username":"alice"}}"#,
        )
        .unwrap();
        assert!(matches!(cmd, GatewayCommand::Join { username: Some(u), .. } if u == "alice"));
    }

    #[test]
    fn message_event_wire_shape() {
        let event = GatewayEvent::Message {
            room: "7QXK".into(),
            user: "alice".into(),
            message: "hi".into(),
            timestamp: "2024-01-01 12:00:00".into(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "message");
        assert_eq!(json["data"]["user"], "alice");
        assert_eq!(json["data"]["message"], "hi");
        assert_eq!(json["data"]["timestamp"], "2024-01-01 12:00:00");
    }
}
