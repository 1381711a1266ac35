use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{Message, Room};

// -- JWT Claims --

/// Bearer token payload. Used for both REST requests and gateway identify.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub username: String,
    pub exp: usize,
}

// -- Auth --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RegisterRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RegisterResponse {
    pub user_id: Uuid,
    pub token: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LoginResponse {
    pub user_id: Uuid,
    pub username: String,
    pub token: String,
}

// -- Rooms --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateRoomRequest {
    pub name: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct JoinRoomRequest {
    pub code: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RoomResponse {
    pub room: Room,
}

/// `already_member` is informational: joining twice still succeeds.
#[derive(Debug, Serialize, Deserialize)]
pub struct JoinRoomResponse {
    pub room: Room,
    pub already_member: bool,
}

// -- Messages --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SendMessageRequest {
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MessageResponse {
    pub id: Uuid,
    pub user: String,
    pub message: String,
    pub timestamp: String,
}

impl From<&Message> for MessageResponse {
    fn from(msg: &Message) -> Self {
        Self {
            id: msg.id,
            user: msg.author_username.clone(),
            message: msg.content.clone(),
            timestamp: msg.wire_timestamp(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}
