//! Database row types. These map directly to SQLite rows and are kept
//! distinct from the roomchat-types models so the DB layer stays independent.

#[derive(Debug, Clone)]
pub struct AccountRow {
    pub id: String,
    pub username: String,
    pub password: String,
    pub created_at: String,
}

#[derive(Debug, Clone)]
pub struct RoomRow {
    pub id: String,
    pub code: String,
    pub name: String,
    pub created_at: String,
}

#[derive(Debug, Clone)]
pub struct MembershipRow {
    pub account_id: String,
    pub room_id: String,
    pub joined_at: String,
}

#[derive(Debug, Clone)]
pub struct MessageRow {
    pub seq: i64,
    pub id: String,
    pub room_id: String,
    pub author_id: String,
    pub author_username: String,
    pub content: String,
    pub created_at: String,
}
