use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use uuid::Uuid;

use roomchat_db::models::{AccountRow, MembershipRow, MessageRow, RoomRow};
use roomchat_types::models::{Account, Membership, Message, Room};

fn parse_id(raw: &str) -> Result<Uuid> {
    raw.parse().with_context(|| format!("corrupt id '{raw}'"))
}

fn parse_time(raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .with_context(|| format!("corrupt timestamp '{raw}'"))
}

pub(crate) fn account(row: &AccountRow) -> Result<Account> {
    Ok(Account {
        id: parse_id(&row.id)?,
        username: row.username.clone(),
        created_at: parse_time(&row.created_at)?,
    })
}

pub(crate) fn room(row: &RoomRow) -> Result<Room> {
    Ok(Room {
        id: parse_id(&row.id)?,
        code: row.code.clone(),
        name: row.name.clone(),
        created_at: parse_time(&row.created_at)?,
    })
}

pub(crate) fn membership(row: &MembershipRow) -> Result<Membership> {
    Ok(Membership {
        account_id: parse_id(&row.account_id)?,
        room_id: parse_id(&row.room_id)?,
        joined_at: parse_time(&row.joined_at)?,
    })
}

pub(crate) fn message(row: &MessageRow) -> Result<Message> {
    Ok(Message {
        id: parse_id(&row.id)?,
        room_id: parse_id(&row.room_id)?,
        author_id: parse_id(&row.author_id)?,
        author_username: row.author_username.clone(),
        content: row.content.clone(),
        created_at: parse_time(&row.created_at)?,
    })
}
