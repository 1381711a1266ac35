use crate::Database;
use crate::models::{AccountRow, MembershipRow, MessageRow, RoomRow};
use anyhow::Result;
use chrono::{SecondsFormat, Utc};
use rusqlite::{Connection, params};

/// A message about to be appended. The timestamp and sequence number are
/// assigned by the database while the writer is held.
pub struct NewMessage<'a> {
    pub id: &'a str,
    pub room_id: &'a str,
    pub author_id: &'a str,
    pub content: &'a str,
}

impl Database {
    // -- Accounts --

    /// Insert an account. Returns `None` if the username is already taken.
    pub fn create_account(
        &self,
        id: &str,
        username: &str,
        password_hash: &str,
    ) -> Result<Option<AccountRow>> {
        self.with_conn_mut(|conn| {
            let created_at = now();
            let inserted = conn.execute(
                "INSERT INTO accounts (id, username, password, created_at) VALUES (?1, ?2, ?3, ?4)",
                params![id, username, password_hash, created_at],
            );
            match inserted {
                Ok(_) => Ok(Some(AccountRow {
                    id: id.to_string(),
                    username: username.to_string(),
                    password: password_hash.to_string(),
                    created_at,
                })),
                Err(e) if is_unique_violation(&e) => Ok(None),
                Err(e) => Err(e.into()),
            }
        })
    }

    pub fn get_account_by_username(&self, username: &str) -> Result<Option<AccountRow>> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT id, username, password, created_at FROM accounts WHERE username = ?1",
                [username],
                account_from_row,
            )
            .optional()
        })
    }

    #[cfg(test)]
    fn count_accounts_named(&self, username: &str) -> Result<i64> {
        self.with_conn(|conn| {
            Ok(conn.query_row(
                "SELECT COUNT(*) FROM accounts WHERE username = ?1",
                [username],
                |row| row.get(0),
            )?)
        })
    }

    // -- Rooms --

    /// Insert a room and enroll its creator in one transaction.
    /// Returns `None` if the code is already in use; nothing is written then.
    pub fn create_room_with_owner(
        &self,
        id: &str,
        code: &str,
        name: &str,
        owner_id: &str,
    ) -> Result<Option<(RoomRow, MembershipRow)>> {
        self.with_conn_mut(|conn| {
            let tx = conn.unchecked_transaction()?;
            let created_at = now();

            let inserted = tx.execute(
                "INSERT INTO rooms (id, code, name, created_at) VALUES (?1, ?2, ?3, ?4)",
                params![id, code, name, created_at],
            );
            match inserted {
                Ok(_) => {}
                Err(e) if is_unique_violation(&e) => return Ok(None),
                Err(e) => return Err(e.into()),
            }

            tx.execute(
                "INSERT INTO memberships (account_id, room_id, joined_at) VALUES (?1, ?2, ?3)",
                params![owner_id, id, created_at],
            )?;
            tx.commit()?;

            Ok(Some((
                RoomRow {
                    id: id.to_string(),
                    code: code.to_string(),
                    name: name.to_string(),
                    created_at: created_at.clone(),
                },
                MembershipRow {
                    account_id: owner_id.to_string(),
                    room_id: id.to_string(),
                    joined_at: created_at,
                },
            )))
        })
    }

    pub fn get_room_by_code(&self, code: &str) -> Result<Option<RoomRow>> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT id, code, name, created_at FROM rooms WHERE code = ?1",
                [code],
                room_from_row,
            )
            .optional()
        })
    }

    // -- Memberships --

    /// Insert a membership. Returns `None` when the pair already exists,
    /// whether found up front or rejected by the primary key on insert.
    pub fn insert_membership(&self, account_id: &str, room_id: &str) -> Result<Option<MembershipRow>> {
        self.with_conn_mut(|conn| {
            if query_membership(conn, account_id, room_id)?.is_some() {
                return Ok(None);
            }

            let joined_at = now();
            let inserted = conn.execute(
                "INSERT INTO memberships (account_id, room_id, joined_at) VALUES (?1, ?2, ?3)",
                params![account_id, room_id, joined_at],
            );
            match inserted {
                Ok(_) => Ok(Some(MembershipRow {
                    account_id: account_id.to_string(),
                    room_id: room_id.to_string(),
                    joined_at,
                })),
                Err(e) if is_unique_violation(&e) => Ok(None),
                Err(e) => Err(e.into()),
            }
        })
    }

    pub fn get_membership(&self, account_id: &str, room_id: &str) -> Result<Option<MembershipRow>> {
        self.with_conn(|conn| query_membership(conn, account_id, room_id))
    }

    /// Returns true if a row was removed.
    pub fn delete_membership(&self, account_id: &str, room_id: &str) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let removed = conn.execute(
                "DELETE FROM memberships WHERE account_id = ?1 AND room_id = ?2",
                params![account_id, room_id],
            )?;
            Ok(removed > 0)
        })
    }

    #[cfg(test)]
    fn count_memberships(&self, account_id: &str, room_id: &str) -> Result<i64> {
        self.with_conn(|conn| {
            Ok(conn.query_row(
                "SELECT COUNT(*) FROM memberships WHERE account_id = ?1 AND room_id = ?2",
                params![account_id, room_id],
                |row| row.get(0),
            )?)
        })
    }

    /// Rooms the account belongs to, in the order they were joined.
    pub fn get_rooms_for_account(&self, account_id: &str) -> Result<Vec<RoomRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT r.id, r.code, r.name, r.created_at
                 FROM memberships m
                 JOIN rooms r ON r.id = m.room_id
                 WHERE m.account_id = ?1
                 ORDER BY m.joined_at, r.code",
            )?;
            let rows = stmt
                .query_map([account_id], room_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    // -- Messages --

    /// Append a message if its author is currently a member of the room.
    ///
    /// The membership check, insert and commit all happen under the writer
    /// lock, and `on_commit` runs before that lock is released. Callers that
    /// publish from `on_commit` therefore publish in commit order.
    /// Returns `None` (and writes nothing) when the author is not a member.
    pub fn append_message<F>(&self, new: &NewMessage<'_>, on_commit: F) -> Result<Option<MessageRow>>
    where
        F: FnOnce(&MessageRow),
    {
        self.with_conn_mut(|conn| {
            let tx = conn.unchecked_transaction()?;

            let author_username: Option<String> = tx
                .query_row(
                    "SELECT a.username
                     FROM memberships m
                     JOIN accounts a ON a.id = m.account_id
                     WHERE m.account_id = ?1 AND m.room_id = ?2",
                    params![new.author_id, new.room_id],
                    |row| row.get(0),
                )
                .optional()?;
            let Some(author_username) = author_username else {
                return Ok(None);
            };

            let created_at = now();
            tx.execute(
                "INSERT INTO messages (id, room_id, author_id, content, created_at) VALUES (?1, ?2, ?3, ?4, ?5)",
                params![new.id, new.room_id, new.author_id, new.content, created_at],
            )?;
            let seq = tx.last_insert_rowid();
            tx.commit()?;

            let row = MessageRow {
                seq,
                id: new.id.to_string(),
                room_id: new.room_id.to_string(),
                author_id: new.author_id.to_string(),
                author_username,
                content: new.content.to_string(),
                created_at,
            };
            on_commit(&row);
            Ok(Some(row))
        })
    }

    /// Full history of a room, oldest first.
    pub fn get_messages(&self, room_id: &str) -> Result<Vec<MessageRow>> {
        self.with_conn(|conn| query_messages(conn, room_id))
    }
}

fn now() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn is_unique_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _)
            if e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
                || e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY
    )
}

fn account_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<AccountRow> {
    Ok(AccountRow {
        id: row.get(0)?,
        username: row.get(1)?,
        password: row.get(2)?,
        created_at: row.get(3)?,
    })
}

fn room_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<RoomRow> {
    Ok(RoomRow {
        id: row.get(0)?,
        code: row.get(1)?,
        name: row.get(2)?,
        created_at: row.get(3)?,
    })
}

fn query_membership(conn: &Connection, account_id: &str, room_id: &str) -> Result<Option<MembershipRow>> {
    conn.query_row(
        "SELECT account_id, room_id, joined_at FROM memberships WHERE account_id = ?1 AND room_id = ?2",
        params![account_id, room_id],
        |row| {
            Ok(MembershipRow {
                account_id: row.get(0)?,
                room_id: row.get(1)?,
                joined_at: row.get(2)?,
            })
        },
    )
    .optional()
}

fn query_messages(conn: &Connection, room_id: &str) -> Result<Vec<MessageRow>> {
    // JOIN accounts to fetch the author's username in a single query
    let mut stmt = conn.prepare(
        "SELECT m.seq, m.id, m.room_id, m.author_id, a.username, m.content, m.created_at
         FROM messages m
         LEFT JOIN accounts a ON m.author_id = a.id
         WHERE m.room_id = ?1
         ORDER BY m.seq ASC",
    )?;

    let rows = stmt
        .query_map([room_id], |row| {
            Ok(MessageRow {
                seq: row.get(0)?,
                id: row.get(1)?,
                room_id: row.get(2)?,
                author_id: row.get(3)?,
                author_username: row
                    .get::<_, Option<String>>(4)?
                    .unwrap_or_else(|| "unknown".to_string()),
                content: row.get(5)?,
                created_at: row.get(6)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(rows)
}

/// Extension trait for optional query results
trait OptionalExt<T> {
    fn optional(self) -> Result<Option<T>>;
}

impl<T> OptionalExt<T> for std::result::Result<T, rusqlite::Error> {
    fn optional(self) -> Result<Option<T>> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use uuid::Uuid;

    fn open() -> (TempDir, Database) {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open(&dir.path().join("test.db")).unwrap();
        (dir, db)
    }

    fn account(db: &Database, name: &str) -> AccountRow {
        db.create_account(&Uuid::new_v4().to_string(), name, "hash")
            .unwrap()
            .unwrap()
    }

    fn room(db: &Database, code: &str, owner: &AccountRow) -> RoomRow {
        db.create_room_with_owner(&Uuid::new_v4().to_string(), code, "Lobby", &owner.id)
            .unwrap()
            .unwrap()
            .0
    }

    fn append(db: &Database, room: &RoomRow, author: &AccountRow, content: &str) -> Option<MessageRow> {
        let id = Uuid::new_v4().to_string();
        db.append_message(
            &NewMessage {
                id: &id,
                room_id: &room.id,
                author_id: &author.id,
                content,
            },
            |_| {},
        )
        .unwrap()
    }

    #[test]
    fn duplicate_username_is_not_an_error() {
        let (_dir, db) = open();
        account(&db, "alice");
        let second = db
            .create_account(&Uuid::new_v4().to_string(), "alice", "other")
            .unwrap();
        assert!(second.is_none());
        assert_eq!(db.count_accounts_named("alice").unwrap(), 1);
    }

    #[test]
    fn room_code_collision_writes_nothing() {
        let (_dir, db) = open();
        let alice = account(&db, "alice");
        let bob = account(&db, "bob");
        let first = room(&db, "7QXK", &alice);

        let clash = db
            .create_room_with_owner(&Uuid::new_v4().to_string(), "7QXK", "Other", &bob.id)
            .unwrap();
        assert!(clash.is_none());
        assert!(db.get_rooms_for_account(&bob.id).unwrap().is_empty());
        assert_eq!(db.get_room_by_code("7QXK").unwrap().unwrap().id, first.id);
    }

    #[test]
    fn membership_insert_is_idempotent() {
        let (_dir, db) = open();
        let alice = account(&db, "alice");
        let bob = account(&db, "bob");
        let lobby = room(&db, "7QXK", &alice);

        assert!(db.insert_membership(&bob.id, &lobby.id).unwrap().is_some());
        assert!(db.insert_membership(&bob.id, &lobby.id).unwrap().is_none());
        assert_eq!(db.count_memberships(&bob.id, &lobby.id).unwrap(), 1);
    }

    #[test]
    fn delete_membership_reports_removal() {
        let (_dir, db) = open();
        let alice = account(&db, "alice");
        let lobby = room(&db, "7QXK", &alice);

        assert!(db.delete_membership(&alice.id, &lobby.id).unwrap());
        assert!(!db.delete_membership(&alice.id, &lobby.id).unwrap());
        assert!(db.get_membership(&alice.id, &lobby.id).unwrap().is_none());
    }

    #[test]
    fn append_requires_membership() {
        let (_dir, db) = open();
        let alice = account(&db, "alice");
        let mallory = account(&db, "mallory");
        let lobby = room(&db, "7QXK", &alice);

        assert!(append(&db, &lobby, &mallory, "let me in").is_none());
        assert!(db.get_messages(&lobby.id).unwrap().is_empty());
    }

    #[test]
    fn history_follows_commit_order() {
        let (_dir, db) = open();
        let alice = account(&db, "alice");
        let lobby = room(&db, "7QXK", &alice);

        let first = append(&db, &lobby, &alice, "one").unwrap();
        let second = append(&db, &lobby, &alice, "two").unwrap();
        assert!(first.seq < second.seq);

        let history = db.get_messages(&lobby.id).unwrap();
        let contents: Vec<_> = history.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, ["one", "two"]);
        assert_eq!(history[0].author_username, "alice");
    }

    #[test]
    fn on_commit_sees_the_stored_row() {
        let (_dir, db) = open();
        let alice = account(&db, "alice");
        let lobby = room(&db, "7QXK", &alice);

        let mut seen = None;
        let id = Uuid::new_v4().to_string();
        let row = db
            .append_message(
                &NewMessage {
                    id: &id,
                    room_id: &lobby.id,
                    author_id: &alice.id,
                    content: "hi",
                },
                |row| seen = Some(row.seq),
            )
            .unwrap()
            .unwrap();
        assert_eq!(seen, Some(row.seq));
    }

    #[test]
    fn deleting_a_room_cascades() {
        let (_dir, db) = open();
        let alice = account(&db, "alice");
        let lobby = room(&db, "7QXK", &alice);
        append(&db, &lobby, &alice, "hi").unwrap();

        db.with_conn_mut(|conn| {
            conn.execute("DELETE FROM rooms WHERE id = ?1", [&lobby.id])?;
            Ok(())
        })
        .unwrap();

        assert!(db.get_messages(&lobby.id).unwrap().is_empty());
        assert!(db.get_membership(&alice.id, &lobby.id).unwrap().is_none());
    }
}
