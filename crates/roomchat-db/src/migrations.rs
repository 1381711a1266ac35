use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch("CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL);")?;

    let version: i64 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_version",
        [],
        |r| r.get(0),
    )?;

    if version < 1 {
        info!("Running migration v1 (initial schema)");
        conn.execute_batch(
            "
            CREATE TABLE accounts (
                id          TEXT PRIMARY KEY,
                username    TEXT NOT NULL UNIQUE,
                password    TEXT NOT NULL,
                created_at  TEXT NOT NULL
            );

            CREATE TABLE rooms (
                id          TEXT PRIMARY KEY,
                code        TEXT NOT NULL UNIQUE CHECK (length(code) = 4),
                name        TEXT NOT NULL,
                created_at  TEXT NOT NULL
            );

            CREATE TABLE memberships (
                account_id  TEXT NOT NULL REFERENCES accounts(id) ON DELETE CASCADE,
                room_id     TEXT NOT NULL REFERENCES rooms(id) ON DELETE CASCADE,
                joined_at   TEXT NOT NULL,
                PRIMARY KEY (account_id, room_id)
            );

            CREATE INDEX idx_memberships_room ON memberships(room_id);

            -- seq is the commit order; history and broadcast both follow it
            CREATE TABLE messages (
                seq         INTEGER PRIMARY KEY AUTOINCREMENT,
                id          TEXT NOT NULL UNIQUE,
                room_id     TEXT NOT NULL REFERENCES rooms(id) ON DELETE CASCADE,
                author_id   TEXT NOT NULL REFERENCES accounts(id) ON DELETE CASCADE,
                content     TEXT NOT NULL,
                created_at  TEXT NOT NULL
            );

            CREATE INDEX idx_messages_room ON messages(room_id, created_at, seq);

            INSERT INTO schema_version (version) VALUES (1);
            ",
        )?;
    }

    info!("Database migrations complete");
    Ok(())
}
