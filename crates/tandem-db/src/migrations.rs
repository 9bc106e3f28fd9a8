use rusqlite::Connection;
use tracing::info;

use crate::StoreResult;

pub fn run(conn: &Connection) -> StoreResult<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS users (
            id                  TEXT PRIMARY KEY,
            email               TEXT NOT NULL UNIQUE,
            full_name           TEXT NOT NULL,
            password            TEXT NOT NULL,
            profile_pic         TEXT NOT NULL DEFAULT '',
            bio                 TEXT NOT NULL DEFAULT '',
            native_language     TEXT NOT NULL DEFAULT '',
            learning_language   TEXT NOT NULL DEFAULT '',
            location            TEXT NOT NULL DEFAULT '',
            is_onboarded        INTEGER NOT NULL DEFAULT 0,
            created_at          TEXT NOT NULL DEFAULT (datetime('now'))
        );

        -- Friendship is symmetric: accepting a request inserts both
        -- orientations in one transaction. The composite key gives the
        -- relation set semantics (INSERT OR IGNORE, no duplicates).
        CREATE TABLE IF NOT EXISTS friendships (
            user_id     TEXT NOT NULL REFERENCES users(id),
            friend_id   TEXT NOT NULL REFERENCES users(id),
            created_at  TEXT NOT NULL DEFAULT (datetime('now')),
            PRIMARY KEY (user_id, friend_id)
        );

        CREATE TABLE IF NOT EXISTS friend_requests (
            id              TEXT PRIMARY KEY,
            sender_id       TEXT NOT NULL REFERENCES users(id),
            recipient_id    TEXT NOT NULL REFERENCES users(id),
            status          TEXT NOT NULL DEFAULT 'pending'
                            CHECK (status IN ('pending', 'accepted')),
            created_at      TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE INDEX IF NOT EXISTS idx_friend_requests_recipient
            ON friend_requests(recipient_id, status);

        CREATE INDEX IF NOT EXISTS idx_friend_requests_sender
            ON friend_requests(sender_id, status);

        CREATE TABLE IF NOT EXISTS groups (
            id          TEXT PRIMARY KEY,
            name        TEXT NOT NULL,
            description TEXT NOT NULL DEFAULT '',
            avatar      TEXT NOT NULL DEFAULT '',
            admin_id    TEXT NOT NULL REFERENCES users(id),
            channel_id  TEXT NOT NULL UNIQUE,
            created_at  TEXT NOT NULL DEFAULT (datetime('now')),
            updated_at  TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE INDEX IF NOT EXISTS idx_groups_admin
            ON groups(admin_id);

        CREATE TABLE IF NOT EXISTS group_members (
            group_id    TEXT NOT NULL REFERENCES groups(id),
            user_id     TEXT NOT NULL REFERENCES users(id),
            joined_at   TEXT NOT NULL DEFAULT (datetime('now')),
            PRIMARY KEY (group_id, user_id)
        );

        CREATE INDEX IF NOT EXISTS idx_group_members_user
            ON group_members(user_id);
        ",
    )?;

    info!("Database migrations complete");
    Ok(())
}
