//! v001 -- Initial schema creation.
//!
//! Creates the four cache tables: `user_profiles`, `instructions`, `tasks`
//! and `chat_messages`.  No foreign keys: the cache may hold a child whose
//! parent was never fetched.

use rusqlite::Connection;

const UP_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS user_profiles (
    id             TEXT PRIMARY KEY NOT NULL,
    name           TEXT NOT NULL,
    address        TEXT NOT NULL,
    business_field TEXT NOT NULL,
    created_at     TEXT NOT NULL,              -- RFC-3339
    email          TEXT NOT NULL,
    is_admin       INTEGER NOT NULL DEFAULT 0  -- boolean 0/1
);

CREATE INDEX IF NOT EXISTS idx_user_profiles_email ON user_profiles(email);

CREATE TABLE IF NOT EXISTS instructions (
    id          TEXT PRIMARY KEY NOT NULL,
    user_id     TEXT NOT NULL,
    title       TEXT NOT NULL,
    description TEXT NOT NULL,
    created_at  TEXT NOT NULL,
    status      TEXT NOT NULL                  -- pending | in_progress | completed
);

CREATE INDEX IF NOT EXISTS idx_instructions_user
    ON instructions(user_id, created_at DESC);

CREATE TABLE IF NOT EXISTS tasks (
    id             TEXT PRIMARY KEY NOT NULL,
    instruction_id TEXT NOT NULL,
    admin_id       TEXT NOT NULL,
    title          TEXT NOT NULL,
    description    TEXT NOT NULL,
    status         TEXT NOT NULL,              -- pending | completed
    created_at     TEXT NOT NULL,
    completed_at   TEXT
);

CREATE INDEX IF NOT EXISTS idx_tasks_instruction
    ON tasks(instruction_id, created_at DESC);
CREATE INDEX IF NOT EXISTS idx_tasks_admin ON tasks(admin_id);

CREATE TABLE IF NOT EXISTS chat_messages (
    id          TEXT PRIMARY KEY NOT NULL,     -- server-assigned id only
    task_id     TEXT NOT NULL,
    sender_role TEXT NOT NULL,                 -- user | admin
    sender_id   TEXT NOT NULL,
    text        TEXT NOT NULL,
    media_url   TEXT,
    file_type   TEXT NOT NULL,                 -- text | image | document
    file_name   TEXT,
    file_size   INTEGER,
    timestamp   TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_chat_messages_task_ts
    ON chat_messages(task_id, timestamp ASC);
CREATE INDEX IF NOT EXISTS idx_chat_messages_sender ON chat_messages(sender_id);
"#;

/// Apply the initial migration.
pub fn up(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(UP_SQL)
}
