//! Authoritative database schema

use rusqlite::Connection;

const CURRENT_VERSION: i64 = 1;

pub fn run(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY
        )",
        [],
    )?;

    let version = get_version(conn)?;
    if version < 1 {
        migrate_v1(conn)?;
    }

    Ok(())
}

fn get_version(conn: &Connection) -> rusqlite::Result<i64> {
    let version = conn
        .query_row("SELECT MAX(version) FROM schema_version", [], |row| {
            row.get::<_, Option<i64>>(0)
        })?
        .unwrap_or(0);
    Ok(version)
}

fn migrate_v1(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        "BEGIN;

        CREATE TABLE notebooks (
            id          TEXT PRIMARY KEY,
            user_id     TEXT NOT NULL,
            title       TEXT NOT NULL,
            created_at  INTEGER NOT NULL,
            updated_at  INTEGER NOT NULL,
            deleted_at  INTEGER,
            synced_at   INTEGER NOT NULL
        );
        CREATE INDEX idx_notebooks_user_synced ON notebooks (user_id, synced_at);

        CREATE TABLE notes (
            id          TEXT PRIMARY KEY,
            notebook_id TEXT NOT NULL,
            user_id     TEXT NOT NULL,
            content     TEXT NOT NULL,
            plain_text  TEXT NOT NULL DEFAULT '',
            is_todo     INTEGER NOT NULL DEFAULT 0,
            is_done     INTEGER NOT NULL DEFAULT 0,
            reminder_at INTEGER,
            version     INTEGER NOT NULL,
            created_at  INTEGER NOT NULL,
            updated_at  INTEGER NOT NULL,
            deleted_at  INTEGER,
            synced_at   INTEGER NOT NULL
        );
        CREATE INDEX idx_notes_user_synced ON notes (user_id, synced_at);
        CREATE INDEX idx_notes_notebook ON notes (notebook_id);

        CREATE TABLE tags (
            id          TEXT PRIMARY KEY,
            user_id     TEXT NOT NULL,
            name        TEXT NOT NULL,
            color       TEXT NOT NULL DEFAULT '',
            created_at  INTEGER NOT NULL,
            updated_at  INTEGER NOT NULL,
            deleted_at  INTEGER,
            synced_at   INTEGER NOT NULL
        );
        CREATE INDEX idx_tags_user_synced ON tags (user_id, synced_at);

        CREATE TABLE note_tags (
            note_id TEXT NOT NULL,
            tag_id  TEXT NOT NULL,
            PRIMARY KEY (note_id, tag_id)
        );

        INSERT INTO schema_version (version) VALUES (1);

        COMMIT;",
    )?;

    tracing::debug!(version = CURRENT_VERSION, "Authoritative schema migrated");
    Ok(())
}
