//! User-scoped record access
//!
//! A repository borrows a connection (or an open transaction, which
//! derefs to one) so the push path can run its read-compare-write
//! sequence atomically.
//!
//! Every write stamps `synced_at` with the server clock, and delta
//! reads filter on it. Client clocks only ever decide conflicts, never
//! what a pull returns: a record written with a lagging `updated_at`
//! must still reach every other device.
//!
//! The strict `synced_at > since` comparison works in whole
//! milliseconds, so a write committed in the same millisecond a
//! concurrent pull stamps as `server_time` lands on the wrong side of
//! that client's next delta. Handler serialization through the store
//! lock keeps the window under a millisecond, and a later write to the
//! row or an unwatermarked pull still surfaces it.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, Row};

use noted_core::{Note, NoteId, Notebook, NotebookId, Tag, TagId, UserId};

use super::{from_millis, millis, opt_from_millis, opt_millis};

const NOTEBOOK_COLUMNS: &str = "id, user_id, title, created_at, updated_at, deleted_at";
const NOTE_COLUMNS: &str = "id, notebook_id, user_id, content, plain_text, is_todo, is_done, \
                            reminder_at, version, created_at, updated_at, deleted_at";
const TAG_COLUMNS: &str = "id, user_id, name, color, created_at, updated_at, deleted_at";

pub struct SyncRepository<'a> {
    conn: &'a Connection,
}

impl<'a> SyncRepository<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    // -- notebooks --

    pub fn notebook(&self, id: &NotebookId) -> rusqlite::Result<Option<Notebook>> {
        let result = self.conn.query_row(
            &format!("SELECT {NOTEBOOK_COLUMNS} FROM notebooks WHERE id = ?"),
            [id.as_str()],
            parse_notebook,
        );
        optional(result)
    }

    pub fn insert_notebook(&self, notebook: &Notebook, owner: UserId) -> rusqlite::Result<()> {
        self.conn.execute(
            "INSERT INTO notebooks
               (id, user_id, title, created_at, updated_at, deleted_at, synced_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
            params![
                notebook.id.as_str(),
                owner.as_str(),
                notebook.title,
                millis(notebook.created_at),
                millis(notebook.updated_at),
                opt_millis(notebook.deleted_at),
                millis(Utc::now()),
            ],
        )?;
        Ok(())
    }

    pub fn update_notebook(&self, notebook: &Notebook) -> rusqlite::Result<()> {
        self.conn.execute(
            "UPDATE notebooks SET title = ?, updated_at = ?, deleted_at = ?, synced_at = ?
             WHERE id = ?",
            params![
                notebook.title,
                millis(notebook.updated_at),
                opt_millis(notebook.deleted_at),
                millis(Utc::now()),
                notebook.id.as_str(),
            ],
        )?;
        Ok(())
    }

    pub fn notebooks_for_user(
        &self,
        owner: UserId,
        since: Option<DateTime<Utc>>,
    ) -> rusqlite::Result<Vec<Notebook>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {NOTEBOOK_COLUMNS} FROM notebooks
             WHERE user_id = ?1 AND (?2 IS NULL OR synced_at > ?2)
             ORDER BY synced_at"
        ))?;
        let rows = stmt.query_map(
            params![owner.as_str(), opt_millis(since)],
            parse_notebook,
        )?;
        rows.collect()
    }

    // -- notes --

    pub fn note(&self, id: &NoteId) -> rusqlite::Result<Option<Note>> {
        let result = self.conn.query_row(
            &format!("SELECT {NOTE_COLUMNS} FROM notes WHERE id = ?"),
            [id.as_str()],
            parse_note,
        );
        match optional(result)? {
            Some(mut note) => {
                note.tag_ids = self.note_tag_ids(&note.id)?;
                Ok(Some(note))
            }
            None => Ok(None),
        }
    }

    /// Insert a note exactly as sent; creation keeps the client's
    /// version counter
    pub fn insert_note(&self, note: &Note, owner: UserId) -> rusqlite::Result<()> {
        self.conn.execute(
            "INSERT INTO notes (id, notebook_id, user_id, content, plain_text, is_todo,
                                is_done, reminder_at, version, created_at, updated_at,
                                deleted_at, synced_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            params![
                note.id.as_str(),
                note.notebook_id.as_str(),
                owner.as_str(),
                note.content.to_string(),
                note.plain_text,
                note.is_todo,
                note.is_done,
                opt_millis(note.reminder_at),
                note.version,
                millis(note.created_at),
                millis(note.updated_at),
                opt_millis(note.deleted_at),
                millis(Utc::now()),
            ],
        )?;
        self.replace_note_tags(&note.id, &note.tag_ids)
    }

    /// Overwrite a note's content with the incoming state, storing the
    /// server-advanced version counter
    pub fn update_note(&self, note: &Note, version: i64) -> rusqlite::Result<()> {
        self.conn.execute(
            "UPDATE notes SET notebook_id = ?, content = ?, plain_text = ?, is_todo = ?,
                              is_done = ?, reminder_at = ?, version = ?, updated_at = ?,
                              deleted_at = ?, synced_at = ?
             WHERE id = ?",
            params![
                note.notebook_id.as_str(),
                note.content.to_string(),
                note.plain_text,
                note.is_todo,
                note.is_done,
                opt_millis(note.reminder_at),
                version,
                millis(note.updated_at),
                opt_millis(note.deleted_at),
                millis(Utc::now()),
                note.id.as_str(),
            ],
        )?;
        self.replace_note_tags(&note.id, &note.tag_ids)
    }

    pub fn notes_for_user(
        &self,
        owner: UserId,
        since: Option<DateTime<Utc>>,
    ) -> rusqlite::Result<Vec<Note>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {NOTE_COLUMNS} FROM notes
             WHERE user_id = ?1 AND (?2 IS NULL OR synced_at > ?2)
             ORDER BY synced_at"
        ))?;
        let rows = stmt.query_map(params![owner.as_str(), opt_millis(since)], parse_note)?;
        let mut notes: Vec<Note> = rows.collect::<rusqlite::Result<_>>()?;
        for note in &mut notes {
            note.tag_ids = self.note_tag_ids(&note.id)?;
        }
        Ok(notes)
    }

    fn note_tag_ids(&self, id: &NoteId) -> rusqlite::Result<Vec<TagId>> {
        let mut stmt = self
            .conn
            .prepare("SELECT tag_id FROM note_tags WHERE note_id = ? ORDER BY tag_id")?;
        let rows = stmt.query_map([id.as_str()], |row| {
            let raw: String = row.get(0)?;
            raw.parse::<TagId>().map_err(|e| decode_err(0, e))
        })?;
        rows.collect()
    }

    fn replace_note_tags(&self, id: &NoteId, tag_ids: &[TagId]) -> rusqlite::Result<()> {
        self.conn
            .execute("DELETE FROM note_tags WHERE note_id = ?", [id.as_str()])?;
        let mut stmt = self
            .conn
            .prepare("INSERT INTO note_tags (note_id, tag_id) VALUES (?, ?)")?;
        for tag_id in tag_ids {
            stmt.execute(params![id.as_str(), tag_id.as_str()])?;
        }
        Ok(())
    }

    // -- tags --

    pub fn tag(&self, id: &TagId) -> rusqlite::Result<Option<Tag>> {
        let result = self.conn.query_row(
            &format!("SELECT {TAG_COLUMNS} FROM tags WHERE id = ?"),
            [id.as_str()],
            parse_tag,
        );
        optional(result)
    }

    pub fn insert_tag(&self, tag: &Tag, owner: UserId) -> rusqlite::Result<()> {
        self.conn.execute(
            "INSERT INTO tags
               (id, user_id, name, color, created_at, updated_at, deleted_at, synced_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
            params![
                tag.id.as_str(),
                owner.as_str(),
                tag.name,
                tag.color,
                millis(tag.created_at),
                millis(tag.updated_at),
                opt_millis(tag.deleted_at),
                millis(Utc::now()),
            ],
        )?;
        Ok(())
    }

    pub fn update_tag(&self, tag: &Tag) -> rusqlite::Result<()> {
        self.conn.execute(
            "UPDATE tags SET name = ?, color = ?, updated_at = ?, deleted_at = ?, synced_at = ?
             WHERE id = ?",
            params![
                tag.name,
                tag.color,
                millis(tag.updated_at),
                opt_millis(tag.deleted_at),
                millis(Utc::now()),
                tag.id.as_str(),
            ],
        )?;
        Ok(())
    }

    pub fn tags_for_user(
        &self,
        owner: UserId,
        since: Option<DateTime<Utc>>,
    ) -> rusqlite::Result<Vec<Tag>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {TAG_COLUMNS} FROM tags
             WHERE user_id = ?1 AND (?2 IS NULL OR synced_at > ?2)
             ORDER BY synced_at"
        ))?;
        let rows = stmt.query_map(params![owner.as_str(), opt_millis(since)], parse_tag)?;
        rows.collect()
    }
}

fn optional<T>(result: rusqlite::Result<T>) -> rusqlite::Result<Option<T>> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e),
    }
}

fn decode_err(
    idx: usize,
    err: impl Into<Box<dyn std::error::Error + Send + Sync + 'static>>,
) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, err.into())
}

fn parse_notebook(row: &Row<'_>) -> rusqlite::Result<Notebook> {
    let id: String = row.get(0)?;
    let user_id: String = row.get(1)?;
    Ok(Notebook {
        id: id.parse().map_err(|e| decode_err(0, e))?,
        user_id: Some(user_id.parse().map_err(|e| decode_err(1, e))?),
        title: row.get(2)?,
        created_at: from_millis(row.get(3)?),
        updated_at: from_millis(row.get(4)?),
        deleted_at: opt_from_millis(row.get(5)?),
    })
}

fn parse_note(row: &Row<'_>) -> rusqlite::Result<Note> {
    let id: String = row.get(0)?;
    let notebook_id: String = row.get(1)?;
    let user_id: String = row.get(2)?;
    let content: String = row.get(3)?;
    Ok(Note {
        id: id.parse().map_err(|e| decode_err(0, e))?,
        notebook_id: notebook_id.parse().map_err(|e| decode_err(1, e))?,
        user_id: Some(user_id.parse().map_err(|e| decode_err(2, e))?),
        content: serde_json::from_str(&content).map_err(|e| decode_err(3, e))?,
        plain_text: row.get(4)?,
        is_todo: row.get(5)?,
        is_done: row.get(6)?,
        reminder_at: opt_from_millis(row.get(7)?),
        version: row.get(8)?,
        tag_ids: Vec::new(),
        created_at: from_millis(row.get(9)?),
        updated_at: from_millis(row.get(10)?),
        deleted_at: opt_from_millis(row.get(11)?),
    })
}

fn parse_tag(row: &Row<'_>) -> rusqlite::Result<Tag> {
    let id: String = row.get(0)?;
    let user_id: String = row.get(1)?;
    Ok(Tag {
        id: id.parse().map_err(|e| decode_err(0, e))?,
        user_id: Some(user_id.parse().map_err(|e| decode_err(1, e))?),
        name: row.get(2)?,
        color: row.get(3)?,
        created_at: from_millis(row.get(4)?),
        updated_at: from_millis(row.get(5)?),
        deleted_at: opt_from_millis(row.get(6)?),
    })
}
