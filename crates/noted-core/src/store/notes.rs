//! Note storage operations

use chrono::{DateTime, Utc};
use rusqlite::{params, Row};
use serde_json::Value;

use crate::error::{Error, Result};
use crate::models::{Note, NoteId, NotebookId, TagId};
use crate::sync::{SyncMeta, SyncStatus};

use super::{
    column_decode_err, from_millis, millis, opt_from_millis, opt_millis, status_from_row,
    LocalStore,
};

const COLUMNS: &str = "id, notebook_id, content, plain_text, is_todo, is_done, reminder_at,
                       version, created_at, updated_at, deleted_at,
                       sync_status, locally_modified_at, server_version";

impl LocalStore {
    /// Create a note; starts life as a pending creation
    pub fn create_note(
        &self,
        notebook_id: NotebookId,
        content: Value,
        plain_text: &str,
    ) -> Result<Note> {
        let note = Note::new(notebook_id, content, plain_text);
        self.conn.execute(
            "INSERT INTO notes (id, notebook_id, content, plain_text, is_todo, is_done,
                                reminder_at, version, created_at, updated_at, deleted_at,
                                sync_status, locally_modified_at, server_version)
             VALUES (?, ?, ?, ?, 0, 0, NULL, 1, ?, ?, NULL, 'pending', ?, 0)",
            params![
                note.id.as_str(),
                note.notebook_id.as_str(),
                serde_json::to_string(&note.content)?,
                note.plain_text,
                millis(note.created_at),
                millis(note.updated_at),
                millis(note.updated_at),
            ],
        )?;
        Ok(note)
    }

    /// Save caller-side edits to a note, marking it dirty
    ///
    /// The stored `version` is kept as-is: the counter is only advanced
    /// by the server when a push wins, never by a local edit.
    pub fn update_note(&self, note: &Note) -> Result<Note> {
        let now = millis(Utc::now());
        let rows = self.conn.execute(
            "UPDATE notes
             SET notebook_id = ?, content = ?, plain_text = ?, is_todo = ?, is_done = ?,
                 reminder_at = ?, updated_at = ?, sync_status = 'pending',
                 locally_modified_at = ?
             WHERE id = ? AND deleted_at IS NULL",
            params![
                note.notebook_id.as_str(),
                serde_json::to_string(&note.content)?,
                note.plain_text,
                i32::from(note.is_todo),
                i32::from(note.is_done),
                opt_millis(note.reminder_at),
                now,
                now,
                note.id.as_str(),
            ],
        )?;
        if rows == 0 {
            return Err(Error::NotFound(note.id.to_string()));
        }
        self.replace_note_tags(&note.id, &note.tag_ids)?;
        self.note(&note.id)?
            .map(|(stored, _)| stored)
            .ok_or_else(|| Error::NotFound(note.id.to_string()))
    }

    /// Tombstone a note; the row survives until every replica has
    /// observed the deletion
    pub fn delete_note(&self, id: &NoteId) -> Result<()> {
        let now = millis(Utc::now());
        let rows = self.conn.execute(
            "UPDATE notes
             SET deleted_at = ?, updated_at = ?, sync_status = 'pending', locally_modified_at = ?
             WHERE id = ? AND deleted_at IS NULL",
            params![now, now, now, id.as_str()],
        )?;
        if rows == 0 {
            return Err(Error::NotFound(id.to_string()));
        }
        Ok(())
    }

    /// List active notes, most recently updated first
    pub fn notes(&self) -> Result<Vec<Note>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {COLUMNS} FROM notes WHERE deleted_at IS NULL ORDER BY updated_at DESC"
        ))?;
        let notes = stmt
            .query_map([], |row| parse_row(row).map(|(note, _)| note))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        self.attach_tags(notes)
    }

    /// List active notes within one notebook
    pub fn notes_in(&self, notebook_id: &NotebookId) -> Result<Vec<Note>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {COLUMNS} FROM notes
             WHERE notebook_id = ? AND deleted_at IS NULL
             ORDER BY updated_at DESC"
        ))?;
        let notes = stmt
            .query_map(params![notebook_id.as_str()], |row| {
                parse_row(row).map(|(note, _)| note)
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        self.attach_tags(notes)
    }

    /// Look up a note in any lifecycle state, with its sync metadata
    pub fn note(&self, id: &NoteId) -> Result<Option<(Note, SyncMeta)>> {
        let result = self.conn.query_row(
            &format!("SELECT {COLUMNS} FROM notes WHERE id = ?"),
            params![id.as_str()],
            parse_row,
        );
        match result {
            Ok((mut note, meta)) => {
                note.tag_ids = self.note_tag_ids(&note.id)?;
                Ok(Some((note, meta)))
            }
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Every note still waiting for server acknowledgement
    pub fn dirty_notes(&self) -> Result<Vec<(Note, SyncMeta)>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {COLUMNS} FROM notes WHERE sync_status != 'synced' ORDER BY updated_at"
        ))?;
        let mut notes = stmt
            .query_map([], parse_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        for (note, _) in &mut notes {
            note.tag_ids = self.note_tag_ids(&note.id)?;
        }
        Ok(notes)
    }

    /// Store a server-confirmed copy verbatim, replacing whatever is
    /// local; callers must have decided the record is safe to overwrite
    pub fn put_remote_note(&self, note: &Note) -> Result<()> {
        self.conn.execute(
            "INSERT OR REPLACE INTO notes
               (id, notebook_id, content, plain_text, is_todo, is_done, reminder_at,
                version, created_at, updated_at, deleted_at,
                sync_status, locally_modified_at, server_version)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 'synced', NULL, ?)",
            params![
                note.id.as_str(),
                note.notebook_id.as_str(),
                serde_json::to_string(&note.content)?,
                note.plain_text,
                i32::from(note.is_todo),
                i32::from(note.is_done),
                opt_millis(note.reminder_at),
                note.version,
                millis(note.created_at),
                millis(note.updated_at),
                opt_millis(note.deleted_at),
                note.version,
            ],
        )?;
        self.replace_note_tags(&note.id, &note.tag_ids)?;
        Ok(())
    }

    /// Flip only the acknowledgement status
    pub fn set_note_status(&self, id: &NoteId, status: SyncStatus) -> Result<()> {
        self.conn.execute(
            "UPDATE notes SET sync_status = ? WHERE id = ?",
            params![status.as_str(), id.as_str()],
        )?;
        Ok(())
    }

    /// Mark pushed notes acknowledged, clearing the local-edit clock
    ///
    /// Each id carries the clock captured when the push batch was
    /// gathered; a record edited since no longer matches and stays
    /// pending for the next cycle.
    pub fn mark_notes_synced(&self, ids: &[(NoteId, Option<DateTime<Utc>>)]) -> Result<()> {
        for (id, modified_at) in ids {
            self.conn.execute(
                "UPDATE notes SET sync_status = 'synced', locally_modified_at = NULL
                 WHERE id = ? AND locally_modified_at IS ?",
                params![id.as_str(), opt_millis(*modified_at)],
            )?;
        }
        Ok(())
    }

    fn note_tag_ids(&self, id: &NoteId) -> Result<Vec<TagId>> {
        let mut stmt = self
            .conn
            .prepare("SELECT tag_id FROM note_tags WHERE note_id = ? ORDER BY tag_id")?;
        let ids = stmt
            .query_map(params![id.as_str()], |row| {
                let raw: String = row.get(0)?;
                raw.parse().map_err(|e| column_decode_err(0, e))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(ids)
    }

    fn replace_note_tags(&self, id: &NoteId, tag_ids: &[TagId]) -> Result<()> {
        self.conn.execute(
            "DELETE FROM note_tags WHERE note_id = ?",
            params![id.as_str()],
        )?;
        for tag_id in tag_ids {
            self.conn.execute(
                "INSERT OR IGNORE INTO note_tags (note_id, tag_id) VALUES (?, ?)",
                params![id.as_str(), tag_id.as_str()],
            )?;
        }
        Ok(())
    }

    fn attach_tags(&self, mut notes: Vec<Note>) -> Result<Vec<Note>> {
        for note in &mut notes {
            note.tag_ids = self.note_tag_ids(&note.id)?;
        }
        Ok(notes)
    }
}

fn parse_row(row: &Row<'_>) -> rusqlite::Result<(Note, SyncMeta)> {
    let id: String = row.get(0)?;
    let notebook_id: String = row.get(1)?;
    let content: String = row.get(2)?;
    let status: String = row.get(11)?;
    let note = Note {
        id: id.parse().map_err(|e| column_decode_err(0, e))?,
        notebook_id: notebook_id.parse().map_err(|e| column_decode_err(1, e))?,
        user_id: None,
        content: serde_json::from_str(&content).map_err(|e| column_decode_err(2, e))?,
        plain_text: row.get(3)?,
        is_todo: row.get::<_, i32>(4)? != 0,
        is_done: row.get::<_, i32>(5)? != 0,
        reminder_at: opt_from_millis(row.get(6)?),
        version: row.get(7)?,
        tag_ids: Vec::new(),
        created_at: from_millis(row.get(8)?),
        updated_at: from_millis(row.get(9)?),
        deleted_at: opt_from_millis(row.get(10)?),
    };
    let meta = SyncMeta {
        status: status_from_row(11, &status)?,
        locally_modified_at: opt_from_millis(row.get(12)?),
        server_version: row.get(13)?,
    };
    Ok((note, meta))
}
