//! Tag storage operations

use chrono::{DateTime, Utc};
use rusqlite::{params, Row};

use crate::error::{Error, Result};
use crate::models::{Tag, TagId};
use crate::sync::{SyncMeta, SyncStatus};

use super::{
    column_decode_err, from_millis, millis, opt_from_millis, opt_millis, status_from_row,
    LocalStore,
};

const COLUMNS: &str = "id, name, color, created_at, updated_at, deleted_at,
                       sync_status, locally_modified_at, server_version";

impl LocalStore {
    /// Create a tag; starts life as a pending creation
    pub fn create_tag(&self, name: &str, color: Option<&str>) -> Result<Tag> {
        let mut tag = Tag::new(name);
        if let Some(color) = color {
            tag = tag.with_color(color);
        }
        self.conn.execute(
            "INSERT INTO tags (id, name, color, created_at, updated_at, deleted_at,
                               sync_status, locally_modified_at, server_version)
             VALUES (?, ?, ?, ?, ?, NULL, 'pending', ?, 0)",
            params![
                tag.id.as_str(),
                tag.name,
                tag.color,
                millis(tag.created_at),
                millis(tag.updated_at),
                millis(tag.updated_at),
            ],
        )?;
        Ok(tag)
    }

    /// Tombstone a tag and unlink it from every note
    pub fn delete_tag(&self, id: &TagId) -> Result<()> {
        let now = millis(Utc::now());
        let rows = self.conn.execute(
            "UPDATE tags
             SET deleted_at = ?, updated_at = ?, sync_status = 'pending', locally_modified_at = ?
             WHERE id = ? AND deleted_at IS NULL",
            params![now, now, now, id.as_str()],
        )?;
        if rows == 0 {
            return Err(Error::NotFound(id.to_string()));
        }
        self.conn.execute(
            "DELETE FROM note_tags WHERE tag_id = ?",
            params![id.as_str()],
        )?;
        Ok(())
    }

    /// List active tags, alphabetically
    pub fn tags(&self) -> Result<Vec<Tag>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {COLUMNS} FROM tags WHERE deleted_at IS NULL ORDER BY name"
        ))?;
        let tags = stmt
            .query_map([], |row| parse_row(row).map(|(tag, _)| tag))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(tags)
    }

    /// Look up a tag in any lifecycle state, with its sync metadata
    pub fn tag(&self, id: &TagId) -> Result<Option<(Tag, SyncMeta)>> {
        let result = self.conn.query_row(
            &format!("SELECT {COLUMNS} FROM tags WHERE id = ?"),
            params![id.as_str()],
            parse_row,
        );
        match result {
            Ok(found) => Ok(Some(found)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Find an active tag by name, case-insensitively
    pub fn tag_by_name(&self, name: &str) -> Result<Option<Tag>> {
        let result = self.conn.query_row(
            &format!(
                "SELECT {COLUMNS} FROM tags
                 WHERE name = ? COLLATE NOCASE AND deleted_at IS NULL"
            ),
            params![name],
            |row| parse_row(row).map(|(tag, _)| tag),
        );
        match result {
            Ok(tag) => Ok(Some(tag)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Every tag still waiting for server acknowledgement
    pub fn dirty_tags(&self) -> Result<Vec<(Tag, SyncMeta)>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {COLUMNS} FROM tags WHERE sync_status != 'synced' ORDER BY updated_at"
        ))?;
        let tags = stmt
            .query_map([], parse_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(tags)
    }

    /// Store a server-confirmed copy verbatim, replacing whatever is
    /// local; callers must have decided the record is safe to overwrite
    pub fn put_remote_tag(&self, tag: &Tag) -> Result<()> {
        self.conn.execute(
            "INSERT OR REPLACE INTO tags
               (id, name, color, created_at, updated_at, deleted_at,
                sync_status, locally_modified_at, server_version)
             VALUES (?, ?, ?, ?, ?, ?, 'synced', NULL, ?)",
            params![
                tag.id.as_str(),
                tag.name,
                tag.color,
                millis(tag.created_at),
                millis(tag.updated_at),
                opt_millis(tag.deleted_at),
                millis(tag.updated_at),
            ],
        )?;
        Ok(())
    }

    /// Flip only the acknowledgement status
    pub fn set_tag_status(&self, id: &TagId, status: SyncStatus) -> Result<()> {
        self.conn.execute(
            "UPDATE tags SET sync_status = ? WHERE id = ?",
            params![status.as_str(), id.as_str()],
        )?;
        Ok(())
    }

    /// Mark pushed tags acknowledged, clearing the local-edit clock
    ///
    /// Each id carries the clock captured when the push batch was
    /// gathered; a record edited since no longer matches and stays
    /// pending for the next cycle.
    pub fn mark_tags_synced(&self, ids: &[(TagId, Option<DateTime<Utc>>)]) -> Result<()> {
        for (id, modified_at) in ids {
            self.conn.execute(
                "UPDATE tags SET sync_status = 'synced', locally_modified_at = NULL
                 WHERE id = ? AND locally_modified_at IS ?",
                params![id.as_str(), opt_millis(*modified_at)],
            )?;
        }
        Ok(())
    }
}

fn parse_row(row: &Row<'_>) -> rusqlite::Result<(Tag, SyncMeta)> {
    let id: String = row.get(0)?;
    let status: String = row.get(6)?;
    let tag = Tag {
        id: id.parse().map_err(|e| column_decode_err(0, e))?,
        user_id: None,
        name: row.get(1)?,
        color: row.get(2)?,
        created_at: from_millis(row.get(3)?),
        updated_at: from_millis(row.get(4)?),
        deleted_at: opt_from_millis(row.get(5)?),
    };
    let meta = SyncMeta {
        status: status_from_row(6, &status)?,
        locally_modified_at: opt_from_millis(row.get(7)?),
        server_version: row.get(8)?,
    };
    Ok((tag, meta))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn setup() -> LocalStore {
        LocalStore::open_in_memory().unwrap()
    }

    #[test]
    fn test_create_and_find_by_name() {
        let store = setup();
        let tag = store.create_tag("Work", Some("#00ff00")).unwrap();
        assert_eq!(tag.name, "work");

        let found = store.tag_by_name("WORK").unwrap().unwrap();
        assert_eq!(found.id, tag.id);
        assert_eq!(found.color, "#00ff00");
    }

    #[test]
    fn test_delete_unlinks_notes() {
        let store = setup();
        let nb = store.create_notebook("Main").unwrap();
        let tag = store.create_tag("old", None).unwrap();
        let mut note = store
            .create_note(nb.id, serde_json::Value::Null, "tagged")
            .unwrap();
        note.tag_ids = vec![tag.id];
        store.update_note(&note).unwrap();

        store.delete_tag(&tag.id).unwrap();
        assert!(store.tags().unwrap().is_empty());
        let (note, _) = store.note(&note.id).unwrap().unwrap();
        assert!(note.tag_ids.is_empty());
    }

    #[test]
    fn test_dirty_and_mark_synced() {
        let store = setup();
        let tag = store.create_tag("inbox", None).unwrap();
        assert_eq!(store.dirty_tags().unwrap().len(), 1);

        let (_, captured) = store.tag(&tag.id).unwrap().unwrap();
        store
            .mark_tags_synced(&[(tag.id, captured.locally_modified_at)])
            .unwrap();
        assert!(store.dirty_tags().unwrap().is_empty());
    }
}
