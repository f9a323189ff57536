//! Notebook storage operations

use chrono::{DateTime, Utc};
use rusqlite::{params, Row};

use crate::error::{Error, Result};
use crate::models::{Notebook, NotebookId};
use crate::sync::{SyncMeta, SyncStatus};

use super::{
    column_decode_err, from_millis, millis, opt_from_millis, opt_millis, status_from_row,
    LocalStore,
};

const COLUMNS: &str = "id, title, created_at, updated_at, deleted_at,
                       sync_status, locally_modified_at, server_version";

impl LocalStore {
    /// Create a notebook; starts life as a pending creation
    pub fn create_notebook(&self, title: &str) -> Result<Notebook> {
        let notebook = Notebook::new(title);
        self.conn.execute(
            "INSERT INTO notebooks (id, title, created_at, updated_at, deleted_at,
                                    sync_status, locally_modified_at, server_version)
             VALUES (?, ?, ?, ?, NULL, 'pending', ?, 0)",
            params![
                notebook.id.as_str(),
                notebook.title,
                millis(notebook.created_at),
                millis(notebook.updated_at),
                millis(notebook.updated_at),
            ],
        )?;
        Ok(notebook)
    }

    /// Rename a notebook, marking it dirty
    pub fn rename_notebook(&self, id: &NotebookId, title: &str) -> Result<Notebook> {
        let now = millis(Utc::now());
        let rows = self.conn.execute(
            "UPDATE notebooks
             SET title = ?, updated_at = ?, sync_status = 'pending', locally_modified_at = ?
             WHERE id = ? AND deleted_at IS NULL",
            params![title, now, now, id.as_str()],
        )?;
        if rows == 0 {
            return Err(Error::NotFound(id.to_string()));
        }
        self.notebook(id)?
            .map(|(notebook, _)| notebook)
            .ok_or_else(|| Error::NotFound(id.to_string()))
    }

    /// Tombstone a notebook; the row survives until every replica has
    /// observed the deletion
    pub fn delete_notebook(&self, id: &NotebookId) -> Result<()> {
        let now = millis(Utc::now());
        let rows = self.conn.execute(
            "UPDATE notebooks
             SET deleted_at = ?, updated_at = ?, sync_status = 'pending', locally_modified_at = ?
             WHERE id = ? AND deleted_at IS NULL",
            params![now, now, now, id.as_str()],
        )?;
        if rows == 0 {
            return Err(Error::NotFound(id.to_string()));
        }
        Ok(())
    }

    /// List active notebooks, most recently updated first
    pub fn notebooks(&self) -> Result<Vec<Notebook>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {COLUMNS} FROM notebooks WHERE deleted_at IS NULL ORDER BY updated_at DESC"
        ))?;
        let notebooks = stmt
            .query_map([], |row| parse_row(row).map(|(notebook, _)| notebook))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(notebooks)
    }

    /// Look up a notebook in any lifecycle state, with its sync metadata
    pub fn notebook(&self, id: &NotebookId) -> Result<Option<(Notebook, SyncMeta)>> {
        let result = self.conn.query_row(
            &format!("SELECT {COLUMNS} FROM notebooks WHERE id = ?"),
            params![id.as_str()],
            parse_row,
        );
        match result {
            Ok(found) => Ok(Some(found)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Every notebook still waiting for server acknowledgement
    pub fn dirty_notebooks(&self) -> Result<Vec<(Notebook, SyncMeta)>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {COLUMNS} FROM notebooks WHERE sync_status != 'synced' ORDER BY updated_at"
        ))?;
        let notebooks = stmt
            .query_map([], parse_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(notebooks)
    }

    /// Store a server-confirmed copy verbatim, replacing whatever is
    /// local; callers must have decided the record is safe to overwrite
    pub fn put_remote_notebook(&self, notebook: &Notebook) -> Result<()> {
        self.conn.execute(
            "INSERT OR REPLACE INTO notebooks
               (id, title, created_at, updated_at, deleted_at,
                sync_status, locally_modified_at, server_version)
             VALUES (?, ?, ?, ?, ?, 'synced', NULL, ?)",
            params![
                notebook.id.as_str(),
                notebook.title,
                millis(notebook.created_at),
                millis(notebook.updated_at),
                opt_millis(notebook.deleted_at),
                millis(notebook.updated_at),
            ],
        )?;
        Ok(())
    }

    /// Flip only the acknowledgement status
    pub fn set_notebook_status(&self, id: &NotebookId, status: SyncStatus) -> Result<()> {
        self.conn.execute(
            "UPDATE notebooks SET sync_status = ? WHERE id = ?",
            params![status.as_str(), id.as_str()],
        )?;
        Ok(())
    }

    /// Mark pushed notebooks acknowledged, clearing the local-edit clock
    ///
    /// Each id carries the clock captured when the push batch was
    /// gathered; a record edited since no longer matches and stays
    /// pending for the next cycle.
    pub fn mark_notebooks_synced(
        &self,
        ids: &[(NotebookId, Option<DateTime<Utc>>)],
    ) -> Result<()> {
        for (id, modified_at) in ids {
            self.conn.execute(
                "UPDATE notebooks SET sync_status = 'synced', locally_modified_at = NULL
                 WHERE id = ? AND locally_modified_at IS ?",
                params![id.as_str(), opt_millis(*modified_at)],
            )?;
        }
        Ok(())
    }
}

fn parse_row(row: &Row<'_>) -> rusqlite::Result<(Notebook, SyncMeta)> {
    let id: String = row.get(0)?;
    let status: String = row.get(5)?;
    let notebook = Notebook {
        id: id.parse().map_err(|e| column_decode_err(0, e))?,
        user_id: None,
        title: row.get(1)?,
        created_at: from_millis(row.get(2)?),
        updated_at: from_millis(row.get(3)?),
        deleted_at: opt_from_millis(row.get(4)?),
    };
    let meta = SyncMeta {
        status: status_from_row(5, &status)?,
        locally_modified_at: opt_from_millis(row.get(6)?),
        server_version: row.get(7)?,
    };
    Ok((notebook, meta))
}
