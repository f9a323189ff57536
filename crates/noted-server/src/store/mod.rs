//! Authoritative server-side store
//!
//! One SQLite database holding every user's records. Timestamps are
//! stored as Unix milliseconds; `deleted_at` tombstones are kept
//! forever so late-syncing devices can still learn about deletions.

mod migrations;
mod repository;

pub use repository::SyncRepository;

use std::path::Path;

use chrono::{DateTime, TimeZone, Utc};
use rusqlite::{Connection, TransactionBehavior};

use crate::error::AppError;

pub struct AuthoritativeStore {
    conn: Connection,
}

impl AuthoritativeStore {
    /// Open the store at the given path, creating it if needed
    pub fn open(path: impl AsRef<Path>) -> Result<Self, AppError> {
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| AppError::internal(format!("cannot create data directory: {e}")))?;
        }
        let conn = Connection::open(path)?;
        let store = Self { conn };
        store.configure();
        migrations::run(&store.conn)?;
        Ok(store)
    }

    /// Open an in-memory store (useful for testing)
    pub fn open_in_memory() -> Result<Self, AppError> {
        let conn = Connection::open_in_memory()?;
        let store = Self { conn };
        store.configure();
        migrations::run(&store.conn)?;
        Ok(store)
    }

    fn configure(&self) {
        // WAL is unavailable for in-memory databases; ignore failures
        self.conn.pragma_update(None, "journal_mode", "WAL").ok();
        self.conn.pragma_update(None, "synchronous", "NORMAL").ok();
    }

    /// Read-only access outside a transaction
    pub fn repo(&self) -> SyncRepository<'_> {
        SyncRepository::new(&self.conn)
    }

    /// Run the closure inside one immediate transaction; an error rolls
    /// everything back
    pub fn with_transaction<T>(
        &mut self,
        f: impl FnOnce(&SyncRepository<'_>) -> Result<T, AppError>,
    ) -> Result<T, AppError> {
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;
        let out = {
            let repo = SyncRepository::new(&tx);
            f(&repo)?
        };
        tx.commit()?;
        Ok(out)
    }
}

/// Unix-millisecond representation used by the timestamp columns
pub(crate) fn millis(at: DateTime<Utc>) -> i64 {
    at.timestamp_millis()
}

pub(crate) fn opt_millis(at: Option<DateTime<Utc>>) -> Option<i64> {
    at.map(millis)
}

pub(crate) fn from_millis(ms: i64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(ms)
        .single()
        .unwrap_or(DateTime::UNIX_EPOCH)
}

pub(crate) fn opt_from_millis(ms: Option<i64>) -> Option<DateTime<Utc>> {
    ms.map(from_millis)
}

#[cfg(test)]
mod tests {
    use super::*;
    use noted_core::{Note, Notebook, Tag, UserId};
    use pretty_assertions::assert_eq;
    use serde_json::Value;

    #[test]
    fn test_insert_then_read_back_scoped_to_owner() {
        let store = AuthoritativeStore::open_in_memory().unwrap();
        let owner = UserId::new();
        let stranger = UserId::new();
        let repo = store.repo();

        let nb = Notebook::new("Work");
        repo.insert_notebook(&nb, owner).unwrap();
        let mut note = Note::from_text(nb.id, "hello");
        let tag = Tag::new("Urgent");
        repo.insert_tag(&tag, owner).unwrap();
        note.tag_ids = vec![tag.id];
        repo.insert_note(&note, owner).unwrap();

        let notebooks = repo.notebooks_for_user(owner, None).unwrap();
        assert_eq!(notebooks.len(), 1);
        assert_eq!(notebooks[0].user_id, Some(owner));

        let notes = repo.notes_for_user(owner, None).unwrap();
        assert_eq!(notes[0].tag_ids, vec![tag.id]);
        assert_eq!(notes[0].content, note.content);

        assert!(repo.notebooks_for_user(stranger, None).unwrap().is_empty());
        assert!(repo.notes_for_user(stranger, None).unwrap().is_empty());
        assert!(repo.tags_for_user(stranger, None).unwrap().is_empty());
    }

    #[test]
    fn test_changed_since_filters_older_rows() {
        let store = AuthoritativeStore::open_in_memory().unwrap();
        let owner = UserId::new();
        let repo = store.repo();

        let nb = Notebook::new("Old");
        repo.insert_notebook(&nb, owner).unwrap();

        let cutoff = nb.updated_at + chrono::Duration::seconds(1);
        assert!(repo.notebooks_for_user(owner, Some(cutoff)).unwrap().is_empty());
        assert_eq!(
            repo.notebooks_for_user(owner, Some(nb.updated_at - chrono::Duration::seconds(1)))
                .unwrap()
                .len(),
            1
        );
    }

    #[test]
    fn test_open_creates_data_directory_and_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data").join("server.db");
        let owner = UserId::new();

        {
            let store = AuthoritativeStore::open(&path).unwrap();
            store
                .repo()
                .insert_notebook(&Notebook::new("Durable"), owner)
                .unwrap();
        }

        let store = AuthoritativeStore::open(&path).unwrap();
        let notebooks = store.repo().notebooks_for_user(owner, None).unwrap();
        assert_eq!(notebooks.len(), 1);
        assert_eq!(notebooks[0].title, "Durable");
    }

    #[test]
    fn test_transaction_rolls_back_on_error() {
        let mut store = AuthoritativeStore::open_in_memory().unwrap();
        let owner = UserId::new();
        let nb = Notebook::new("Doomed");

        let result: Result<(), AppError> = store.with_transaction(|repo| {
            repo.insert_notebook(&nb, owner)?;
            Err(AppError::internal("forced failure"))
        });
        assert!(result.is_err());

        assert!(store.repo().notebook(&nb.id).unwrap().is_none());
    }

    #[test]
    fn test_note_update_stores_given_version() {
        let store = AuthoritativeStore::open_in_memory().unwrap();
        let owner = UserId::new();
        let repo = store.repo();

        let nb = Notebook::new("Work");
        repo.insert_notebook(&nb, owner).unwrap();
        let mut note = Note::new(nb.id, Value::Null, "v1");
        repo.insert_note(&note, owner).unwrap();

        note.plain_text = "v2".to_string();
        note.touch();
        repo.update_note(&note, 2).unwrap();

        let stored = repo.note(&note.id).unwrap().unwrap();
        assert_eq!(stored.version, 2);
        assert_eq!(stored.plain_text, "v2");
    }
}
