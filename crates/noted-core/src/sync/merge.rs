//! Folding server responses into the local store
//!
//! A pull result and a push result merge identically. The one rule
//! that matters: a record with an unacknowledged local edit is never
//! overwritten — its content has not even been offered to the server
//! yet, and the in-flight push will resolve it on a later cycle.

use crate::error::Result;
use crate::models::{Note, Notebook, Tag};
use crate::store::LocalStore;
use crate::sync::protocol::SyncResponse;
use crate::sync::status::SyncStatus;

/// What a merge did, for logging and tests
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeStats {
    /// Remote records inserted fresh
    pub inserted: usize,
    /// Synced local records overwritten with the server copy
    pub overwritten: usize,
    /// Tombstones applied to synced local records
    pub tombstoned: usize,
    /// Dirty local records left untouched
    pub preserved: usize,
}

/// Fold a server response into the local store
pub fn apply_response(store: &LocalStore, response: &SyncResponse) -> Result<MergeStats> {
    let mut stats = MergeStats::default();

    for remote in &response.notebooks {
        merge_notebook(store, remote, &mut stats)?;
    }
    for remote in &response.notes {
        merge_note(store, remote, &mut stats)?;
    }
    for remote in &response.tags {
        merge_tag(store, remote, &mut stats)?;
    }

    tracing::debug!(
        inserted = stats.inserted,
        overwritten = stats.overwritten,
        tombstoned = stats.tombstoned,
        preserved = stats.preserved,
        "Merged server response"
    );
    Ok(stats)
}

fn merge_notebook(store: &LocalStore, remote: &Notebook, stats: &mut MergeStats) -> Result<()> {
    match store.notebook(&remote.id)? {
        None => {
            // A tombstone for a record we never had needs no grave
            if !remote.is_tombstoned() {
                store.put_remote_notebook(remote)?;
                stats.inserted += 1;
            }
        }
        Some((local, meta)) if meta.status.is_dirty() => {
            if differs_notebook(&local, remote) {
                store.set_notebook_status(&local.id, SyncStatus::Conflict)?;
            }
            stats.preserved += 1;
        }
        Some(_) => {
            store.put_remote_notebook(remote)?;
            if remote.is_tombstoned() {
                stats.tombstoned += 1;
            } else {
                stats.overwritten += 1;
            }
        }
    }
    Ok(())
}

fn merge_note(store: &LocalStore, remote: &Note, stats: &mut MergeStats) -> Result<()> {
    match store.note(&remote.id)? {
        None => {
            if !remote.is_tombstoned() {
                store.put_remote_note(remote)?;
                stats.inserted += 1;
            }
        }
        Some((local, meta)) if meta.status.is_dirty() => {
            if differs_note(&local, remote) {
                store.set_note_status(&local.id, SyncStatus::Conflict)?;
            }
            stats.preserved += 1;
        }
        Some(_) => {
            store.put_remote_note(remote)?;
            if remote.is_tombstoned() {
                stats.tombstoned += 1;
            } else {
                stats.overwritten += 1;
            }
        }
    }
    Ok(())
}

fn merge_tag(store: &LocalStore, remote: &Tag, stats: &mut MergeStats) -> Result<()> {
    match store.tag(&remote.id)? {
        None => {
            if !remote.is_tombstoned() {
                store.put_remote_tag(remote)?;
                stats.inserted += 1;
            }
        }
        Some((local, meta)) if meta.status.is_dirty() => {
            if differs_tag(&local, remote) {
                store.set_tag_status(&local.id, SyncStatus::Conflict)?;
            }
            stats.preserved += 1;
        }
        Some(_) => {
            store.put_remote_tag(remote)?;
            if remote.is_tombstoned() {
                stats.tombstoned += 1;
            } else {
                stats.overwritten += 1;
            }
        }
    }
    Ok(())
}

// Ownership is server-asserted and never stored locally, so it is
// masked out of the comparisons.

fn differs_notebook(local: &Notebook, remote: &Notebook) -> bool {
    let mut remote = remote.clone();
    remote.user_id = None;
    *local != remote
}

fn differs_note(local: &Note, remote: &Note) -> bool {
    let mut remote = remote.clone();
    remote.user_id = None;
    *local != remote
}

fn differs_tag(local: &Tag, remote: &Tag) -> bool {
    let mut remote = remote.clone();
    remote.user_id = None;
    *local != remote
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use pretty_assertions::assert_eq;
    use serde_json::Value;

    fn setup() -> LocalStore {
        LocalStore::open_in_memory().unwrap()
    }

    fn response_with(
        notebooks: Vec<Notebook>,
        notes: Vec<Note>,
        tags: Vec<Tag>,
    ) -> SyncResponse {
        SyncResponse {
            notebooks,
            notes,
            tags,
            server_time: Utc::now(),
            has_conflict: false,
        }
    }

    #[test]
    fn test_unknown_record_inserted_as_synced() {
        let store = setup();
        let remote = Notebook::new("From server");

        let stats = apply_response(&store, &response_with(vec![remote.clone()], vec![], vec![]))
            .unwrap();
        assert_eq!(stats.inserted, 1);

        let (found, meta) = store.notebook(&remote.id).unwrap().unwrap();
        assert_eq!(found.title, "From server");
        assert_eq!(meta.status, SyncStatus::Synced);
    }

    #[test]
    fn test_pending_record_is_never_clobbered() {
        let store = setup();
        let nb = store.create_notebook("Local title").unwrap();

        let mut remote = nb.clone();
        remote.title = "Server title".to_string();
        remote.touch();
        apply_response(&store, &response_with(vec![remote], vec![], vec![])).unwrap();

        let (found, meta) = store.notebook(&nb.id).unwrap().unwrap();
        assert_eq!(found.title, "Local title");
        assert_eq!(meta.status, SyncStatus::Conflict);
    }

    #[test]
    fn test_identical_remote_copy_leaves_pending_without_conflict() {
        let store = setup();
        let nb = store.create_notebook("Same").unwrap();
        let (local, _) = store.notebook(&nb.id).unwrap().unwrap();

        apply_response(&store, &response_with(vec![local], vec![], vec![])).unwrap();
        let (_, meta) = store.notebook(&nb.id).unwrap().unwrap();
        assert_eq!(meta.status, SyncStatus::Pending);
    }

    #[test]
    fn test_synced_record_fully_overwritten() {
        let store = setup();
        let nb = store.create_notebook("Old").unwrap();
        store.put_remote_notebook(&nb).unwrap();

        let mut remote = nb.clone();
        remote.title = "New".to_string();
        remote.touch();
        let stats =
            apply_response(&store, &response_with(vec![remote], vec![], vec![])).unwrap();
        assert_eq!(stats.overwritten, 1);

        let (found, meta) = store.notebook(&nb.id).unwrap().unwrap();
        assert_eq!(found.title, "New");
        assert_eq!(meta.status, SyncStatus::Synced);
    }

    #[test]
    fn test_remote_tombstone_applies_to_synced_record() {
        let store = setup();
        let nb = store.create_notebook("Main").unwrap();
        let note = store.create_note(nb.id, Value::Null, "bye").unwrap();
        let (stored, _) = store.note(&note.id).unwrap().unwrap();
        store.put_remote_note(&stored).unwrap();

        let mut remote = stored;
        remote.tombstone();
        let stats = apply_response(&store, &response_with(vec![], vec![remote], vec![])).unwrap();
        assert_eq!(stats.tombstoned, 1);

        // Both sides have observed the tombstone, so it is purgeable
        store.purge_acknowledged_tombstones().unwrap();
        assert!(store.note(&note.id).unwrap().is_none());
    }

    #[test]
    fn test_remote_tombstone_does_not_purge_pending_edit() {
        let store = setup();
        let nb = store.create_notebook("Main").unwrap();
        let note = store.create_note(nb.id, Value::Null, "mid-edit").unwrap();

        let mut remote = store.note(&note.id).unwrap().unwrap().0;
        remote.tombstone();
        apply_response(&store, &response_with(vec![], vec![remote], vec![])).unwrap();

        let (found, _) = store.note(&note.id).unwrap().unwrap();
        assert!(!found.is_tombstoned());
        store.purge_acknowledged_tombstones().unwrap();
        assert!(store.note(&note.id).unwrap().is_some());
    }

    #[test]
    fn test_tombstone_for_unknown_record_is_ignored() {
        let store = setup();
        let mut ghost = Tag::new("ghost");
        ghost.tombstone();

        let stats = apply_response(&store, &response_with(vec![], vec![], vec![ghost.clone()]))
            .unwrap();
        assert_eq!(stats, MergeStats::default());
        assert!(store.tag(&ghost.id).unwrap().is_none());
    }

    #[test]
    fn test_server_asserted_ownership_does_not_trigger_conflict() {
        let store = setup();
        let nb = store.create_notebook("Mine").unwrap();

        let mut remote = store.notebook(&nb.id).unwrap().unwrap().0;
        remote.user_id = Some(crate::models::UserId::new());
        apply_response(&store, &response_with(vec![remote], vec![], vec![])).unwrap();

        let (_, meta) = store.notebook(&nb.id).unwrap().unwrap();
        assert_eq!(meta.status, SyncStatus::Pending);
    }
}
