//! Change tracking
//!
//! Local mutations mark records dirty inside the store itself; this
//! module turns the dirty set into a classified batch of outstanding
//! work. Classification is computed from sync metadata at query time,
//! never stored, so a record created and then edited before its first
//! sync still travels as a single creation.

use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::models::{Note, NoteId, Notebook, NotebookId, Tag, TagId};
use crate::store::LocalStore;
use crate::sync::protocol::SyncRequest;
use crate::sync::status::SyncMeta;

/// Reads outstanding local changes out of the store
pub struct ChangeTracker<'a> {
    store: &'a LocalStore,
}

/// Records of all three entity kinds belonging to one change class
#[derive(Debug, Clone, Default)]
pub struct ChangeSet {
    pub notebooks: Vec<Notebook>,
    pub notes: Vec<Note>,
    pub tags: Vec<Tag>,
}

impl ChangeSet {
    fn is_empty(&self) -> bool {
        self.notebooks.is_empty() && self.notes.is_empty() && self.tags.is_empty()
    }

    fn record_count(&self) -> usize {
        self.notebooks.len() + self.notes.len() + self.tags.len()
    }
}

/// Outstanding local changes, classified by operation kind
///
/// A record appears in exactly one bucket per snapshot.
#[derive(Debug, Clone, Default)]
pub struct PendingChanges {
    /// Records the server has never confirmed (`server_version` unset)
    pub created: ChangeSet,
    /// Previously synced records mutated since
    pub updated: ChangeSet,
    /// Previously synced records tombstoned since
    pub deleted: ChangeSet,
    ids: PushedIds,
}

/// Ids of every record included in a push payload, each paired with the
/// local-edit clock at gather time
///
/// Captured from the batch actually sent, so post-push bookkeeping does
/// not depend on what the server chooses to echo back. The clock lets
/// the acknowledgement skip any record edited again while the push was
/// in flight.
#[derive(Debug, Clone, Default)]
pub struct PushedIds {
    pub notebooks: Vec<(NotebookId, Option<DateTime<Utc>>)>,
    pub notes: Vec<(NoteId, Option<DateTime<Utc>>)>,
    pub tags: Vec<(TagId, Option<DateTime<Utc>>)>,
}

impl PushedIds {
    /// Total number of pushed records
    #[must_use]
    pub fn record_count(&self) -> usize {
        self.notebooks.len() + self.notes.len() + self.tags.len()
    }
}

impl PendingChanges {
    /// Whether any record is waiting to be pushed
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.created.is_empty() && self.updated.is_empty() && self.deleted.is_empty()
    }

    /// Total number of records across the three buckets
    #[must_use]
    pub fn record_count(&self) -> usize {
        self.created.record_count() + self.updated.record_count() + self.deleted.record_count()
    }

    /// Ids of everything that would be pushed, with their edit clocks
    #[must_use]
    pub fn pushed_ids(&self) -> PushedIds {
        self.ids.clone()
    }

    /// Flatten the buckets into a push payload; tombstones travel as
    /// records carrying `deleted_at`
    #[must_use]
    pub fn into_request(self) -> SyncRequest {
        let mut request = SyncRequest::default();
        for set in [self.created, self.updated, self.deleted] {
            request.notebooks.extend(set.notebooks);
            request.notes.extend(set.notes);
            request.tags.extend(set.tags);
        }
        request
    }
}

/// Which bucket a dirty record belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ChangeKind {
    Created,
    Updated,
    Deleted,
}

fn classify(meta: &SyncMeta, tombstoned: bool) -> ChangeKind {
    if meta.is_unsynced_creation() {
        ChangeKind::Created
    } else if tombstoned {
        ChangeKind::Deleted
    } else {
        ChangeKind::Updated
    }
}

impl<'a> ChangeTracker<'a> {
    /// Create a tracker reading from the given store
    #[must_use]
    pub const fn new(store: &'a LocalStore) -> Self {
        Self { store }
    }

    /// Snapshot every outstanding local change, classified
    pub fn pending_changes(&self) -> Result<PendingChanges> {
        let mut changes = PendingChanges::default();

        for (notebook, meta) in self.store.dirty_notebooks()? {
            changes.ids.notebooks.push((notebook.id, meta.locally_modified_at));
            let bucket = changes.bucket(classify(&meta, notebook.is_tombstoned()));
            bucket.notebooks.push(notebook);
        }
        for (note, meta) in self.store.dirty_notes()? {
            changes.ids.notes.push((note.id, meta.locally_modified_at));
            let bucket = changes.bucket(classify(&meta, note.is_tombstoned()));
            bucket.notes.push(note);
        }
        for (tag, meta) in self.store.dirty_tags()? {
            changes.ids.tags.push((tag.id, meta.locally_modified_at));
            let bucket = changes.bucket(classify(&meta, tag.is_tombstoned()));
            bucket.tags.push(tag);
        }

        Ok(changes)
    }
}

impl PendingChanges {
    fn bucket(&mut self, kind: ChangeKind) -> &mut ChangeSet {
        match kind {
            ChangeKind::Created => &mut self.created,
            ChangeKind::Updated => &mut self.updated,
            ChangeKind::Deleted => &mut self.deleted,
        }
    }
}
