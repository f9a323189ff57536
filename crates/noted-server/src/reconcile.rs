//! Server-side reconciliation
//!
//! Whole-record last-writer-wins. Notes compare on their `version`
//! counter and the server advances the counter on every winning write;
//! notebooks and tags compare on `updated_at`. A losing record is left
//! untouched and only flips `has_conflict` in the response, so the
//! pushing client learns to refresh rather than retry.

use chrono::{DateTime, Utc};

use noted_core::sync::{SyncRequest, SyncResponse};
use noted_core::{Note, Notebook, Tag, UserId};

use crate::error::AppError;
use crate::store::{AuthoritativeStore, SyncRepository};

/// Everything the user changed since the watermark, plus the server
/// clock the client will adopt as its next watermark
pub fn pull(
    store: &AuthoritativeStore,
    user: UserId,
    since: Option<DateTime<Utc>>,
) -> Result<SyncResponse, AppError> {
    let repo = store.repo();
    Ok(SyncResponse {
        notebooks: repo.notebooks_for_user(user, since)?,
        notes: repo.notes_for_user(user, since)?,
        tags: repo.tags_for_user(user, since)?,
        server_time: Utc::now(),
        has_conflict: false,
    })
}

/// Apply a pushed batch and answer with the user's full authoritative
/// state
///
/// The whole batch runs in one transaction. A record that fails to
/// apply for a storage reason is logged and skipped; the rest of the
/// batch still lands, matching the at-least-once retry model on the
/// client side.
pub fn push(
    store: &mut AuthoritativeStore,
    user: UserId,
    request: &SyncRequest,
) -> Result<SyncResponse, AppError> {
    let (has_conflict, notebooks, notes, tags) = store.with_transaction(|repo| {
        let mut has_conflict = false;

        // Notebooks before notes, so a batch that creates both lands in
        // referential order
        for notebook in &request.notebooks {
            match apply_notebook(repo, user, notebook) {
                Ok(Applied::Conflict) => has_conflict = true,
                Ok(_) => {}
                Err(error) => {
                    tracing::warn!(record = %notebook.id, %error, "Skipping notebook that failed to apply");
                }
            }
        }
        for note in &request.notes {
            match apply_note(repo, user, note) {
                Ok(Applied::Conflict) => has_conflict = true,
                Ok(_) => {}
                Err(error) => {
                    tracing::warn!(record = %note.id, %error, "Skipping note that failed to apply");
                }
            }
        }
        for tag in &request.tags {
            match apply_tag(repo, user, tag) {
                Ok(Applied::Conflict) => has_conflict = true,
                Ok(_) => {}
                Err(error) => {
                    tracing::warn!(record = %tag.id, %error, "Skipping tag that failed to apply");
                }
            }
        }

        Ok((
            has_conflict,
            repo.notebooks_for_user(user, None)?,
            repo.notes_for_user(user, None)?,
            repo.tags_for_user(user, None)?,
        ))
    })?;

    Ok(SyncResponse {
        notebooks,
        notes,
        tags,
        server_time: Utc::now(),
        has_conflict,
    })
}

enum Applied {
    Stored,
    Conflict,
    Skipped,
}

fn apply_notebook(
    repo: &SyncRepository<'_>,
    user: UserId,
    incoming: &Notebook,
) -> Result<Applied, AppError> {
    match repo.notebook(&incoming.id)? {
        None => {
            repo.insert_notebook(incoming, user)?;
            Ok(Applied::Stored)
        }
        Some(existing) => {
            if existing.user_id != Some(user) {
                tracing::warn!(record = %incoming.id, "Notebook id belongs to another user, skipping");
                return Ok(Applied::Skipped);
            }
            if existing.updated_at > incoming.updated_at {
                return Ok(Applied::Conflict);
            }
            repo.update_notebook(incoming)?;
            Ok(Applied::Stored)
        }
    }
}

fn apply_note(repo: &SyncRepository<'_>, user: UserId, incoming: &Note) -> Result<Applied, AppError> {
    match repo.note(&incoming.id)? {
        None => {
            repo.insert_note(incoming, user)?;
            Ok(Applied::Stored)
        }
        Some(existing) => {
            if existing.user_id != Some(user) {
                tracing::warn!(record = %incoming.id, "Note id belongs to another user, skipping");
                return Ok(Applied::Skipped);
            }
            if existing.version > incoming.version {
                return Ok(Applied::Conflict);
            }
            // Winner takes the next counter value; the client's own
            // counter is never trusted beyond the comparison above
            repo.update_note(incoming, existing.version + 1)?;
            Ok(Applied::Stored)
        }
    }
}

fn apply_tag(repo: &SyncRepository<'_>, user: UserId, incoming: &Tag) -> Result<Applied, AppError> {
    match repo.tag(&incoming.id)? {
        None => {
            repo.insert_tag(incoming, user)?;
            Ok(Applied::Stored)
        }
        Some(existing) => {
            if existing.user_id != Some(user) {
                tracing::warn!(record = %incoming.id, "Tag id belongs to another user, skipping");
                return Ok(Applied::Skipped);
            }
            if existing.updated_at > incoming.updated_at {
                return Ok(Applied::Conflict);
            }
            repo.update_tag(incoming)?;
            Ok(Applied::Stored)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use pretty_assertions::assert_eq;

    fn request_with_notes(notes: Vec<Note>) -> SyncRequest {
        SyncRequest {
            notebooks: vec![],
            notes,
            tags: vec![],
        }
    }

    fn seeded_store() -> (AuthoritativeStore, UserId, Notebook) {
        let mut store = AuthoritativeStore::open_in_memory().unwrap();
        let user = UserId::new();
        let nb = Notebook::new("Inbox");
        let request = SyncRequest {
            notebooks: vec![nb.clone()],
            notes: vec![],
            tags: vec![],
        };
        push(&mut store, user, &request).unwrap();
        (store, user, nb)
    }

    #[test]
    fn test_push_creates_and_returns_full_state() {
        let (mut store, user, nb) = seeded_store();
        let note = Note::from_text(nb.id, "first");

        let response = push(&mut store, user, &request_with_notes(vec![note.clone()])).unwrap();

        assert!(!response.has_conflict);
        assert_eq!(response.notebooks.len(), 1);
        assert_eq!(response.notes.len(), 1);
        assert_eq!(response.notes[0].id, note.id);
        // Creation stores the client's counter as-is
        assert_eq!(response.notes[0].version, 1);
    }

    #[test]
    fn test_note_update_advances_version_server_side() {
        let (mut store, user, nb) = seeded_store();
        let mut note = Note::from_text(nb.id, "first");
        push(&mut store, user, &request_with_notes(vec![note.clone()])).unwrap();

        // Same version the server holds: the write wins and the counter
        // moves to N + 1
        note.plain_text = "edited".to_string();
        note.touch();
        let response = push(&mut store, user, &request_with_notes(vec![note.clone()])).unwrap();

        assert!(!response.has_conflict);
        assert_eq!(response.notes[0].version, 2);
        assert_eq!(response.notes[0].plain_text, "edited");
    }

    #[test]
    fn test_stale_note_version_is_rejected_untouched() {
        let (mut store, user, nb) = seeded_store();
        let mut note = Note::from_text(nb.id, "first");
        push(&mut store, user, &request_with_notes(vec![note.clone()])).unwrap();
        note.touch();
        push(&mut store, user, &request_with_notes(vec![note.clone()])).unwrap();
        // Server is now at version 2

        let mut stale = note.clone();
        stale.version = 1;
        stale.plain_text = "stale edit".to_string();
        let response = push(&mut store, user, &request_with_notes(vec![stale])).unwrap();

        assert!(response.has_conflict);
        assert_eq!(response.notes[0].version, 2);
        assert_eq!(response.notes[0].plain_text, "first");
    }

    #[test]
    fn test_notebook_lww_on_updated_at() {
        let (mut store, user, nb) = seeded_store();

        let mut older = nb.clone();
        older.title = "Renamed on a lagging device".to_string();
        older.updated_at = nb.updated_at - Duration::seconds(10);
        let response = push(
            &mut store,
            user,
            &SyncRequest {
                notebooks: vec![older],
                notes: vec![],
                tags: vec![],
            },
        )
        .unwrap();

        assert!(response.has_conflict);
        assert_eq!(response.notebooks[0].title, "Inbox");

        let mut newer = nb.clone();
        newer.title = "Renamed later".to_string();
        newer.updated_at = nb.updated_at + Duration::seconds(10);
        let response = push(
            &mut store,
            user,
            &SyncRequest {
                notebooks: vec![newer],
                notes: vec![],
                tags: vec![],
            },
        )
        .unwrap();

        assert!(!response.has_conflict);
        assert_eq!(response.notebooks[0].title, "Renamed later");
    }

    #[test]
    fn test_tombstone_is_stored_not_deleted() {
        let (mut store, user, nb) = seeded_store();
        let mut note = Note::from_text(nb.id, "doomed");
        push(&mut store, user, &request_with_notes(vec![note.clone()])).unwrap();

        note.tombstone();
        let response = push(&mut store, user, &request_with_notes(vec![note.clone()])).unwrap();

        // The row survives as a tombstone for other devices to pull
        assert_eq!(response.notes.len(), 1);
        assert!(response.notes[0].is_tombstoned());
        assert_eq!(response.notes[0].version, 2);
    }

    #[test]
    fn test_record_owned_by_another_user_is_skipped() {
        let (mut store, user, nb) = seeded_store();
        let intruder = UserId::new();

        let mut forged = nb.clone();
        forged.title = "Hijacked".to_string();
        forged.updated_at = nb.updated_at + Duration::seconds(10);
        let response = push(
            &mut store,
            intruder,
            &SyncRequest {
                notebooks: vec![forged],
                notes: vec![],
                tags: vec![],
            },
        )
        .unwrap();

        // Not a conflict, not applied, and invisible to the intruder
        assert!(!response.has_conflict);
        assert!(response.notebooks.is_empty());
        let owned = pull(&store, user, None).unwrap();
        assert_eq!(owned.notebooks[0].title, "Inbox");
    }

    #[test]
    fn test_skipped_record_does_not_block_rest_of_batch() {
        let (mut store, user, nb) = seeded_store();
        let intruder = UserId::new();

        let mut forged = nb.clone();
        forged.title = "Hijacked".to_string();
        forged.updated_at = nb.updated_at + Duration::seconds(10);
        let own_nb = Notebook::new("Scratch");
        let own_note = Note::from_text(own_nb.id, "kept");
        let own_tag = Tag::new("kept");

        let response = push(
            &mut store,
            intruder,
            &SyncRequest {
                notebooks: vec![forged, own_nb.clone()],
                notes: vec![own_note.clone()],
                tags: vec![own_tag.clone()],
            },
        )
        .unwrap();

        // The skipped forgery takes nothing else down with it
        assert!(!response.has_conflict);
        assert_eq!(response.notebooks.len(), 1);
        assert_eq!(response.notebooks[0].id, own_nb.id);
        assert_eq!(response.notes.len(), 1);
        assert_eq!(response.notes[0].id, own_note.id);
        assert_eq!(response.tags.len(), 1);
        assert_eq!(response.tags[0].id, own_tag.id);

        let owned = pull(&store, user, None).unwrap();
        assert_eq!(owned.notebooks[0].title, "Inbox");
    }

    #[test]
    fn test_pull_since_returns_only_records_received_later() {
        let (mut store, user, nb) = seeded_store();
        let first = pull(&store, user, None).unwrap();
        assert_eq!(first.notebooks.len(), 1);

        let cutoff = first.server_time;
        let delta = pull(&store, user, Some(cutoff)).unwrap();
        assert!(delta.notebooks.is_empty());

        // Server receive time decides delta membership, so even a note
        // carrying an old client clock shows up after the cutoff
        std::thread::sleep(std::time::Duration::from_millis(5));
        let mut note = Note::from_text(nb.id, "late arrival");
        note.created_at = cutoff - Duration::hours(1);
        note.updated_at = note.created_at;
        push(&mut store, user, &request_with_notes(vec![note.clone()])).unwrap();

        let delta = pull(&store, user, Some(cutoff)).unwrap();
        assert!(delta.notebooks.is_empty());
        assert_eq!(delta.notes.len(), 1);
        assert_eq!(delta.notes[0].id, note.id);
    }

    #[test]
    fn test_idempotent_replay_of_same_batch() {
        let (mut store, user, nb) = seeded_store();
        let note = Note::from_text(nb.id, "once");

        push(&mut store, user, &request_with_notes(vec![note.clone()])).unwrap();
        let response = push(&mut store, user, &request_with_notes(vec![note])).unwrap();

        // A replayed create becomes an equal-version update: it wins,
        // re-stores the same content and advances the counter
        assert!(!response.has_conflict);
        assert_eq!(response.notes.len(), 1);
        assert_eq!(response.notes[0].version, 2);
    }
}
