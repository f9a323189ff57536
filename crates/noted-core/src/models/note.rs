//! Note model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use super::{NotebookId, TagId, UserId};

/// A unique identifier for a note, using UUID v7 (time-sortable)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NoteId(Uuid);

impl NoteId {
    /// Create a new unique note ID using UUID v7
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Get the string representation of this ID
    #[must_use]
    pub fn as_str(&self) -> String {
        self.0.to_string()
    }
}

impl Default for NoteId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for NoteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for NoteId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// A note in the system
///
/// Notes mutate far more often than notebooks or tags, so their
/// conflict tie-breaker is the `version` counter rather than wall-clock
/// time: a counter cannot go backwards across devices with skewed
/// clocks. The counter is only ever advanced by whichever side wins a
/// write; clients never increment it themselves.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Note {
    /// Unique identifier, generated on the creating device
    pub id: NoteId,
    /// Notebook this note belongs to
    pub notebook_id: NotebookId,
    /// Owner; ignored on the wire, the server substitutes the
    /// authenticated identity
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<UserId>,
    /// Rich content as an opaque JSON document
    #[serde(default)]
    pub content: Value,
    /// Plain-text projection of the content, for listing and search
    #[serde(default)]
    pub plain_text: String,
    /// Whether this note is a todo item
    #[serde(default)]
    pub is_todo: bool,
    /// Whether the todo has been completed
    #[serde(default)]
    pub is_done: bool,
    /// Optional reminder time
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reminder_at: Option<DateTime<Utc>>,
    /// Monotonic conflict counter, advanced server-side on each
    /// winning write
    pub version: i64,
    /// Tags attached to this note; the whole set travels with the
    /// record and is replaced wholesale on each write
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tag_ids: Vec<TagId>,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
    /// Last mutation timestamp
    pub updated_at: DateTime<Utc>,
    /// Tombstone marker; set instead of physically deleting the row
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Note {
    /// Create a new note in the given notebook
    #[must_use]
    pub fn new(notebook_id: NotebookId, content: Value, plain_text: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: NoteId::new(),
            notebook_id,
            user_id: None,
            content,
            plain_text: plain_text.into(),
            is_todo: false,
            is_done: false,
            reminder_at: None,
            version: 1,
            tag_ids: Vec::new(),
            created_at: now,
            updated_at: now,
            deleted_at: None,
        }
    }

    /// Create a plain-text note, deriving the content document
    #[must_use]
    pub fn from_text(notebook_id: NotebookId, text: impl Into<String>) -> Self {
        let text = text.into();
        let content = serde_json::json!({ "type": "text", "text": text });
        Self::new(notebook_id, content, text)
    }

    /// Whether this record is a tombstone
    #[must_use]
    pub const fn is_tombstoned(&self) -> bool {
        self.deleted_at.is_some()
    }

    /// Mark the record mutated now
    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    /// Turn the record into a tombstone
    pub fn tombstone(&mut self) {
        let now = Utc::now();
        self.updated_at = now;
        self.deleted_at = Some(now);
    }

    /// First line of the plain text, truncated to `max_len` characters
    #[must_use]
    pub fn title_preview(&self, max_len: usize) -> String {
        self.plain_text
            .lines()
            .next()
            .unwrap_or("")
            .chars()
            .take(max_len)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_note_id_unique() {
        let id1 = NoteId::new();
        let id2 = NoteId::new();
        assert_ne!(id1, id2);
    }

    #[test]
    fn test_note_id_parse() {
        let id = NoteId::new();
        let parsed: NoteId = id.as_str().parse().unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn test_note_new_starts_at_version_one() {
        let note = Note::from_text(NotebookId::new(), "Hello world");
        assert_eq!(note.version, 1);
        assert_eq!(note.plain_text, "Hello world");
        assert!(!note.is_tombstoned());
        assert_eq!(note.created_at, note.updated_at);
    }

    #[test]
    fn test_title_preview() {
        let note = Note::from_text(NotebookId::new(), "First line\nSecond line");
        assert_eq!(note.title_preview(50), "First line");
        assert_eq!(note.title_preview(5), "First");
    }

    #[test]
    fn test_wire_round_trip_keeps_version_and_tags() {
        let mut note = Note::from_text(NotebookId::new(), "tagged");
        note.tag_ids = vec![TagId::new(), TagId::new()];
        note.version = 4;

        let json = serde_json::to_string(&note).unwrap();
        let back: Note = serde_json::from_str(&json).unwrap();
        assert_eq!(back, note);
    }

    #[test]
    fn test_missing_optional_wire_fields_default() {
        let json = format!(
            r#"{{"id":"{}","notebook_id":"{}","version":1,
                "created_at":"2024-01-01T00:00:00Z","updated_at":"2024-01-01T00:00:00Z"}}"#,
            NoteId::new(),
            NotebookId::new()
        );
        let note: Note = serde_json::from_str(&json).unwrap();
        assert!(note.tag_ids.is_empty());
        assert!(!note.is_todo);
        assert!(note.deleted_at.is_none());
    }
}
