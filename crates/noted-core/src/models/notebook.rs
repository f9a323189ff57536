//! Notebook model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use super::UserId;

/// A unique identifier for a notebook, using UUID v7 (time-sortable)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NotebookId(Uuid);

impl NotebookId {
    /// Create a new unique notebook ID using UUID v7
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

impl Default for NotebookId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for NotebookId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for NotebookId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// A notebook grouping notes
///
/// Conflicts between replicas are resolved by comparing `updated_at`
/// (last writer wins at whole-record granularity).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notebook {
    /// Unique identifier, generated on the creating device
    pub id: NotebookId,
    /// Owner; ignored on the wire, the server substitutes the
    /// authenticated identity
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<UserId>,
    /// Notebook title
    pub title: String,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
    /// Last mutation timestamp (conflict tie-breaker)
    pub updated_at: DateTime<Utc>,
    /// Tombstone marker; set instead of physically deleting the row
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Notebook {
    /// Create a new notebook with the given title
    #[must_use]
    pub fn new(title: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: NotebookId::new(),
            user_id: None,
            title: title.into(),
            created_at: now,
            updated_at: now,
            deleted_at: None,
        }
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
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_notebook_id_unique() {
        let id1 = NotebookId::new();
        let id2 = NotebookId::new();
        assert_ne!(id1, id2);
    }

    #[test]
    fn test_notebook_id_parse() {
        let id = NotebookId::new();
        let parsed: NotebookId = id.as_str().parse().unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn test_notebook_new() {
        let nb = Notebook::new("Main");
        assert_eq!(nb.title, "Main");
        assert!(!nb.is_tombstoned());
        assert_eq!(nb.created_at, nb.updated_at);
    }

    #[test]
    fn test_tombstone_bumps_updated_at() {
        let mut nb = Notebook::new("Main");
        let before = nb.updated_at;
        nb.tombstone();
        assert!(nb.is_tombstoned());
        assert!(nb.updated_at >= before);
        assert_eq!(nb.deleted_at, Some(nb.updated_at));
    }

    #[test]
    fn test_wire_shape_omits_empty_fields() {
        let nb = Notebook::new("Main");
        let json = serde_json::to_value(&nb).unwrap();
        assert!(json.get("user_id").is_none());
        assert!(json.get("deleted_at").is_none());
    }
}
