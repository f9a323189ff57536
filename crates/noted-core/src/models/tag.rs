//! Tag model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use super::UserId;

/// A unique identifier for a tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TagId(Uuid);

impl TagId {
    /// Create a new unique tag ID
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

impl Default for TagId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TagId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for TagId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// A label attachable to notes
///
/// Like notebooks, tag conflicts are resolved on `updated_at`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tag {
    /// Unique identifier, generated on the creating device
    pub id: TagId,
    /// Owner; ignored on the wire, the server substitutes the
    /// authenticated identity
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<UserId>,
    /// Tag name (stored in lowercase)
    pub name: String,
    /// Display color, empty when unset
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub color: String,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
    /// Last mutation timestamp (conflict tie-breaker)
    pub updated_at: DateTime<Utc>,
    /// Tombstone marker; set instead of physically deleting the row
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Tag {
    /// Create a new tag with the given name
    ///
    /// The name is automatically converted to lowercase.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: TagId::new(),
            user_id: None,
            name: name.into().to_lowercase(),
            color: String::new(),
            created_at: now,
            updated_at: now,
            deleted_at: None,
        }
    }

    /// Set a display color
    #[must_use]
    pub fn with_color(mut self, color: impl Into<String>) -> Self {
        self.color = color.into();
        self
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
    fn test_tag_name_lowercased() {
        let tag = Tag::new("Work");
        assert_eq!(tag.name, "work");
    }

    #[test]
    fn test_tag_with_color() {
        let tag = Tag::new("urgent").with_color("#ff0000");
        assert_eq!(tag.color, "#ff0000");
    }

    #[test]
    fn test_tag_id_parse() {
        let id = TagId::new();
        let parsed: TagId = id.as_str().parse().unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn test_tombstone() {
        let mut tag = Tag::new("old");
        tag.tombstone();
        assert!(tag.is_tombstoned());
    }
}
