//! Wire shapes for the reconciliation endpoint

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{Note, Notebook, Tag};

/// Batch of client changes submitted with `POST /sync`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SyncRequest {
    #[serde(default)]
    pub notebooks: Vec<Notebook>,
    #[serde(default)]
    pub notes: Vec<Note>,
    #[serde(default)]
    pub tags: Vec<Tag>,
}

impl SyncRequest {
    /// Whether there is anything to push
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.notebooks.is_empty() && self.notes.is_empty() && self.tags.is_empty()
    }

    /// Total number of records in the batch
    #[must_use]
    pub fn record_count(&self) -> usize {
        self.notebooks.len() + self.notes.len() + self.tags.len()
    }
}

/// Server reply to both pull (`GET /sync`) and push (`POST /sync`)
///
/// `server_time` is the only clock the client may use as its next
/// watermark; `has_conflict` is set when any pushed record lost the
/// conflict check and signals the client to re-pull promptly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncResponse {
    pub notebooks: Vec<Notebook>,
    pub notes: Vec<Note>,
    pub tags: Vec<Tag>,
    pub server_time: DateTime<Utc>,
    #[serde(default)]
    pub has_conflict: bool,
}

impl SyncResponse {
    /// Total number of records in the reply
    #[must_use]
    pub fn record_count(&self) -> usize {
        self.notebooks.len() + self.notes.len() + self.tags.len()
    }
}
