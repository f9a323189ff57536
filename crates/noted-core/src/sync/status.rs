//! Per-record sync state

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Local acknowledgement state of a cached record
///
/// Never sent to the server; lives only in the local store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncStatus {
    /// Matches the last state confirmed by the server
    Synced,
    /// Mutated locally, not yet acknowledged by the server
    Pending,
    /// Mutated locally while a differing server copy is known to exist
    Conflict,
}

impl SyncStatus {
    /// Stable string form used in the local database
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Synced => "synced",
            Self::Pending => "pending",
            Self::Conflict => "conflict",
        }
    }

    /// Whether the record still has to be offered to the server
    #[must_use]
    pub const fn is_dirty(self) -> bool {
        !matches!(self, Self::Synced)
    }
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SyncStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "synced" => Ok(Self::Synced),
            "pending" => Ok(Self::Pending),
            "conflict" => Ok(Self::Conflict),
            other => Err(format!("unknown sync status: {other}")),
        }
    }
}

/// Local-only sync metadata attached to each cached record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncMeta {
    /// Acknowledgement state
    pub status: SyncStatus,
    /// Time of the last local mutation not yet confirmed by the server
    pub locally_modified_at: Option<DateTime<Utc>>,
    /// Version (notes) or server `updated_at` in Unix ms
    /// (notebooks/tags) last confirmed by the server; 0 means the
    /// record has never round-tripped, i.e. it is a pending creation
    pub server_version: i64,
}

impl SyncMeta {
    /// Metadata for a record freshly created on this device
    #[must_use]
    pub fn local_creation(now: DateTime<Utc>) -> Self {
        Self {
            status: SyncStatus::Pending,
            locally_modified_at: Some(now),
            server_version: 0,
        }
    }

    /// Whether the record has never been confirmed by the server
    #[must_use]
    pub const fn is_unsynced_creation(&self) -> bool {
        self.server_version == 0
    }
}
