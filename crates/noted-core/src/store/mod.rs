//! Local on-device store
//!
//! Durable storage for notebooks, notes and tags, augmented with the
//! per-record sync metadata the engine needs: acknowledgement status,
//! local-modification time and the last server-confirmed version.
//! Mutations mark the record dirty in the same statement that writes
//! the content, so a crash can never leave an edit untracked.

mod migrations;
mod notebooks;
mod notes;
mod tags;

use std::path::Path;

use chrono::{DateTime, TimeZone, Utc};
use rusqlite::Connection;

use crate::error::{Error, Result};
use crate::sync::SyncStatus;

/// Settings key holding the sync watermark
const LAST_SYNC_TIME_KEY: &str = "last_sync_time";

/// SQLite-backed local store
pub struct LocalStore {
    conn: Connection,
}

impl LocalStore {
    /// Open the store at the given path, creating it if needed
    ///
    /// Runs migrations automatically.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        let store = Self { conn };
        store.configure();
        migrations::run(&store.conn)?;
        Ok(store)
    }

    /// Open an in-memory store (useful for testing)
    pub fn open_in_memory() -> Result<Self> {
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
        self.conn
            .pragma_update(None, "foreign_keys", "ON")
            .ok();
    }

    /// The watermark of the last fully successful sync cycle
    pub fn watermark(&self) -> Result<Option<DateTime<Utc>>> {
        let Some(raw) = self.setting(LAST_SYNC_TIME_KEY)? else {
            return Ok(None);
        };
        let parsed = DateTime::parse_from_rfc3339(&raw)
            .map_err(|e| Error::InvalidInput(format!("stored watermark is invalid: {e}")))?;
        Ok(Some(parsed.with_timezone(&Utc)))
    }

    /// Persist the watermark; only ever a server-reported time
    pub fn set_watermark(&self, at: DateTime<Utc>) -> Result<()> {
        self.set_setting(LAST_SYNC_TIME_KEY, &at.to_rfc3339())
    }

    fn setting(&self, key: &str) -> Result<Option<String>> {
        let result = self.conn.query_row(
            "SELECT value FROM settings WHERE key = ?",
            [key],
            |row| row.get(0),
        );
        match result {
            Ok(value) => Ok(Some(value)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn set_setting(&self, key: &str, value: &str) -> Result<()> {
        self.conn.execute(
            "INSERT INTO settings (key, value) VALUES (?, ?)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            [key, value],
        )?;
        Ok(())
    }

    /// Number of records still waiting for server acknowledgement
    pub fn pending_count(&self) -> Result<usize> {
        let count: i64 = self.conn.query_row(
            "SELECT (SELECT COUNT(*) FROM notebooks WHERE sync_status != 'synced')
                  + (SELECT COUNT(*) FROM notes WHERE sync_status != 'synced')
                  + (SELECT COUNT(*) FROM tags WHERE sync_status != 'synced')",
            [],
            |row| row.get(0),
        )?;
        Ok(usize::try_from(count).unwrap_or(0))
    }

    /// Physically remove tombstones both sides have observed
    ///
    /// A tombstone is purgeable once it is `synced`: either the server
    /// sent it to us, or our push of it was acknowledged.
    pub fn purge_acknowledged_tombstones(&self) -> Result<usize> {
        // Link rows are not records; drop them first, uncounted
        self.conn.execute(
            "DELETE FROM note_tags WHERE tag_id IN
               (SELECT id FROM tags WHERE deleted_at IS NOT NULL AND sync_status = 'synced')",
            [],
        )?;
        let mut purged = 0;
        purged += self.conn.execute(
            "DELETE FROM notes WHERE deleted_at IS NOT NULL AND sync_status = 'synced'",
            [],
        )?;
        purged += self.conn.execute(
            "DELETE FROM notebooks WHERE deleted_at IS NOT NULL AND sync_status = 'synced'",
            [],
        )?;
        purged += self.conn.execute(
            "DELETE FROM tags WHERE deleted_at IS NOT NULL AND sync_status = 'synced'",
            [],
        )?;
        Ok(purged)
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

/// Wrap a per-column decode failure in a rusqlite error so it surfaces
/// through the normal row-mapping path
pub(crate) fn column_decode_err(
    idx: usize,
    err: impl Into<Box<dyn std::error::Error + Send + Sync + 'static>>,
) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, err.into())
}

pub(crate) fn status_from_row(idx: usize, raw: &str) -> rusqlite::Result<SyncStatus> {
    raw.parse::<SyncStatus>()
        .map_err(|e| column_decode_err(idx, e))
}
