//! Sync orchestration
//!
//! One entry point, [`SyncEngine::sync`], runs a full cycle: pull,
//! merge, gather pending, push, merge the result, advance the
//! watermark. The watermark moves only on a fully successful cycle and
//! only to a server-reported time; a failure anywhere aborts the cycle
//! and the next trigger retries the whole delta.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::Mutex;

use crate::error::{Error, Result};
use crate::store::LocalStore;
use crate::sync::merge;
use crate::sync::tracker::ChangeTracker;
use crate::sync::transport::SyncTransport;

/// Summary of one completed sync cycle
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncOutcome {
    /// Records received in the pull response
    pub pulled: usize,
    /// Records included in the push payload
    pub pushed: usize,
    /// Whether any pushed record lost the server's conflict check
    pub has_conflict: bool,
}

/// Client-side sync orchestrator
///
/// At most one cycle runs at a time; overlapping triggers fail fast
/// with [`Error::SyncInProgress`] instead of queueing, since a queued
/// cycle would only re-read state the running one already captured.
pub struct SyncEngine<T: SyncTransport> {
    store: Arc<Mutex<LocalStore>>,
    transport: T,
    in_flight: AtomicBool,
}

impl<T: SyncTransport> SyncEngine<T> {
    /// Create an engine over the given store and transport
    pub fn new(store: Arc<Mutex<LocalStore>>, transport: T) -> Self {
        Self {
            store,
            transport,
            in_flight: AtomicBool::new(false),
        }
    }

    /// Shared handle to the underlying store
    pub fn store(&self) -> &Arc<Mutex<LocalStore>> {
        &self.store
    }

    /// Run one sync cycle to convergence
    pub async fn sync(&self) -> Result<SyncOutcome> {
        let _guard = InFlightGuard::acquire(&self.in_flight).ok_or(Error::SyncInProgress)?;

        let since = { self.store.lock().await.watermark()? };
        tracing::debug!(since = ?since, "Starting sync cycle");

        let pull = self.transport.pull(since).await?;
        let pulled = pull.record_count();
        let mut server_time = pull.server_time;
        let mut has_conflict = pull.has_conflict;

        // The push batch must be gathered from a store already updated
        // by the pull, or we would push data staler than what we just
        // received.
        let pending = {
            let store = self.store.lock().await;
            merge::apply_response(&store, &pull)?;
            ChangeTracker::new(&store).pending_changes()?
        };

        let mut pushed = 0;
        if !pending.is_empty() {
            let ids = pending.pushed_ids();
            pushed = ids.record_count();
            let request = pending.into_request();
            let response = self.transport.push(&request).await?;

            let store = self.store.lock().await;
            // Acknowledge exactly what was sent; a record edited while
            // the request was on the wire no longer matches its captured
            // edit clock and stays pending. The merge then refreshes the
            // rest from the authoritative copies.
            store.mark_notebooks_synced(&ids.notebooks)?;
            store.mark_notes_synced(&ids.notes)?;
            store.mark_tags_synced(&ids.tags)?;
            merge::apply_response(&store, &response)?;
            server_time = response.server_time;
            has_conflict = response.has_conflict;
        }

        {
            let store = self.store.lock().await;
            store.set_watermark(server_time)?;
            let purged = store.purge_acknowledged_tombstones()?;
            if purged > 0 {
                tracing::debug!(purged, "Purged acknowledged tombstones");
            }
        }

        tracing::info!(pulled, pushed, has_conflict, "Sync cycle finished");
        Ok(SyncOutcome {
            pulled,
            pushed,
            has_conflict,
        })
    }
}

/// Single-flight flag with release-on-drop, so an aborted cycle can
/// never wedge the engine
struct InFlightGuard<'a>(&'a AtomicBool);

impl<'a> InFlightGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
            .then_some(Self(flag))
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}
