//! Debounced sync triggering
//!
//! Local writes arrive in bursts; one outbound batch per burst is
//! enough. Each write restarts a cancellable delayed task, so the
//! cycle fires only once the burst goes quiet.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::task::AbortHandle;

use crate::error::Error;
use crate::sync::engine::SyncEngine;
use crate::sync::transport::SyncTransport;

/// Default debounce window after a burst of local writes
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(750);

/// Debounced trigger in front of a [`SyncEngine`]
pub struct SyncScheduler<T: SyncTransport + 'static> {
    engine: Arc<SyncEngine<T>>,
    debounce: Duration,
    pending: Mutex<Option<AbortHandle>>,
}

impl<T: SyncTransport + 'static> SyncScheduler<T> {
    /// Create a scheduler with the given debounce window
    pub fn new(engine: Arc<SyncEngine<T>>, debounce: Duration) -> Self {
        Self {
            engine,
            debounce,
            pending: Mutex::new(None),
        }
    }

    /// Create a scheduler with the [`DEFAULT_DEBOUNCE`] window
    pub fn with_default_debounce(engine: Arc<SyncEngine<T>>) -> Self {
        Self::new(engine, DEFAULT_DEBOUNCE)
    }

    /// Note that a local write happened; (re)starts the debounce timer
    pub fn record_written(&self) {
        let engine = Arc::clone(&self.engine);
        let debounce = self.debounce;
        let handle = tokio::spawn(async move {
            tokio::time::sleep(debounce).await;
            match engine.sync().await {
                Ok(outcome) => {
                    tracing::debug!(
                        pushed = outcome.pushed,
                        pulled = outcome.pulled,
                        "Debounced sync finished"
                    );
                }
                // Another trigger already has a cycle running; it will
                // pick up this write's data
                Err(Error::SyncInProgress) => {
                    tracing::trace!("Debounced sync skipped, cycle already running");
                }
                // Offline-first: failures stay silent and the next
                // trigger retries from the unchanged watermark
                Err(error) => {
                    tracing::warn!(%error, "Debounced sync failed, will retry on next trigger");
                }
            }
        })
        .abort_handle();

        let mut slot = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(previous) = slot.replace(handle) {
            previous.abort();
        }
    }

    /// Cancel any scheduled trigger; in-flight store state is untouched
    pub fn shutdown(&self) {
        let mut slot = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(handle) = slot.take() {
            handle.abort();
        }
    }
}

impl<T: SyncTransport + 'static> Drop for SyncScheduler<T> {
    fn drop(&mut self) {
        self.shutdown();
    }
}
