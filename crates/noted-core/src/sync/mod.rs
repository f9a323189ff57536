//! Client-side sync engine
//!
//! Change tracking, server-response merging, wire transport and the
//! orchestrating engine that runs one pull/push cycle to convergence.

mod engine;
mod merge;
mod protocol;
mod scheduler;
mod status;
mod tracker;
mod transport;

pub use engine::{SyncEngine, SyncOutcome};
pub use merge::{apply_response, MergeStats};
pub use protocol::{SyncRequest, SyncResponse};
pub use scheduler::{SyncScheduler, DEFAULT_DEBOUNCE};
pub use status::{SyncMeta, SyncStatus};
pub use tracker::{ChangeSet, ChangeTracker, PendingChanges, PushedIds};
pub use transport::{HttpSyncTransport, SyncTransport};
