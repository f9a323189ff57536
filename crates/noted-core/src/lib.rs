//! noted-core - Core library for Noted
//!
//! This crate contains the shared entity models, the client-side local
//! store with per-record sync metadata, and the sync engine (change
//! tracking, merge, transport, orchestration) used by every Noted client.

pub mod error;
pub mod models;
pub mod store;
pub mod sync;

pub use error::{Error, Result};
pub use models::{Note, NoteId, Notebook, NotebookId, Tag, TagId, UserId};
