//! Reconciliation service for Noted sync
//!
//! Serves `GET /sync` (delta pull) and `POST /sync` (push with
//! whole-record last-writer-wins reconciliation), bearer-token
//! authenticated, backed by a single SQLite database.

pub mod auth;
pub mod config;
pub mod error;
pub mod reconcile;
pub mod routes;
pub mod store;
