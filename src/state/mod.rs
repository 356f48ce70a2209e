//! Persistent sync record store.
//!
//! SQLite-backed record of every favorite item a run has attempted, keyed by
//! collection. It is the ground truth for "already synced" and enables:
//! - Incremental syncs that only touch new or previously failed items
//! - Automatic retry of failed items on the next run
//! - Status reporting

pub mod db;
pub mod error;
pub mod schema;
pub mod types;

pub use db::{RecordStore, SqliteRecordStore};
pub use error::StateError;
pub use types::{SyncRecord, SyncRecords, SyncRunStats, SyncStatus, SyncSummary};
