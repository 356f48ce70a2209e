use thiserror::Error;

use crate::state::StateError;

/// Fatal errors of a sync run. Per-item failures never surface here; they are
/// recorded as `Failed` and listed in the report instead.
#[derive(Debug, Error)]
pub enum SyncError {
    /// The authoritative remote list could not be fetched.
    #[error("Failed to fetch favorites of collection {collection_id}: {cause:#}")]
    Fetch {
        collection_id: u64,
        cause: anyhow::Error,
    },

    /// The record store cannot be trusted; the run stops before touching it.
    #[error("{0}. Move the file aside or restore it from backup before syncing again")]
    StoreCorrupted(#[source] StateError),

    #[error(transparent)]
    Store(StateError),
}

impl From<StateError> for SyncError {
    fn from(e: StateError) -> Self {
        if e.is_corrupted() {
            Self::StoreCorrupted(e)
        } else {
            Self::Store(e)
        }
    }
}

/// Why a single item could not be synced.
#[derive(Debug, Error)]
pub enum ItemError {
    #[error("detail fetch failed: {0:#}")]
    Detail(anyhow::Error),

    #[error("write failed: {0:#}")]
    Write(anyhow::Error),
}
