//! Types for the sync record store.

use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;

use chrono::{DateTime, Utc};

/// Outcome of the last attempt to sync an item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncStatus {
    /// Markdown file written; never processed again.
    Synced,
    /// Detail fetch or write failed; retried on the next run.
    Failed,
}

impl SyncStatus {
    /// Convert to the string stored in the database.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Synced => "synced",
            Self::Failed => "failed",
        }
    }

    /// Parse from the string stored in the database.
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "synced" => Some(Self::Synced),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

/// Durable marker that an item has been processed by a prior run.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncRecord {
    /// Item id (BV id).
    pub id: String,
    /// Title as of the last attempt, for status output.
    pub title: String,
    /// Markdown file written for this item (if synced).
    pub local_path: Option<PathBuf>,
    /// Last error message (if failed).
    pub last_error: Option<String>,
    /// When the last attempt finished.
    pub synced_at: DateTime<Utc>,
    /// Number of failed attempts so far.
    pub attempts: u32,
    pub status: SyncStatus,
}

impl SyncRecord {
    fn new(id: &str, status: SyncStatus, synced_at: DateTime<Utc>) -> Self {
        Self {
            id: id.to_string(),
            title: String::new(),
            local_path: None,
            last_error: None,
            synced_at,
            attempts: 0,
            status,
        }
    }
}

/// In-memory view of one collection's records, ordered by item id.
///
/// Tracks which records changed since they were loaded or last committed so
/// that a save only has to write those. Records are never removed.
#[derive(Debug, Clone, Default)]
pub struct SyncRecords {
    records: BTreeMap<String, SyncRecord>,
    dirty: BTreeSet<String>,
}

impl SyncRecords {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from records that are already durable (nothing dirty).
    pub(crate) fn from_committed(records: impl IntoIterator<Item = SyncRecord>) -> Self {
        Self {
            records: records.into_iter().map(|r| (r.id.clone(), r)).collect(),
            dirty: BTreeSet::new(),
        }
    }

    #[cfg(test)]
    pub fn contains(&self, id: &str) -> bool {
        self.records.contains_key(id)
    }

    #[cfg(test)]
    pub fn get(&self, id: &str) -> Option<&SyncRecord> {
        self.records.get(id)
    }

    pub fn status(&self, id: &str) -> Option<SyncStatus> {
        self.records.get(id).map(|r| r.status)
    }

    /// Insert a record or update the status and timestamp of an existing one.
    pub fn upsert(
        &mut self,
        id: &str,
        status: SyncStatus,
        timestamp: DateTime<Utc>,
    ) -> &mut SyncRecord {
        self.dirty.insert(id.to_string());
        let record = self
            .records
            .entry(id.to_string())
            .or_insert_with(|| SyncRecord::new(id, status, timestamp));
        record.status = status;
        record.synced_at = timestamp;
        record
    }

    pub fn mark_synced(
        &mut self,
        id: &str,
        title: &str,
        local_path: Option<PathBuf>,
        at: DateTime<Utc>,
    ) {
        let record = self.upsert(id, SyncStatus::Synced, at);
        record.title = title.to_string();
        record.local_path = local_path;
        record.last_error = None;
    }

    pub fn mark_failed(&mut self, id: &str, title: &str, error: &str, at: DateTime<Utc>) {
        let record = self.upsert(id, SyncStatus::Failed, at);
        if !title.is_empty() {
            record.title = title.to_string();
        }
        record.attempts = record.attempts.saturating_add(1);
        record.last_error = Some(error.to_string());
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &SyncRecord> {
        self.records.values()
    }

    #[cfg(test)]
    pub fn count(&self, status: SyncStatus) -> usize {
        self.records.values().filter(|r| r.status == status).count()
    }

    /// Records changed since load or the last commit, in id order.
    pub fn dirty_records(&self) -> impl Iterator<Item = &SyncRecord> {
        self.dirty.iter().filter_map(|id| self.records.get(id))
    }

    pub fn dirty_count(&self) -> usize {
        self.dirty.len()
    }

    /// Forget pending changes after they were written durably.
    pub fn mark_committed(&mut self) {
        self.dirty.clear();
    }
}

/// Statistics for a single sync run.
#[derive(Debug, Clone, Default)]
pub struct SyncRunStats {
    /// Number of items in the remote collection.
    pub items_seen: u64,
    /// Number of items newly synced in this run.
    pub items_synced: u64,
    /// Number of items that failed in this run.
    pub items_failed: u64,
    /// Whether the run was interrupted by a shutdown signal.
    pub interrupted: bool,
}

/// Summary of one collection in the record store.
#[derive(Debug, Clone)]
pub struct SyncSummary {
    pub collection_id: u64,
    pub total_records: u64,
    pub synced: u64,
    pub failed: u64,
    pub last_sync_started: Option<DateTime<Utc>>,
    pub last_sync_completed: Option<DateTime<Utc>>,
}
