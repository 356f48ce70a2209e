//! Set difference between the remote list and the record store.

use std::collections::HashSet;

use super::types::RemoteItem;
use crate::state::{SyncRecords, SyncStatus};

/// Items that still need syncing, in remote-list order.
///
/// An item is pending when it has no record or its record is `Failed`.
/// Duplicate ids in the remote list are kept once, at their first position.
/// Records whose item is no longer in the remote list are ignored.
pub fn compute_pending<'a>(remote: &'a [RemoteItem], records: &SyncRecords) -> Vec<&'a RemoteItem> {
    let mut seen: HashSet<&str> = HashSet::with_capacity(remote.len());
    remote
        .iter()
        .filter(|item| seen.insert(item.id.as_str()))
        .filter(|item| records.status(&item.id) != Some(SyncStatus::Synced))
        .collect()
}

/// Number of distinct remote items already synced by earlier runs.
pub fn count_already_synced(remote: &[RemoteItem], records: &SyncRecords) -> usize {
    remote
        .iter()
        .map(|item| item.id.as_str())
        .collect::<HashSet<_>>()
        .into_iter()
        .filter(|id| records.status(id) == Some(SyncStatus::Synced))
        .count()
}
