//! Outcome of a sync run.

use std::fmt;
use std::time::Duration;

/// An item whose detail fetch or write failed during this run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedItem {
    pub id: String,
    pub title: String,
    pub error: String,
}

/// Counts and failures of one run over one collection.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub collection_id: u64,
    /// Distinct items in the remote list.
    pub remote_total: usize,
    /// Items skipped because an earlier run synced them.
    pub already_synced: usize,
    /// Items written by this run.
    pub newly_synced: usize,
    pub failed: Vec<FailedItem>,
    /// Pending items left unprocessed because the run was interrupted
    /// (or, for a dry run, every pending item).
    pub skipped: usize,
    pub interrupted: bool,
    pub dry_run: bool,
}

impl SyncReport {
    pub fn failed_count(&self) -> usize {
        self.failed.len()
    }

    pub fn has_failures(&self) -> bool {
        !self.failed.is_empty()
    }

    /// Log the end-of-run summary block.
    pub fn log_summary(&self, elapsed: Duration) {
        if self.dry_run {
            tracing::info!("── Dry Run Summary ──");
            tracing::info!(
                "  {} would be synced, {} already synced, {} total",
                self.skipped,
                self.already_synced,
                self.remote_total
            );
            return;
        }

        tracing::info!("── Summary ──");
        tracing::info!(
            "  {} synced, {} already synced, {} failed, {} total",
            self.newly_synced,
            self.already_synced,
            self.failed_count(),
            self.remote_total
        );
        if self.interrupted {
            tracing::warn!("  interrupted, {} items left for the next run", self.skipped);
        }
        tracing::info!("  elapsed: {}", format_duration(elapsed));
        for item in &self.failed {
            tracing::error!(id = %item.id, "Sync failed for {}: {}", item.title, item.error);
        }
    }
}

impl fmt::Display for SyncReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.dry_run {
            return write!(
                f,
                "collection {}: {} total, {} already synced, {} would be synced (dry run)",
                self.collection_id, self.remote_total, self.already_synced, self.skipped
            );
        }
        write!(
            f,
            "collection {}: {} total, {} already synced, {} newly synced, {} failed",
            self.collection_id,
            self.remote_total,
            self.already_synced,
            self.newly_synced,
            self.failed_count()
        )?;
        if self.interrupted {
            write!(f, ", interrupted with {} left", self.skipped)?;
        }
        Ok(())
    }
}

pub(crate) fn format_duration(d: Duration) -> String {
    let total_secs = d.as_secs();
    let hours = total_secs / 3600;
    let mins = (total_secs % 3600) / 60;
    let secs = total_secs % 60;

    if hours > 0 {
        format!("{}h {:02}m {:02}s", hours, mins, secs)
    } else if mins > 0 {
        format!("{}m {:02}s", mins, secs)
    } else {
        format!("{}s", secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::from_secs(7)), "7s");
        assert_eq!(format_duration(Duration::from_secs(65)), "1m 05s");
        assert_eq!(format_duration(Duration::from_secs(3725)), "1h 02m 05s");
    }

    #[test]
    fn test_display_counts() {
        let report = SyncReport {
            collection_id: 42,
            remote_total: 4,
            already_synced: 1,
            newly_synced: 2,
            failed: vec![FailedItem {
                id: "BVd".into(),
                title: "D".into(),
                error: "HTTP 500".into(),
            }],
            ..Default::default()
        };
        assert_eq!(
            report.to_string(),
            "collection 42: 4 total, 1 already synced, 2 newly synced, 1 failed"
        );
        assert!(report.has_failures());
    }

    #[test]
    fn test_display_interrupted() {
        let report = SyncReport {
            collection_id: 1,
            remote_total: 10,
            newly_synced: 3,
            skipped: 7,
            interrupted: true,
            ..Default::default()
        };
        assert!(report.to_string().ends_with("interrupted with 7 left"));
        assert!(!report.has_failures());
    }

    #[test]
    fn test_display_dry_run() {
        let report = SyncReport {
            collection_id: 1,
            remote_total: 3,
            already_synced: 1,
            skipped: 2,
            dry_run: true,
            ..Default::default()
        };
        assert!(report.to_string().contains("2 would be synced"));
    }
}
