//! Reconciliation engine: compares the remote favorites list with the record
//! store and turns every new (or previously failed) item into a Markdown file.
//!
//! The run is strictly sequential. Requests are spaced by [`Paced`], the store
//! is committed every `commit_every` processed items, and a shutdown signal
//! stops the loop after the in-flight item so a partial run is never lost.

pub mod error;
pub mod pacing;
pub mod pending;
pub mod report;
pub mod types;

use std::io::IsTerminal;
use std::path::PathBuf;
use std::time::Instant;

use async_trait::async_trait;
use chrono::Utc;
use indicatif::{ProgressBar, ProgressStyle};
use tokio_util::sync::CancellationToken;

use crate::state::{RecordStore, SyncRecords, SyncRunStats};

pub use error::{ItemError, SyncError};
pub use pacing::{Paced, PacingConfig};
pub use pending::{compute_pending, count_already_synced};
pub use report::{FailedItem, SyncReport};
pub use types::{ItemDetail, ItemStats, RemoteItem, Subtitle};

/// Source of the authoritative remote item list.
#[async_trait]
pub trait ItemFetcher: Send + Sync {
    /// Every item of the collection, in remote order.
    async fn fetch_items(&self, collection_id: u64) -> anyhow::Result<Vec<RemoteItem>>;
}

/// Source of per-item metadata.
#[async_trait]
pub trait DetailFetcher: Send + Sync {
    async fn fetch_detail(&self, id: &str) -> anyhow::Result<ItemDetail>;
}

/// Persists one item's metadata as a local file.
#[async_trait]
pub trait ItemWriter: Send + Sync {
    /// Where an item with this id and title would be written.
    fn target_path(&self, id: &str, title: &str) -> PathBuf;

    /// Write the item and return the path of the file.
    async fn write(&self, detail: &ItemDetail) -> anyhow::Result<PathBuf>;
}

/// Knobs for a single run.
#[derive(Debug, Clone)]
pub struct SyncOptions {
    /// Commit the store after this many processed items (minimum 1).
    pub commit_every: usize,
    pub pacing: PacingConfig,
    /// Fetch the list and report pending items without touching anything.
    pub dry_run: bool,
    pub show_progress: bool,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            commit_every: 1,
            pacing: PacingConfig::default(),
            dry_run: false,
            show_progress: true,
        }
    }
}

/// Runs one sync of one collection against its collaborators.
pub struct Reconciler<'a> {
    items: &'a dyn ItemFetcher,
    details: &'a dyn DetailFetcher,
    writer: &'a dyn ItemWriter,
    store: &'a dyn RecordStore,
    options: SyncOptions,
}

impl<'a> Reconciler<'a> {
    pub fn new(
        items: &'a dyn ItemFetcher,
        details: &'a dyn DetailFetcher,
        writer: &'a dyn ItemWriter,
        store: &'a dyn RecordStore,
        options: SyncOptions,
    ) -> Self {
        Self {
            items,
            details,
            writer,
            store,
            options,
        }
    }

    /// Sync every pending item of `collection_id`.
    ///
    /// Fatal errors (unreadable store, failed list fetch, failed commit) are
    /// returned as `Err`. Per-item failures are recorded as `Failed` and
    /// listed in the report.
    pub async fn synchronize(
        &self,
        collection_id: u64,
        shutdown: &CancellationToken,
    ) -> Result<SyncReport, SyncError> {
        let started = Instant::now();

        let mut records = self.store.load_records(collection_id).await?;
        if records.is_empty() {
            tracing::info!(collection_id, "No sync records for this collection yet, first run");
        } else {
            tracing::debug!(collection_id, known = records.len(), "Loaded sync records");
        }

        let remote = self
            .items
            .fetch_items(collection_id)
            .await
            .map_err(|cause| SyncError::Fetch {
                collection_id,
                cause,
            })?;

        let pending = compute_pending(&remote, &records);
        let already_synced = count_already_synced(&remote, &records);
        let remote_total = already_synced + pending.len();

        tracing::info!(
            collection_id,
            total = remote_total,
            already_synced,
            pending = pending.len(),
            "Fetched favorites list"
        );

        let mut report = SyncReport {
            collection_id,
            remote_total,
            already_synced,
            dry_run: self.options.dry_run,
            ..Default::default()
        };

        if self.options.dry_run {
            for item in &pending {
                tracing::info!(
                    id = %item.id,
                    "[DRY RUN] Would write {}",
                    self.writer.target_path(&item.id, &item.title).display()
                );
            }
            report.skipped = pending.len();
            report.log_summary(started.elapsed());
            return Ok(report);
        }

        if pending.is_empty() {
            tracing::info!("Nothing new to sync");
            report.log_summary(started.elapsed());
            return Ok(report);
        }

        let run_id = self.store.start_sync_run(collection_id).await?;
        let commit_every = self.options.commit_every.max(1);
        let pb = create_progress_bar(!self.options.show_progress, pending.len() as u64);

        let mut paced = Paced::new(pending.iter(), self.options.pacing);
        let mut processed = 0usize;
        let mut commit_error = None;
        loop {
            let item = tokio::select! {
                biased;
                () = shutdown.cancelled() => {
                    pb.suspend(|| tracing::info!("Shutdown requested, stopping after the current item"));
                    report.interrupted = true;
                    break;
                }
                next = paced.next() => match next {
                    Some(item) => *item,
                    None => break,
                },
            };

            pb.set_message(item.title.clone());
            match self.sync_item(item).await {
                Ok((title, path)) => {
                    tracing::debug!(id = %item.id, path = %path.display(), "Synced");
                    records.mark_synced(&item.id, &title, Some(path), Utc::now());
                    report.newly_synced += 1;
                }
                Err(e) => {
                    let error = e.to_string();
                    pb.suspend(|| {
                        tracing::warn!(id = %item.id, error = %error, "Failed to sync {}", item.title)
                    });
                    records.mark_failed(&item.id, &item.title, &error, Utc::now());
                    report.failed.push(FailedItem {
                        id: item.id.clone(),
                        title: item.title.clone(),
                        error,
                    });
                }
            }
            pb.inc(1);
            processed += 1;

            if processed % commit_every == 0 {
                if let Err(e) = self.commit(collection_id, &mut records).await {
                    commit_error = Some(e);
                    break;
                }
            }
        }
        pb.finish_and_clear();

        if let Some(e) = commit_error {
            report.interrupted = true;
            self.finish_run(run_id, remote_total, &report).await;
            return Err(e);
        }

        self.commit(collection_id, &mut records).await?;
        report.skipped = pending.len() - processed;
        self.finish_run(run_id, remote_total, &report).await;

        report.log_summary(started.elapsed());
        Ok(report)
    }

    /// Close the `sync_runs` row. Failure here only warns.
    async fn finish_run(&self, run_id: i64, remote_total: usize, report: &SyncReport) {
        let stats = SyncRunStats {
            items_seen: remote_total as u64,
            items_synced: report.newly_synced as u64,
            items_failed: report.failed_count() as u64,
            interrupted: report.interrupted,
        };
        if let Err(e) = self.store.complete_sync_run(run_id, &stats).await {
            tracing::warn!(error = %e, "Failed to record sync run completion");
        }
    }

    async fn sync_item(&self, item: &RemoteItem) -> Result<(String, PathBuf), ItemError> {
        let detail = self
            .details
            .fetch_detail(&item.id)
            .await
            .map_err(ItemError::Detail)?;
        let path = self.writer.write(&detail).await.map_err(ItemError::Write)?;
        Ok((detail.title, path))
    }

    async fn commit(&self, collection_id: u64, records: &mut SyncRecords) -> Result<(), SyncError> {
        if records.dirty_count() == 0 {
            return Ok(());
        }
        self.store.save_records(collection_id, records).await?;
        records.mark_committed();
        Ok(())
    }
}

fn create_progress_bar(no_progress_bar: bool, total: u64) -> ProgressBar {
    if no_progress_bar || !std::io::stdout().is_terminal() {
        return ProgressBar::hidden();
    }
    let pb = ProgressBar::new(total);
    let style = ProgressStyle::with_template(
        "[{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta}) {wide_msg}",
    )
    .unwrap_or_else(|_| ProgressStyle::default_bar())
    .progress_chars("=> ");
    pb.set_style(style);
    pb
}
