//! Record store trait and SQLite implementation.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use rusqlite::{Connection, ErrorCode, OptionalExtension};

use super::error::StateError;
use super::schema;
use super::types::{SyncRecord, SyncRecords, SyncRunStats, SyncStatus, SyncSummary};

/// Durable storage for sync records.
///
/// Object safe so the reconciliation engine can take `&dyn RecordStore`.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Load every record of a collection. An unknown collection yields an
    /// empty mapping.
    async fn load_records(&self, collection_id: u64) -> Result<SyncRecords, StateError>;

    /// Persist all records changed since load or the last commit.
    ///
    /// Runs in one transaction: after a crash either all of them are durable
    /// or none are. Records missing from `records` are left untouched.
    async fn save_records(
        &self,
        collection_id: u64,
        records: &SyncRecords,
    ) -> Result<(), StateError>;

    /// Start a new sync run and return its ID.
    async fn start_sync_run(&self, collection_id: u64) -> Result<i64, StateError>;

    /// Complete a sync run with statistics.
    async fn complete_sync_run(&self, run_id: i64, stats: &SyncRunStats) -> Result<(), StateError>;

    /// Summary of one collection.
    async fn get_summary(&self, collection_id: u64) -> Result<SyncSummary, StateError>;

    /// Failed records of one collection.
    async fn get_failed(&self, collection_id: u64) -> Result<Vec<SyncRecord>, StateError>;

    /// Every collection that has records or runs.
    async fn collections(&self) -> Result<Vec<u64>, StateError>;
}

/// SQLite implementation of the record store.
pub struct SqliteRecordStore {
    /// Wrapped in Mutex because rusqlite::Connection is not Sync.
    conn: Mutex<Connection>,
    path: PathBuf,
}

impl std::fmt::Debug for SqliteRecordStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteRecordStore")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

/// Map SQLite's "this is not a usable database" codes to `Corrupted` so the
/// caller can tell a damaged store apart from an I/O problem.
fn classify_open_error(path: &Path, source: rusqlite::Error) -> StateError {
    match source.sqlite_error_code() {
        Some(ErrorCode::NotADatabase) | Some(ErrorCode::DatabaseCorrupt) => StateError::Corrupted {
            path: path.to_path_buf(),
            reason: source.to_string(),
        },
        _ => StateError::Open {
            path: path.to_path_buf(),
            source,
        },
    }
}

fn check_integrity(conn: &Connection, path: &Path) -> Result<(), StateError> {
    let verdict: String = conn
        .query_row("PRAGMA quick_check", [], |row| row.get(0))
        .map_err(|e| classify_open_error(path, e))?;
    if verdict != "ok" {
        return Err(StateError::Corrupted {
            path: path.to_path_buf(),
            reason: format!("integrity check failed: {}", verdict),
        });
    }
    Ok(())
}

impl SqliteRecordStore {
    /// Open or create a record store at the given path.
    ///
    /// A file that exists but is not a healthy SQLite database yields
    /// `StateError::Corrupted`; it is never replaced.
    pub async fn open(path: &Path) -> Result<Self, StateError> {
        let path = path.to_path_buf();
        let path_clone = path.clone();

        let conn = tokio::task::spawn_blocking(move || {
            if let Some(parent) = path_clone.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent).map_err(|source| StateError::CreateDir {
                    path: parent.to_path_buf(),
                    source,
                })?;
            }

            let conn =
                Connection::open(&path_clone).map_err(|e| classify_open_error(&path_clone, e))?;

            // The first statement touching the file is where SQLite notices a
            // foreign or damaged header.
            conn.pragma_update(None, "journal_mode", "WAL")
                .map_err(|e| classify_open_error(&path_clone, e))?;
            conn.pragma_update(None, "synchronous", "NORMAL")
                .map_err(|e| classify_open_error(&path_clone, e))?;

            check_integrity(&conn, &path_clone)?;

            schema::migrate(&conn).map_err(|e| match e {
                StateError::Migration(source) => classify_open_error(&path_clone, source),
                other => other,
            })?;

            Ok::<_, StateError>(conn)
        })
        .await??;

        Ok(Self {
            conn: Mutex::new(conn),
            path,
        })
    }

    /// Open an in-memory store (for testing).
    #[cfg(test)]
    pub fn open_in_memory() -> Result<Self, StateError> {
        let conn = Connection::open_in_memory().map_err(|e| StateError::Open {
            path: PathBuf::from(":memory:"),
            source: e,
        })?;
        schema::migrate(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
            path: PathBuf::from(":memory:"),
        })
    }

    #[cfg(test)]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>, StateError> {
        self.conn
            .lock()
            .map_err(|e| StateError::Query(e.to_string()))
    }

    fn corrupted(&self, reason: String) -> StateError {
        StateError::Corrupted {
            path: self.path.clone(),
            reason,
        }
    }
}

#[async_trait]
impl RecordStore for SqliteRecordStore {
    async fn load_records(&self, collection_id: u64) -> Result<SyncRecords, StateError> {
        let rows: Vec<RawRecord> = {
            let conn = self.lock()?;
            let mut stmt = conn
                .prepare(
                    "SELECT item_id, title, status, synced_at, attempts, last_error, local_path FROM sync_records WHERE collection_id = ?1 ORDER BY item_id",
                )
                .map_err(StateError::query)?;
            let mapped = stmt
                .query_map([collection_id as i64], RawRecord::from_row)
                .map_err(StateError::query)?;
            mapped
                .collect::<Result<Vec<_>, _>>()
                .map_err(|e| self.corrupted(format!("unreadable row: {}", e)))?
        };

        let records = rows
            .into_iter()
            .map(|raw| raw.into_record().map_err(|reason| self.corrupted(reason)))
            .collect::<Result<Vec<_>, _>>()?;

        tracing::debug!(
            collection_id,
            count = records.len(),
            "Loaded sync records"
        );
        Ok(SyncRecords::from_committed(records))
    }

    async fn save_records(
        &self,
        collection_id: u64,
        records: &SyncRecords,
    ) -> Result<(), StateError> {
        if records.dirty_count() == 0 {
            return Ok(());
        }

        let mut conn = self.lock()?;
        let tx = conn.transaction().map_err(StateError::query)?;
        {
            let mut stmt = tx
                .prepare_cached(
                    r#"
                    INSERT INTO sync_records (collection_id, item_id, title, status, synced_at, attempts, last_error, local_path)
                    VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                    ON CONFLICT(collection_id, item_id) DO UPDATE SET
                        title = excluded.title,
                        status = excluded.status,
                        synced_at = excluded.synced_at,
                        attempts = excluded.attempts,
                        last_error = excluded.last_error,
                        local_path = excluded.local_path
                    "#,
                )
                .map_err(StateError::query)?;

            for record in records.dirty_records() {
                stmt.execute(rusqlite::params![
                    collection_id as i64,
                    &record.id,
                    &record.title,
                    record.status.as_str(),
                    record.synced_at.timestamp(),
                    record.attempts as i64,
                    record.last_error.as_deref(),
                    record
                        .local_path
                        .as_ref()
                        .map(|p| p.to_string_lossy().into_owned()),
                ])
                .map_err(StateError::query)?;
            }
        }
        // Dropping an uncommitted transaction rolls it back.
        tx.commit().map_err(StateError::query)?;

        tracing::debug!(
            collection_id,
            count = records.dirty_count(),
            "Committed sync records"
        );
        Ok(())
    }

    async fn start_sync_run(&self, collection_id: u64) -> Result<i64, StateError> {
        let started_at = Utc::now().timestamp();
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO sync_runs (collection_id, started_at) VALUES (?1, ?2)",
            rusqlite::params![collection_id as i64, started_at],
        )
        .map_err(StateError::query)?;
        Ok(conn.last_insert_rowid())
    }

    async fn complete_sync_run(&self, run_id: i64, stats: &SyncRunStats) -> Result<(), StateError> {
        let completed_at = Utc::now().timestamp();
        let conn = self.lock()?;
        conn.execute(
            "UPDATE sync_runs SET completed_at = ?1, items_seen = ?2, items_synced = ?3, items_failed = ?4, interrupted = ?5 WHERE id = ?6",
            rusqlite::params![
                completed_at,
                stats.items_seen as i64,
                stats.items_synced as i64,
                stats.items_failed as i64,
                stats.interrupted as i32,
                run_id,
            ],
        )
        .map_err(StateError::query)?;
        Ok(())
    }

    async fn get_summary(&self, collection_id: u64) -> Result<SyncSummary, StateError> {
        let conn = self.lock()?;
        let cid = collection_id as i64;

        let count_with = |sql: &str| -> Result<u64, StateError> {
            conn.query_row(sql, [cid], |row| row.get::<_, i64>(0))
                .map(|n| n as u64)
                .map_err(StateError::query)
        };

        let total_records =
            count_with("SELECT COUNT(*) FROM sync_records WHERE collection_id = ?1")?;
        let synced = count_with(
            "SELECT COUNT(*) FROM sync_records WHERE collection_id = ?1 AND status = 'synced'",
        )?;
        let failed = count_with(
            "SELECT COUNT(*) FROM sync_records WHERE collection_id = ?1 AND status = 'failed'",
        )?;

        let last_sync_started: Option<i64> = conn
            .query_row(
                "SELECT MAX(started_at) FROM sync_runs WHERE collection_id = ?1",
                [cid],
                |row| row.get::<_, Option<i64>>(0),
            )
            .optional()
            .map_err(StateError::query)?
            .flatten();

        let last_sync_completed: Option<i64> = conn
            .query_row(
                "SELECT MAX(completed_at) FROM sync_runs WHERE collection_id = ?1 AND completed_at IS NOT NULL",
                [cid],
                |row| row.get::<_, Option<i64>>(0),
            )
            .optional()
            .map_err(StateError::query)?
            .flatten();

        Ok(SyncSummary {
            collection_id,
            total_records,
            synced,
            failed,
            last_sync_started: last_sync_started.and_then(|ts| Utc.timestamp_opt(ts, 0).single()),
            last_sync_completed: last_sync_completed
                .and_then(|ts| Utc.timestamp_opt(ts, 0).single()),
        })
    }

    async fn get_failed(&self, collection_id: u64) -> Result<Vec<SyncRecord>, StateError> {
        let records = self.load_records(collection_id).await?;
        Ok(records
            .iter()
            .filter(|r| r.status == SyncStatus::Failed)
            .cloned()
            .collect())
    }

    async fn collections(&self) -> Result<Vec<u64>, StateError> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(
                "SELECT collection_id FROM sync_records UNION SELECT collection_id FROM sync_runs ORDER BY 1",
            )
            .map_err(StateError::query)?;
        let ids = stmt
            .query_map([], |row| row.get::<_, i64>(0))
            .map_err(StateError::query)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(StateError::query)?;
        Ok(ids.into_iter().map(|id| id as u64).collect())
    }
}

/// A row as stored, before validation.
struct RawRecord {
    id: String,
    title: String,
    status: String,
    synced_at: i64,
    attempts: i64,
    last_error: Option<String>,
    local_path: Option<String>,
}

impl RawRecord {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            title: row.get(1)?,
            status: row.get(2)?,
            synced_at: row.get(3)?,
            attempts: row.get(4)?,
            last_error: row.get(5)?,
            local_path: row.get(6)?,
        })
    }

    /// Validate a stored row. Unlike a lenient default, an unknown status
    /// must surface: silently treating it as absent would re-sync the item.
    fn into_record(self) -> Result<SyncRecord, String> {
        let status = SyncStatus::from_str(&self.status)
            .ok_or_else(|| format!("item {} has unknown status '{}'", self.id, self.status))?;
        let synced_at: DateTime<Utc> = Utc
            .timestamp_opt(self.synced_at, 0)
            .single()
            .ok_or_else(|| format!("item {} has invalid timestamp {}", self.id, self.synced_at))?;
        let attempts = u32::try_from(self.attempts)
            .map_err(|_| format!("item {} has invalid attempt count {}", self.id, self.attempts))?;

        Ok(SyncRecord {
            id: self.id,
            title: self.title,
            local_path: self.local_path.map(PathBuf::from),
            last_error: self.last_error,
            synced_at,
            attempts,
            status,
        })
    }
}
