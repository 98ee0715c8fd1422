//! SQLite-backed check history.
use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use sqlx::FromRow;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tracing::info;

use crate::monitor::{CheckResult, Store};

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(FromRow)]
struct CheckRow {
    monitor_name: String,
    timestamp: DateTime<Utc>,
    status: bool,
    latency_ms: i64,
    error_msg: Option<String>,
}

impl From<CheckRow> for CheckResult {
    fn from(row: CheckRow) -> Self {
        CheckResult {
            target: row.monitor_name,
            timestamp: row.timestamp,
            success: row.status,
            latency: Duration::from_millis(row.latency_ms.max(0) as u64),
            error: row.error_msg,
        }
    }
}

pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Opens (creating if needed) the database file at `path` in WAL mode.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal);
        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await?;

        let store = Self { pool };
        store.init_schema().await?;
        info!(path = %path.display(), "Opened check history database.");
        Ok(store)
    }

    /// A private in-memory database, gone once the store is dropped.
    pub async fn in_memory() -> Result<Self, StorageError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await?;
        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    async fn init_schema(&self) -> Result<(), StorageError> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS checks (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                monitor_name TEXT NOT NULL,
                timestamp DATETIME NOT NULL,
                status INTEGER NOT NULL,
                latency_ms INTEGER NOT NULL,
                error_msg TEXT
            )",
        )
        .execute(&self.pool)
        .await?;
        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_monitor_time ON checks(monitor_name, timestamp)",
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// The most recent `limit` results for `monitor_name`, oldest first.
    pub async fn history(
        &self,
        monitor_name: &str,
        limit: u32,
    ) -> Result<Vec<CheckResult>, StorageError> {
        let rows = sqlx::query_as::<_, CheckRow>(
            "SELECT monitor_name, timestamp, status, latency_ms, error_msg
             FROM checks
             WHERE monitor_name = ?
             ORDER BY timestamp DESC, id DESC
             LIMIT ?",
        )
        .bind(monitor_name)
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().rev().map(CheckResult::from).collect())
    }

    /// Deletes results older than `days` days. Returns the number removed.
    pub async fn prune_older_than(&self, days: u32) -> Result<u64, StorageError> {
        let cutoff = Utc::now() - ChronoDuration::days(i64::from(days));
        let deleted = sqlx::query("DELETE FROM checks WHERE timestamp < ?")
            .bind(cutoff)
            .execute(&self.pool)
            .await?
            .rows_affected();
        info!(days, deleted, "Pruned old check results.");
        Ok(deleted)
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[async_trait]
impl Store for SqliteStore {
    async fn log_check(&self, result: &CheckResult) -> Result<(), StorageError> {
        sqlx::query(
            "INSERT INTO checks (monitor_name, timestamp, status, latency_ms, error_msg)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&result.target)
        .bind(result.timestamp)
        .bind(result.success)
        .bind(i64::try_from(result.latency_ms()).unwrap_or(i64::MAX))
        .bind(result.error.as_deref())
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
