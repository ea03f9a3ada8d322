//! Snapshot Storage Service
//!
//! SQLite-backed durable history of composite index snapshots. The
//! in-memory [`crate::HistoryStore`] only covers the last few days; this
//! table feeds the history endpoint for longer periods and survives
//! restarts.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};
use sentiment_core::{HistorySnapshot, SentimentLevel};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Mutex;

/// Snapshot storage service using SQLite
pub struct SnapshotStorage {
    conn: Mutex<Connection>,
}

impl SnapshotStorage {
    /// Create a new SnapshotStorage instance
    ///
    /// Creates the database file and tables if they don't exist.
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self, StorageError> {
        let conn = open_connection(db_path.as_ref())?;

        let storage = Self {
            conn: Mutex::new(conn),
        };
        storage.init_schema()?;

        Ok(storage)
    }

    /// Create an in-memory SnapshotStorage (useful for testing)
    pub fn new_in_memory() -> Result<Self, StorageError> {
        let conn = Connection::open_in_memory().map_err(StorageError::Database)?;

        let storage = Self {
            conn: Mutex::new(conn),
        };
        storage.init_schema()?;

        Ok(storage)
    }

    fn init_schema(&self) -> Result<(), StorageError> {
        let conn = self.conn.lock().map_err(|_| StorageError::LockError)?;

        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS index_snapshots (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                recorded_at INTEGER NOT NULL,
                index_value REAL NOT NULL,
                level TEXT NOT NULL,
                breakdown TEXT NOT NULL DEFAULT '{}',
                created_at INTEGER DEFAULT (strftime('%s', 'now'))
            );

            CREATE INDEX IF NOT EXISTS idx_snapshots_recorded_at
            ON index_snapshots(recorded_at);
            "#,
        )
        .map_err(StorageError::Database)?;

        Ok(())
    }

    /// Store a single snapshot
    pub fn store_snapshot(&self, snapshot: &HistorySnapshot) -> Result<(), StorageError> {
        let breakdown = serde_json::to_string(&snapshot.raw_breakdown)
            .map_err(|e| StorageError::Serialization(e.to_string()))?;

        let conn = self.conn.lock().map_err(|_| StorageError::LockError)?;

        conn.execute(
            r#"
            INSERT INTO index_snapshots (recorded_at, index_value, level, breakdown)
            VALUES (?1, ?2, ?3, ?4)
            "#,
            params![
                snapshot.recorded_at.timestamp_millis(),
                snapshot.index_value,
                snapshot.level.as_str(),
                breakdown,
            ],
        )
        .map_err(StorageError::Database)?;

        Ok(())
    }

    /// Snapshots recorded at or after `cutoff`, oldest first
    pub fn snapshots_since(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<HistorySnapshot>, StorageError> {
        let conn = self.conn.lock().map_err(|_| StorageError::LockError)?;

        let mut stmt = conn
            .prepare(
                r#"
            SELECT recorded_at, index_value, level, breakdown
            FROM index_snapshots
            WHERE recorded_at >= ?1
            ORDER BY recorded_at ASC, id ASC
            "#,
            )
            .map_err(StorageError::Database)?;

        let rows = stmt
            .query_map(params![cutoff.timestamp_millis()], read_row)
            .map_err(StorageError::Database)?
            .filter_map(|r| r.ok())
            .filter_map(into_snapshot)
            .collect();

        Ok(rows)
    }

    /// The most recent `limit` snapshots, oldest first
    pub fn latest_snapshots(&self, limit: usize) -> Result<Vec<HistorySnapshot>, StorageError> {
        let conn = self.conn.lock().map_err(|_| StorageError::LockError)?;

        let mut stmt = conn
            .prepare(
                r#"
            SELECT recorded_at, index_value, level, breakdown
            FROM index_snapshots
            ORDER BY recorded_at DESC, id DESC
            LIMIT ?1
            "#,
            )
            .map_err(StorageError::Database)?;

        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let mut rows: Vec<HistorySnapshot> = stmt
            .query_map(params![limit], read_row)
            .map_err(StorageError::Database)?
            .filter_map(|r| r.ok())
            .filter_map(into_snapshot)
            .collect();

        rows.reverse();
        Ok(rows)
    }

    /// Total number of stored snapshots
    pub fn count(&self) -> Result<usize, StorageError> {
        let conn = self.conn.lock().map_err(|_| StorageError::LockError)?;

        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM index_snapshots", [], |row| row.get(0))
            .map_err(StorageError::Database)?;

        Ok(count as usize)
    }

    /// Delete snapshots recorded before `cutoff`
    pub fn prune_older_than(&self, cutoff: DateTime<Utc>) -> Result<usize, StorageError> {
        let conn = self.conn.lock().map_err(|_| StorageError::LockError)?;

        let deleted = conn
            .execute(
                "DELETE FROM index_snapshots WHERE recorded_at < ?1",
                params![cutoff.timestamp_millis()],
            )
            .map_err(StorageError::Database)?;

        Ok(deleted)
    }
}

type SnapshotRow = (i64, f64, String, String);

fn read_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<SnapshotRow> {
    Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
}

/// Rows with an unknown level are skipped; a corrupt breakdown is dropped
fn into_snapshot((recorded_at, index_value, level, breakdown): SnapshotRow) -> Option<HistorySnapshot> {
    let level: SentimentLevel = level.parse().ok()?;
    let recorded_at = DateTime::from_timestamp_millis(recorded_at)?;
    let raw_breakdown: BTreeMap<String, f64> = serde_json::from_str(&breakdown).unwrap_or_default();

    Some(HistorySnapshot {
        index_value,
        level,
        recorded_at,
        raw_breakdown,
    })
}

/// Open a database file, creating its parent directory first
pub(crate) fn open_connection(db_path: &Path) -> Result<Connection, StorageError> {
    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).map_err(|e| {
                StorageError::Io(format!("Failed to create database directory: {}", e))
            })?;
        }
    }

    Connection::open(db_path).map_err(StorageError::Database)
}

/// Errors that can occur during storage operations
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Invalid input: {0}")]
    Validation(String),

    #[error("Failed to acquire lock")]
    LockError,
}
