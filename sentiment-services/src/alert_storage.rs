//! Alert Storage Service
//!
//! SQLite-backed alert definitions. `mark_triggered` is a conditional
//! update, so exactly one caller ever wins the pending -> triggered
//! transition even when several processes share the database file.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use sentiment_core::{AlertCondition, AlertDefinition, NewAlert};
use std::path::Path;
use std::sync::Mutex;

use crate::snapshot_storage::{open_connection, StorageError};

const SELECT_ALERT: &str = r#"
    SELECT id, owner_id, metric, condition, target_value, triggered, triggered_at, created_at
    FROM alerts
"#;

/// Alert storage service using SQLite
pub struct AlertStorage {
    conn: Mutex<Connection>,
}

impl AlertStorage {
    /// Create a new AlertStorage instance
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

    /// Create an in-memory AlertStorage (useful for testing)
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
            CREATE TABLE IF NOT EXISTS alerts (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                owner_id TEXT NOT NULL,
                metric TEXT NOT NULL,
                condition TEXT NOT NULL,
                target_value REAL NOT NULL,
                triggered INTEGER NOT NULL DEFAULT 0,
                triggered_at INTEGER,
                created_at INTEGER NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_alerts_pending
            ON alerts(triggered);

            CREATE INDEX IF NOT EXISTS idx_alerts_owner
            ON alerts(owner_id, created_at);
            "#,
        )
        .map_err(StorageError::Database)?;

        Ok(())
    }

    /// Validate and persist a new pending alert
    pub fn create_alert(&self, alert: NewAlert) -> Result<AlertDefinition, StorageError> {
        let alert = alert
            .validated()
            .map_err(|e| StorageError::Validation(e.to_string()))?;
        let created_at = Utc::now();

        let conn = self.conn.lock().map_err(|_| StorageError::LockError)?;

        conn.execute(
            r#"
            INSERT INTO alerts (owner_id, metric, condition, target_value, triggered, created_at)
            VALUES (?1, ?2, ?3, ?4, 0, ?5)
            "#,
            params![
                alert.owner_id,
                alert.metric,
                alert.condition.as_str(),
                alert.target_value,
                created_at.timestamp_millis(),
            ],
        )
        .map_err(StorageError::Database)?;

        let id = conn.last_insert_rowid();

        Ok(AlertDefinition {
            id,
            owner_id: alert.owner_id,
            symbol_or_metric: alert.metric,
            condition: alert.condition,
            target_value: alert.target_value,
            triggered: false,
            triggered_at: None,
            // Round-trip through millis so the value matches what a read returns
            created_at: DateTime::from_timestamp_millis(created_at.timestamp_millis())
                .unwrap_or(created_at),
        })
    }

    pub fn get_alert(&self, id: i64) -> Result<Option<AlertDefinition>, StorageError> {
        let conn = self.conn.lock().map_err(|_| StorageError::LockError)?;

        let sql = format!("{} WHERE id = ?1", SELECT_ALERT);
        let row = conn
            .query_row(&sql, params![id], read_row)
            .optional()
            .map_err(StorageError::Database)?;

        Ok(row.and_then(into_definition))
    }

    /// All alerts that have not fired yet, oldest first
    pub fn pending_alerts(&self) -> Result<Vec<AlertDefinition>, StorageError> {
        let conn = self.conn.lock().map_err(|_| StorageError::LockError)?;

        let sql = format!("{} WHERE triggered = 0 ORDER BY id ASC", SELECT_ALERT);
        let mut stmt = conn.prepare(&sql).map_err(StorageError::Database)?;

        let alerts = stmt
            .query_map([], read_row)
            .map_err(StorageError::Database)?
            .filter_map(|r| r.ok())
            .filter_map(into_definition)
            .collect();

        Ok(alerts)
    }

    /// Every alert of one owner, newest first
    pub fn alerts_for_owner(&self, owner_id: &str) -> Result<Vec<AlertDefinition>, StorageError> {
        let conn = self.conn.lock().map_err(|_| StorageError::LockError)?;

        let sql = format!("{} WHERE owner_id = ?1 ORDER BY id DESC", SELECT_ALERT);
        let mut stmt = conn.prepare(&sql).map_err(StorageError::Database)?;

        let alerts = stmt
            .query_map(params![owner_id.trim()], read_row)
            .map_err(StorageError::Database)?
            .filter_map(|r| r.ok())
            .filter_map(into_definition)
            .collect();

        Ok(alerts)
    }

    /// Move a pending alert to triggered.
    ///
    /// Returns `true` only for the call that performed the transition; an
    /// already-triggered or unknown alert yields `false`.
    pub fn mark_triggered(&self, id: i64, at: DateTime<Utc>) -> Result<bool, StorageError> {
        let conn = self.conn.lock().map_err(|_| StorageError::LockError)?;

        let changed = conn
            .execute(
                "UPDATE alerts SET triggered = 1, triggered_at = ?2 WHERE id = ?1 AND triggered = 0",
                params![id, at.timestamp_millis()],
            )
            .map_err(StorageError::Database)?;

        Ok(changed == 1)
    }
}

type AlertRow = (i64, String, String, String, f64, bool, Option<i64>, i64);

fn read_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<AlertRow> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
        row.get(6)?,
        row.get(7)?,
    ))
}

fn into_definition(
    (id, owner_id, metric, condition, target_value, triggered, triggered_at, created_at): AlertRow,
) -> Option<AlertDefinition> {
    let condition: AlertCondition = condition.parse().ok()?;

    Some(AlertDefinition {
        id,
        owner_id,
        symbol_or_metric: metric,
        condition,
        target_value,
        triggered,
        triggered_at: triggered_at.and_then(DateTime::from_timestamp_millis),
        created_at: DateTime::from_timestamp_millis(created_at)?,
    })
}
