//! Database connection and query operations.

use crate::{migrations, DatabaseResult, NewReport, QueuedReport, ReportOperation, StatsKey};
use rusqlite::{params, Connection, Row};
use std::collections::HashMap;
use std::path::Path;
use tracing::debug;

const REPORT_COLUMNS: &str = "id, time, lat, lon, altitude, accuracy, radio, cell, wifi, cell_count, wifi_count, retry_number";

/// Database wrapper with query methods.
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Open a database at the given path, running migrations if needed.
    pub fn open(path: &Path) -> DatabaseResult<Self> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA temp_store = MEMORY;
            PRAGMA busy_timeout = 5000;
        ",
        )?;

        migrations::run_migrations(&conn)?;

        Ok(Self { conn })
    }

    /// Open an in-memory database for testing.
    pub fn open_in_memory() -> DatabaseResult<Self> {
        let conn = Connection::open_in_memory()?;
        // Note: WAL mode doesn't apply to in-memory databases
        conn.execute_batch("PRAGMA temp_store = MEMORY;")?;
        migrations::run_migrations(&conn)?;
        Ok(Self { conn })
    }

    /// Get a reference to the underlying connection.
    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    // ==========================================
    // Report queue
    // ==========================================

    /// Append a report to the queue, returning its id.
    pub fn insert_report(&self, report: &NewReport) -> DatabaseResult<i64> {
        self.conn.execute(
            "INSERT INTO reports (time, lat, lon, altitude, accuracy, radio, cell, wifi, cell_count, wifi_count, retry_number)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, 0)",
            params![
                report.timestamp,
                report.latitude,
                report.longitude,
                report.altitude,
                report.accuracy,
                report.radio,
                report.cell,
                report.wifi,
                report.cell_count,
                report.wifi_count,
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    /// Get a report by ID.
    pub fn get_report(&self, id: i64) -> DatabaseResult<Option<QueuedReport>> {
        let sql = format!("SELECT {} FROM reports WHERE id = ?1", REPORT_COLUMNS);
        let mut stmt = self.conn.prepare(&sql)?;

        match stmt.query_row(params![id], report_from_row) {
            Ok(report) => Ok(Some(report)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Number of reports currently queued.
    pub fn report_count(&self) -> DatabaseResult<i64> {
        let count = self
            .conn
            .query_row("SELECT COUNT(*) FROM reports", [], |row| row.get(0))?;
        Ok(count)
    }

    /// Highest queued report id, or 0 when the queue is empty.
    pub fn max_report_id(&self) -> DatabaseResult<i64> {
        let max = self
            .conn
            .query_row("SELECT COALESCE(MAX(id), 0) FROM reports", [], |row| {
                row.get(0)
            })?;
        Ok(max)
    }

    /// Read up to `limit` reports with `after_id < id <= up_to_id`, ordered by id.
    ///
    /// The statement and its cursor live only for the duration of this call, so
    /// they are released even when decoding a row fails halfway through.
    pub fn report_window(
        &self,
        after_id: i64,
        up_to_id: i64,
        limit: usize,
    ) -> DatabaseResult<Vec<QueuedReport>> {
        let sql = format!(
            "SELECT {} FROM reports WHERE id > ?1 AND id <= ?2 ORDER BY id ASC LIMIT ?3",
            REPORT_COLUMNS
        );
        let mut stmt = self.conn.prepare(&sql)?;

        let rows = stmt
            .query_map(params![after_id, up_to_id, limit as i64], report_from_row)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(rows)
    }

    /// Delete every report with `min_id <= id <= max_id`.
    pub fn delete_reports_between(&self, min_id: i64, max_id: i64) -> DatabaseResult<usize> {
        let count = self.conn.execute(
            "DELETE FROM reports WHERE id BETWEEN ?1 AND ?2",
            params![min_id, max_id],
        )?;
        debug!(min_id, max_id, count, "Deleted report range");
        Ok(count)
    }

    /// Apply a list of row operations in a single transaction.
    ///
    /// Either every operation is applied or none is.
    pub fn apply_report_operations(&self, operations: &[ReportOperation]) -> DatabaseResult<()> {
        if operations.is_empty() {
            return Ok(());
        }

        let tx = self.conn.unchecked_transaction()?;
        {
            let mut update = tx.prepare("UPDATE reports SET retry_number = ?2 WHERE id = ?1")?;
            let mut delete = tx.prepare("DELETE FROM reports WHERE id = ?1")?;

            for op in operations {
                match *op {
                    ReportOperation::UpdateRetryCount { id, retry_count } => {
                        update.execute(params![id, retry_count])?;
                    }
                    ReportOperation::Delete { id } => {
                        delete.execute(params![id])?;
                    }
                }
            }
        }
        tx.commit()?;

        debug!(count = operations.len(), "Applied report operations");
        Ok(())
    }

    // ==========================================
    // Sync stats
    // ==========================================

    /// Read every stored stats entry as raw key/value strings.
    pub fn read_sync_stats(&self) -> DatabaseResult<HashMap<String, String>> {
        let mut stmt = self.conn.prepare("SELECT key, value FROM sync_stats")?;

        let entries = stmt
            .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))?
            .collect::<Result<HashMap<_, _>, _>>()?;

        Ok(entries)
    }

    /// Upsert stats entries in a single transaction.
    pub fn write_sync_stats(&self, entries: &[(StatsKey, i64)]) -> DatabaseResult<()> {
        let tx = self.conn.unchecked_transaction()?;
        {
            let mut upsert = tx.prepare(
                "INSERT INTO sync_stats (key, value) VALUES (?1, ?2)
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            )?;
            for (key, value) in entries {
                upsert.execute(params![key.as_str(), value.to_string()])?;
            }
        }
        tx.commit()?;
        Ok(())
    }
}

fn report_from_row(row: &Row<'_>) -> rusqlite::Result<QueuedReport> {
    Ok(QueuedReport {
        id: row.get(0)?,
        timestamp: row.get(1)?,
        latitude: row.get(2)?,
        longitude: row.get(3)?,
        altitude: row.get(4)?,
        accuracy: row.get(5)?,
        radio: row.get(6)?,
        cell: row.get(7)?,
        wifi: row.get(8)?,
        cell_count: row.get(9)?,
        wifi_count: row.get(10)?,
        retry_count: row.get(11)?,
    })
}
