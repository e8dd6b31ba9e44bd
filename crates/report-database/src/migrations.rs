//! Database migrations.
//!
//! Migrations are run in order and tracked in the `migrations` table.

use crate::DatabaseResult;
use rusqlite::Connection;
use tracing::{debug, info};

/// Current schema version.
pub const CURRENT_VERSION: i32 = 2;

/// Run all pending migrations.
pub fn run_migrations(conn: &Connection) -> DatabaseResult<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS migrations (
            version INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        )",
        [],
    )?;

    let current_version: i32 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM migrations",
        [],
        |row| row.get(0),
    )?;

    info!(current_version, target_version = CURRENT_VERSION, "Running migrations");

    if current_version < 1 {
        migrate_v1_reports(conn)?;
    }
    if current_version < 2 {
        migrate_v2_sync_stats(conn)?;
    }

    Ok(())
}

fn record_migration(conn: &Connection, version: i32, name: &str) -> DatabaseResult<()> {
    conn.execute(
        "INSERT INTO migrations (version, name) VALUES (?1, ?2)",
        rusqlite::params![version, name],
    )?;
    debug!(version, name, "Migration applied");
    Ok(())
}

/// V1: report queue.
fn migrate_v1_reports(conn: &Connection) -> DatabaseResult<()> {
    info!("Applying migration v1: reports");

    // AUTOINCREMENT keeps ids monotonic even after the tail of the queue is deleted.
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS reports (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            time INTEGER NOT NULL,
            lat REAL NOT NULL,
            lon REAL NOT NULL,
            altitude INTEGER,
            accuracy INTEGER,
            radio TEXT NOT NULL DEFAULT '',
            cell TEXT NOT NULL DEFAULT '[]',
            wifi TEXT NOT NULL DEFAULT '[]',
            cell_count INTEGER NOT NULL DEFAULT 0,
            wifi_count INTEGER NOT NULL DEFAULT 0,
            retry_number INTEGER NOT NULL DEFAULT 0
        );
        ",
    )?;

    record_migration(conn, 1, "reports")
}

/// V2: cumulative sync statistics.
fn migrate_v2_sync_stats(conn: &Connection) -> DatabaseResult<()> {
    info!("Applying migration v2: sync_stats");

    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS sync_stats (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        );
        ",
    )?;

    record_migration(conn, 2, "sync_stats")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn migrations_create_tables() {
        let conn = Connection::open_in_memory().unwrap();
        run_migrations(&conn).unwrap();

        let tables: Vec<String> = conn
            .prepare("SELECT name FROM sqlite_master WHERE type = 'table' ORDER BY name")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap();

        assert!(tables.contains(&"reports".to_string()));
        assert!(tables.contains(&"sync_stats".to_string()));
        assert!(tables.contains(&"migrations".to_string()));
    }

    #[test]
    fn migrations_are_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        run_migrations(&conn).unwrap();
        run_migrations(&conn).unwrap();

        let version: i32 = conn
            .query_row("SELECT MAX(version) FROM migrations", [], |row| row.get(0))
            .unwrap();
        assert_eq!(version, CURRENT_VERSION);

        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM migrations", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, CURRENT_VERSION as i64);
    }
}
