//! SQLite storage for the stumbler report queue.
//!
//! This crate provides:
//! - The `reports` queue: append-only rows ordered by an autoincrement id
//! - The `sync_stats` key/value table holding cumulative upload counters
//! - Versioned schema migrations
//!
//! Every multi-row mutation (retry-count updates, stats upserts) runs inside a
//! single SQLite transaction, so an interrupted caller never observes a
//! half-applied window.
//!
//! ```ignore
//! let db = Database::open(&paths.database_file())?;
//! let max_id = db.max_report_id()?;
//! let window = db.report_window(0, max_id, 50)?;
//! ```

mod db;
mod error;
mod migrations;
mod models;

pub use db::Database;
pub use error::{DatabaseError, DatabaseResult};
pub use migrations::{run_migrations, CURRENT_VERSION};
pub use models::*;
