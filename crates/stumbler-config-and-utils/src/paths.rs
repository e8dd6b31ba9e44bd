//! File system paths.

use crate::{CoreError, CoreResult};
use std::path::PathBuf;

/// Manages file system paths for stumbler-sync.
#[derive(Debug, Clone)]
pub struct Paths {
    /// Base directory for all runtime files (~/.stumbler)
    base_dir: PathBuf,
}

impl Paths {
    /// Create a new Paths instance rooted at `~/.stumbler`.
    pub fn new() -> CoreResult<Self> {
        let home = dirs::home_dir()
            .ok_or_else(|| CoreError::Path("Could not determine home directory".to_string()))?;

        Ok(Self {
            base_dir: home.join(".stumbler"),
        })
    }

    /// Create a new Paths instance with a custom base directory.
    pub fn with_base_dir(base_dir: PathBuf) -> Self {
        Self { base_dir }
    }

    /// Get the base directory (~/.stumbler).
    pub fn base_dir(&self) -> &PathBuf {
        &self.base_dir
    }

    /// Get the config file path (~/.stumbler/config.json).
    pub fn config_file(&self) -> PathBuf {
        self.base_dir.join("config.json")
    }

    /// Get the report queue database path (~/.stumbler/reports.sqlite).
    pub fn database_file(&self) -> PathBuf {
        self.base_dir.join("reports.sqlite")
    }

    /// Get the run lock path (~/.stumbler/sync.lock).
    pub fn lock_file(&self) -> PathBuf {
        self.base_dir.join("sync.lock")
    }

    /// Get the logs directory (~/.stumbler/logs).
    pub fn logs_dir(&self) -> PathBuf {
        self.base_dir.join("logs")
    }

    /// Get the JSONL log file path (~/.stumbler/logs/sync.jsonl).
    pub fn log_file(&self) -> PathBuf {
        self.logs_dir().join("sync.jsonl")
    }

    /// Ensure all required directories exist.
    pub fn ensure_dirs(&self) -> CoreResult<()> {
        std::fs::create_dir_all(&self.base_dir)?;
        std::fs::create_dir_all(self.logs_dir())?;
        Ok(())
    }
}
