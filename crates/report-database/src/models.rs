//! Database model types.

use serde::{Deserialize, Serialize};

/// A report waiting in the upload queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueuedReport {
    pub id: i64,
    /// Capture time in milliseconds since the Unix epoch.
    pub timestamp: i64,
    pub latitude: f64,
    pub longitude: f64,
    pub altitude: Option<i64>,
    /// Horizontal accuracy in metres.
    pub accuracy: Option<i64>,
    pub radio: String,
    pub cell: String, // JSON array
    pub wifi: String, // JSON array
    pub cell_count: i64,
    pub wifi_count: i64,
    pub retry_count: i64,
}

/// Input for appending a report to the queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewReport {
    pub timestamp: i64,
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default)]
    pub altitude: Option<i64>,
    #[serde(default)]
    pub accuracy: Option<i64>,
    #[serde(default)]
    pub radio: String,
    #[serde(default = "empty_json_array")]
    pub cell: String,
    #[serde(default = "empty_json_array")]
    pub wifi: String,
    #[serde(default)]
    pub cell_count: i64,
    #[serde(default)]
    pub wifi_count: i64,
}

fn empty_json_array() -> String {
    "[]".to_string()
}

/// A single row mutation applied as part of an atomic batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportOperation {
    /// Store a new retry count for the row.
    UpdateRetryCount { id: i64, retry_count: i64 },
    /// Remove the row from the queue.
    Delete { id: i64 },
}

/// Keys of the cumulative `sync_stats` table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatsKey {
    ObservationsSent,
    CellsSent,
    WifisSent,
    LastUploadTime,
}

impl StatsKey {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ObservationsSent => "observations_sent",
            Self::CellsSent => "cells_sent",
            Self::WifisSent => "wifis_sent",
            Self::LastUploadTime => "last_upload_time",
        }
    }
}
