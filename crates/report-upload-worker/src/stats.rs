//! Cumulative upload counters.

use crate::ReportStore;
use chrono::Utc;
use report_database::{DatabaseResult, StatsKey};
use serde::Serialize;
use std::collections::HashMap;
use tracing::{debug, warn};

/// Counts accepted during one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct StatsDelta {
    pub observations: i64,
    pub cells: i64,
    pub wifis: i64,
}

impl StatsDelta {
    pub fn is_empty(&self) -> bool {
        self.observations == 0 && self.cells == 0 && self.wifis == 0
    }

    pub fn add(&mut self, observations: i64, cells: i64, wifis: i64) {
        self.observations += observations;
        self.cells += cells;
        self.wifis += wifis;
    }
}

/// Persisted totals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct CumulativeStats {
    pub observations_sent: i64,
    pub cells_sent: i64,
    pub wifis_sent: i64,
    /// Milliseconds since the epoch of the last merge that sent anything.
    pub last_upload_time: Option<i64>,
}

impl CumulativeStats {
    /// Read the totals. Missing or unparseable values count as zero.
    pub fn load<S: ReportStore>(store: &S) -> DatabaseResult<Self> {
        let raw = store.read_sync_stats()?;
        Ok(Self {
            observations_sent: counter(&raw, StatsKey::ObservationsSent),
            cells_sent: counter(&raw, StatsKey::CellsSent),
            wifis_sent: counter(&raw, StatsKey::WifisSent),
            last_upload_time: raw
                .get(StatsKey::LastUploadTime.as_str())
                .and_then(|v| v.trim().parse().ok()),
        })
    }
}

fn counter(raw: &HashMap<String, String>, key: StatsKey) -> i64 {
    match raw.get(key.as_str()) {
        None => 0,
        Some(value) => value.trim().parse().unwrap_or_else(|_| {
            warn!(key = key.as_str(), value = %value, "Unparseable stats value, treating as 0");
            0
        }),
    }
}

/// Fold a run's delta into the persisted totals.
///
/// A zero delta leaves the store untouched. Otherwise all four keys are
/// written in one transaction; on error nothing changes. Returns whether a
/// write happened.
pub fn merge_stats<S: ReportStore>(store: &S, delta: &StatsDelta) -> DatabaseResult<bool> {
    if delta.is_empty() {
        return Ok(false);
    }

    let current = CumulativeStats::load(store)?;
    let updated = CumulativeStats {
        observations_sent: current.observations_sent + delta.observations,
        cells_sent: current.cells_sent + delta.cells,
        wifis_sent: current.wifis_sent + delta.wifis,
        last_upload_time: Some(Utc::now().timestamp_millis()),
    };

    store.write_sync_stats(&[
        (StatsKey::ObservationsSent, updated.observations_sent),
        (StatsKey::CellsSent, updated.cells_sent),
        (StatsKey::WifisSent, updated.wifis_sent),
        (
            StatsKey::LastUploadTime,
            updated.last_upload_time.unwrap_or_default(),
        ),
    ])?;

    debug!(
        observations_sent = updated.observations_sent,
        cells_sent = updated.cells_sent,
        wifis_sent = updated.wifis_sent,
        "Merged upload stats"
    );
    Ok(true)
}
