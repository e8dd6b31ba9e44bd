use report_database::{Database, NewReport};
use report_upload_worker::CumulativeStats;
use serde::Serialize;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use stumbler_config_and_utils::{Paths, RunLock};
use tracing::{info, warn};

/// Output of the `stats` command.
#[derive(Debug, Serialize)]
pub struct QueueSummary {
    pub queued_reports: i64,
    #[serde(flatten)]
    pub stats: CumulativeStats,
    /// `last_upload_time` as RFC 3339, for humans.
    pub last_upload: Option<String>,
}

pub fn queue_summary(paths: &Paths) -> Result<QueueSummary, Box<dyn std::error::Error>> {
    let db = Database::open(&paths.database_file())?;
    let stats = CumulativeStats::load(&db)?;
    let last_upload = stats
        .last_upload_time
        .and_then(chrono::DateTime::from_timestamp_millis)
        .map(|t| t.to_rfc3339());

    Ok(QueueSummary {
        queued_reports: db.report_count()?,
        stats,
        last_upload,
    })
}

/// Queue every report in a JSONL file. Blank lines are ignored.
///
/// The whole file is parsed before anything is inserted, so a bad line
/// queues nothing.
pub fn enqueue_file(paths: &Paths, file: &Path) -> Result<usize, Box<dyn std::error::Error>> {
    let reader = BufReader::new(File::open(file)?);

    let mut reports = Vec::new();
    for (index, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let report: NewReport = serde_json::from_str(&line)
            .map_err(|e| format!("{}:{}: {}", file.display(), index + 1, e))?;
        if report.cell_count == 0 && report.wifi_count == 0 {
            warn!(line = index + 1, "Report has no cell or wifi observations");
        }
        reports.push(report);
    }

    let _lock = RunLock::acquire(&paths.lock_file())?;
    let db = Database::open(&paths.database_file())?;
    for report in &reports {
        db.insert_report(report)?;
    }

    info!(count = reports.len(), file = %file.display(), "Queued reports");
    Ok(reports.len())
}
