//! The drain loop.

use crate::encoder::{encode_batch, Batch};
use crate::ledger::{FailureClass, RetryLedger};
use crate::stats::{merge_stats, StatsDelta};
use crate::{ReportStore, ReportSubmitter, SubmitOutcome};
use report_database::QueuedReport;
use serde::Serialize;
use tracing::{debug, error, info, warn};

/// Uploader configuration.
#[derive(Debug, Clone)]
pub struct UploaderConfig {
    /// Maximum rows per window.
    pub batch_size: usize,
    /// Attempts per row before it is discarded.
    pub max_retry_count: i64,
    /// Gzip the first attempt of every window.
    pub use_compression: bool,
}

impl Default for UploaderConfig {
    fn default() -> Self {
        Self {
            batch_size: 50,
            max_retry_count: 3,
            use_compression: true,
        }
    }
}

/// Preconditions for a run, decided by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncGate {
    /// Whether the current network satisfies the upload policy.
    pub network_acceptable: bool,
    /// Run regardless of network policy.
    pub force: bool,
}

impl SyncGate {
    pub fn allows(&self) -> bool {
        self.force || self.network_acceptable
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    NetworkUnavailable,
}

/// Why rows left the queue without being accepted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DropReason {
    /// The service refused the window outright.
    Rejected { status: u16 },
    /// Rows reached the retry ceiling after a transient failure.
    RetriesExhausted,
}

/// Rows removed without being accepted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DroppedWindow {
    pub min_id: i64,
    pub max_id: i64,
    pub rows: usize,
    pub reason: DropReason,
}

/// A window passed over because none of its rows could be encoded.
///
/// Its rows stay queued; nothing is sent or deleted for it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnencodableWindow {
    pub min_id: i64,
    pub max_id: i64,
    pub rows: usize,
}

/// Summary of one run.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct RunReport {
    pub observations_uploaded: i64,
    pub cells_uploaded: i64,
    pub wifis_uploaded: i64,
    /// Windows accepted and removed from the queue.
    pub batches_uploaded: usize,
    /// Windows fetched, whatever their fate.
    pub windows: usize,
    /// HTTP attempts, including uncompressed fallbacks.
    pub submissions: usize,
    /// Rows whose retry count was incremented.
    pub rows_updated: usize,
    /// Rows deleted at the retry ceiling.
    pub rows_deleted: usize,
    /// Rows deleted by permanent rejection.
    pub rows_dropped: usize,
    /// Failed deliveries, plus a run skipped for want of a network.
    pub io_errors: usize,
    /// At least one store operation failed; affected rows stay queued.
    pub database_error: bool,
    pub skipped: Option<SkipReason>,
    /// Every group of rows removed without acceptance.
    pub dropped: Vec<DroppedWindow>,
    /// Windows left in the queue because nothing in them was encodable.
    pub unencodable: Vec<UnencodableWindow>,
}

/// Drains the report queue one id-ordered window at a time.
///
/// A run only looks at rows that existed when it started, and every window
/// ends in exactly one of: acceptance (rows deleted, counters bumped),
/// transient failure (retry counts bumped, exhausted rows deleted),
/// permanent failure (rows deleted) or, when nothing in it encodes, being
/// passed over untouched. Each step is its own transaction, so a
/// crash loses at most the window in flight.
pub struct ReportUploader<S, T> {
    config: UploaderConfig,
    store: S,
    submitter: T,
    ledger: RetryLedger,
}

impl<S: ReportStore, T: ReportSubmitter> ReportUploader<S, T> {
    pub fn new(config: UploaderConfig, store: S, submitter: T) -> Self {
        let ledger = RetryLedger::new(config.max_retry_count);
        Self {
            config,
            store,
            submitter,
            ledger,
        }
    }

    /// Run one drain pass.
    ///
    /// Never fails: every problem is reflected in the returned report.
    pub async fn run(&self, gate: SyncGate) -> RunReport {
        let mut report = RunReport::default();

        if !gate.allows() {
            info!("No acceptable network, skipping upload");
            report.io_errors += 1;
            report.skipped = Some(SkipReason::NetworkUnavailable);
            return report;
        }

        let queue_max_id = match self.store.max_report_id() {
            Ok(id) => id,
            Err(e) => {
                error!(error = %e, "Failed to read queue bounds");
                report.database_error = true;
                return report;
            }
        };

        let batch_size = self.config.batch_size.max(1);
        let mut queue_min_id = 0;
        let mut delta = StatsDelta::default();

        info!(queue_max_id, batch_size, "Starting upload run");

        while queue_min_id < queue_max_id {
            let rows = match self
                .store
                .report_window(queue_min_id, queue_max_id, batch_size)
            {
                Ok(rows) => rows,
                Err(e) => {
                    error!(error = %e, queue_min_id, "Failed to read window");
                    report.database_error = true;
                    break;
                }
            };

            let window_max_id = match rows.last() {
                Some(last) => last.id,
                None => {
                    debug!(queue_min_id, queue_max_id, "Window empty, queue drained");
                    break;
                }
            };
            report.windows += 1;

            match encode_batch(&rows) {
                Ok(batch) => self.upload_window(&rows, &batch, &mut report, &mut delta).await,
                Err(e) => {
                    warn!(error = %e, "Window could not be encoded, leaving it queued");
                    report.unencodable.push(UnencodableWindow {
                        min_id: rows[0].id,
                        max_id: window_max_id,
                        rows: rows.len(),
                    });
                }
            }

            // Rows a failed store step left behind are outside this run's
            // remaining range and are picked up by the next run.
            queue_min_id = window_max_id;
        }

        if let Err(e) = merge_stats(&self.store, &delta) {
            error!(error = %e, "Failed to merge upload stats");
            report.database_error = true;
        }

        info!(
            windows = report.windows,
            batches_uploaded = report.batches_uploaded,
            observations_uploaded = report.observations_uploaded,
            rows_updated = report.rows_updated,
            rows_deleted = report.rows_deleted,
            rows_dropped = report.rows_dropped,
            io_errors = report.io_errors,
            database_error = report.database_error,
            "Upload run finished"
        );

        report
    }

    /// Submit a window and settle it.
    async fn upload_window(
        &self,
        rows: &[QueuedReport],
        batch: &Batch,
        report: &mut RunReport,
        delta: &mut StatsDelta,
    ) {
        let outcome = self.deliver(batch, report).await;

        let class = match FailureClass::of(&outcome) {
            None => return self.settle_accepted(batch, report, delta),
            Some(class) => class,
        };

        report.io_errors += 1;
        match self.ledger.record_failure(&self.store, rows, class) {
            Ok(ledger) => {
                report.rows_updated += ledger.updated;
                report.rows_deleted += ledger.exhausted;
                report.rows_dropped += ledger.dropped;

                if ledger.dropped > 0 {
                    report.dropped.push(DroppedWindow {
                        min_id: batch.min_id,
                        max_id: batch.max_id,
                        rows: ledger.dropped,
                        reason: DropReason::Rejected {
                            status: outcome.status().unwrap_or_default(),
                        },
                    });
                }
                if ledger.exhausted > 0 {
                    report.dropped.push(DroppedWindow {
                        min_id: batch.min_id,
                        max_id: batch.max_id,
                        rows: ledger.exhausted,
                        reason: DropReason::RetriesExhausted,
                    });
                }
            }
            Err(e) => {
                error!(
                    error = %e,
                    min_id = batch.min_id,
                    max_id = batch.max_id,
                    "Failed to record upload failure"
                );
                report.database_error = true;
            }
        }
    }

    /// Send a window, retrying once without compression on a 400.
    async fn deliver(&self, batch: &Batch, report: &mut RunReport) -> SubmitOutcome {
        let compress = self.config.use_compression;

        report.submissions += 1;
        let outcome = self.submitter.submit(&batch.body, compress).await;

        if compress && outcome == SubmitOutcome::RejectedMalformed {
            warn!(
                min_id = batch.min_id,
                max_id = batch.max_id,
                "Compressed upload rejected, retrying uncompressed"
            );
            report.submissions += 1;
            return self.submitter.submit(&batch.body, false).await;
        }

        outcome
    }

    fn settle_accepted(
        &self,
        batch: &Batch,
        report: &mut RunReport,
        delta: &mut StatsDelta,
    ) {
        match self.store.delete_reports_between(batch.min_id, batch.max_id) {
            Ok(deleted) => {
                report.batches_uploaded += 1;
                report.observations_uploaded += batch.observations;
                report.cells_uploaded += batch.cells;
                report.wifis_uploaded += batch.wifis;
                delta.add(batch.observations, batch.cells, batch.wifis);
                debug!(
                    min_id = batch.min_id,
                    max_id = batch.max_id,
                    deleted,
                    skipped = batch.skipped,
                    "Window uploaded"
                );
            }
            Err(e) => {
                // The service has the data but the rows stay queued; the next
                // run will send them again.
                error!(
                    error = %e,
                    min_id = batch.min_id,
                    max_id = batch.max_id,
                    "Failed to delete uploaded window"
                );
                report.database_error = true;
            }
        }
    }
}
