//! Failure bookkeeping for windows that were not accepted.

use crate::{ReportStore, SubmitOutcome};
use report_database::{DatabaseResult, QueuedReport, ReportOperation};
use serde::Serialize;
use tracing::{debug, info, warn};

/// How a failed submission affects the window's rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureClass {
    /// Resending may succeed: count a retry against every row.
    Transient,
    /// Resending will not succeed: drop the window.
    Permanent,
}

impl FailureClass {
    /// `None` for accepted outcomes.
    pub fn of(outcome: &SubmitOutcome) -> Option<Self> {
        match outcome {
            SubmitOutcome::Accepted { .. } => None,
            SubmitOutcome::RejectedTransient { .. } | SubmitOutcome::TransportError { .. } => {
                Some(Self::Transient)
            }
            SubmitOutcome::RejectedMalformed | SubmitOutcome::RejectedPermanent { .. } => {
                Some(Self::Permanent)
            }
        }
    }
}

/// What the ledger did to a failed window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LedgerOutcome {
    /// Rows whose retry count was incremented.
    pub updated: usize,
    /// Rows deleted after reaching the retry ceiling.
    pub exhausted: usize,
    /// Rows deleted by a permanent drop.
    pub dropped: usize,
}

/// Applies retry accounting to failed windows.
#[derive(Debug, Clone, Copy)]
pub struct RetryLedger {
    max_retry_count: i64,
}

impl RetryLedger {
    pub fn new(max_retry_count: i64) -> Self {
        Self {
            max_retry_count: max_retry_count.max(1),
        }
    }

    /// Per-row operations for a transient failure.
    ///
    /// A row whose incremented count reaches the ceiling is deleted instead of
    /// updated, so each row is attempted at most `max_retry_count` times.
    pub fn plan_retries(&self, rows: &[QueuedReport]) -> Vec<ReportOperation> {
        rows.iter()
            .map(|row| {
                let retry_count = row.retry_count + 1;
                if retry_count >= self.max_retry_count {
                    ReportOperation::Delete { id: row.id }
                } else {
                    ReportOperation::UpdateRetryCount {
                        id: row.id,
                        retry_count,
                    }
                }
            })
            .collect()
    }

    /// Record a failed window. On error the store is left unchanged.
    pub fn record_failure<S: ReportStore>(
        &self,
        store: &S,
        rows: &[QueuedReport],
        class: FailureClass,
    ) -> DatabaseResult<LedgerOutcome> {
        let (min_id, max_id) = match (rows.first(), rows.last()) {
            (Some(first), Some(last)) => (first.id, last.id),
            _ => return Ok(LedgerOutcome::default()),
        };

        match class {
            FailureClass::Permanent => {
                let dropped = store.delete_reports_between(min_id, max_id)?;
                warn!(min_id, max_id, dropped, "Dropped permanently rejected window");
                Ok(LedgerOutcome {
                    dropped,
                    ..Default::default()
                })
            }
            FailureClass::Transient => {
                let operations = self.plan_retries(rows);
                store.apply_report_operations(&operations)?;

                let exhausted = operations
                    .iter()
                    .filter(|op| matches!(op, ReportOperation::Delete { .. }))
                    .count();
                let updated = operations.len() - exhausted;

                if exhausted > 0 {
                    info!(
                        min_id,
                        max_id,
                        exhausted,
                        max_retry_count = self.max_retry_count,
                        "Discarded reports that ran out of retries"
                    );
                }
                debug!(min_id, max_id, updated, "Recorded transient failure");

                Ok(LedgerOutcome {
                    updated,
                    exhausted,
                    dropped: 0,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use report_database::{Database, NewReport};

    fn seed(db: &Database, retry_counts: &[i64]) -> Vec<QueuedReport> {
        for retry in retry_counts {
            let id = db
                .insert_report(&NewReport {
                    timestamp: 1_700_000_000_000,
                    latitude: 1.0,
                    longitude: 2.0,
                    altitude: None,
                    accuracy: None,
                    radio: String::new(),
                    cell: "[]".into(),
                    wifi: "[]".into(),
                    cell_count: 0,
                    wifi_count: 0,
                })
                .unwrap();
            db.apply_report_operations(&[ReportOperation::UpdateRetryCount {
                id,
                retry_count: *retry,
            }])
            .unwrap();
        }
        db.report_window(0, db.max_report_id().unwrap(), 100).unwrap()
    }

    #[test]
    fn test_failure_class() {
        assert_eq!(FailureClass::of(&SubmitOutcome::Accepted { status: 204 }), None);
        assert_eq!(
            FailureClass::of(&SubmitOutcome::RejectedTransient { status: 502 }),
            Some(FailureClass::Transient)
        );
        assert_eq!(
            FailureClass::of(&SubmitOutcome::TransportError {
                message: "reset".into()
            }),
            Some(FailureClass::Transient)
        );
        assert_eq!(
            FailureClass::of(&SubmitOutcome::RejectedMalformed),
            Some(FailureClass::Permanent)
        );
        assert_eq!(
            FailureClass::of(&SubmitOutcome::RejectedPermanent { status: 413 }),
            Some(FailureClass::Permanent)
        );
    }

    #[test]
    fn test_plan_retries_ceiling() {
        let db = Database::open_in_memory().unwrap();
        let rows = seed(&db, &[0, 1, 2]);
        let ops = RetryLedger::new(3).plan_retries(&rows);

        assert_eq!(
            ops,
            vec![
                ReportOperation::UpdateRetryCount {
                    id: rows[0].id,
                    retry_count: 1
                },
                ReportOperation::UpdateRetryCount {
                    id: rows[1].id,
                    retry_count: 2
                },
                ReportOperation::Delete { id: rows[2].id },
            ]
        );
    }

    #[test]
    fn test_plan_retries_ceiling_of_one_deletes_immediately() {
        let db = Database::open_in_memory().unwrap();
        let rows = seed(&db, &[0]);
        let ops = RetryLedger::new(1).plan_retries(&rows);

        assert_eq!(ops, vec![ReportOperation::Delete { id: rows[0].id }]);
    }

    #[test]
    fn test_transient_failure_updates_and_deletes() {
        let db = Database::open_in_memory().unwrap();
        let rows = seed(&db, &[0, 0, 2]);
        let ledger = RetryLedger::new(3);

        let outcome = ledger
            .record_failure(&db, &rows, FailureClass::Transient)
            .unwrap();
        assert_eq!(outcome.updated, 2);
        assert_eq!(outcome.exhausted, 1);

        assert_eq!(db.report_count().unwrap(), 2);
        assert_eq!(db.get_report(rows[0].id).unwrap().unwrap().retry_count, 1);
        assert!(db.get_report(rows[2].id).unwrap().is_none());
    }

    #[test]
    fn test_permanent_failure_drops_range() {
        let db = Database::open_in_memory().unwrap();
        let rows = seed(&db, &[0, 1, 0, 0]);
        let ledger = RetryLedger::new(3);

        let outcome = ledger
            .record_failure(&db, &rows[..3], FailureClass::Permanent)
            .unwrap();
        assert_eq!(outcome.dropped, 3);
        assert_eq!(db.report_count().unwrap(), 1);
        assert!(db.get_report(rows[3].id).unwrap().is_some());
    }

    #[test]
    fn test_ceiling_of_one_deletes_on_first_failure() {
        let db = Database::open_in_memory().unwrap();
        let rows = seed(&db, &[0]);

        let outcome = RetryLedger::new(1)
            .record_failure(&db, &rows, FailureClass::Transient)
            .unwrap();
        assert_eq!(outcome.exhausted, 1);
        assert_eq!(db.report_count().unwrap(), 0);
    }
}
