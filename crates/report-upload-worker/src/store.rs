//! Storage seam used by the upload loop.

use report_database::{Database, DatabaseResult, QueuedReport, ReportOperation, StatsKey};
use std::collections::HashMap;

/// The queue and stats operations a run needs.
///
/// [`Database`] is the production implementation. Tests wrap it to inject
/// failures at individual steps.
pub trait ReportStore {
    /// Highest queued id, or 0 when the queue is empty.
    fn max_report_id(&self) -> DatabaseResult<i64>;

    /// Up to `limit` rows with `after_id < id <= up_to_id`, ascending by id.
    fn report_window(
        &self,
        after_id: i64,
        up_to_id: i64,
        limit: usize,
    ) -> DatabaseResult<Vec<QueuedReport>>;

    /// Delete every row with `min_id <= id <= max_id`.
    fn delete_reports_between(&self, min_id: i64, max_id: i64) -> DatabaseResult<usize>;

    /// Apply retry updates and deletes atomically.
    fn apply_report_operations(&self, operations: &[ReportOperation]) -> DatabaseResult<()>;

    fn read_sync_stats(&self) -> DatabaseResult<HashMap<String, String>>;

    /// Upsert stats entries atomically.
    fn write_sync_stats(&self, entries: &[(StatsKey, i64)]) -> DatabaseResult<()>;
}

impl ReportStore for Database {
    fn max_report_id(&self) -> DatabaseResult<i64> {
        Database::max_report_id(self)
    }

    fn report_window(
        &self,
        after_id: i64,
        up_to_id: i64,
        limit: usize,
    ) -> DatabaseResult<Vec<QueuedReport>> {
        Database::report_window(self, after_id, up_to_id, limit)
    }

    fn delete_reports_between(&self, min_id: i64, max_id: i64) -> DatabaseResult<usize> {
        Database::delete_reports_between(self, min_id, max_id)
    }

    fn apply_report_operations(&self, operations: &[ReportOperation]) -> DatabaseResult<()> {
        Database::apply_report_operations(self, operations)
    }

    fn read_sync_stats(&self) -> DatabaseResult<HashMap<String, String>> {
        Database::read_sync_stats(self)
    }

    fn write_sync_stats(&self, entries: &[(StatsKey, i64)]) -> DatabaseResult<()> {
        Database::write_sync_stats(self, entries)
    }
}

impl<T: ReportStore + ?Sized> ReportStore for &T {
    fn max_report_id(&self) -> DatabaseResult<i64> {
        (**self).max_report_id()
    }

    fn report_window(
        &self,
        after_id: i64,
        up_to_id: i64,
        limit: usize,
    ) -> DatabaseResult<Vec<QueuedReport>> {
        (**self).report_window(after_id, up_to_id, limit)
    }

    fn delete_reports_between(&self, min_id: i64, max_id: i64) -> DatabaseResult<usize> {
        (**self).delete_reports_between(min_id, max_id)
    }

    fn apply_report_operations(&self, operations: &[ReportOperation]) -> DatabaseResult<()> {
        (**self).apply_report_operations(operations)
    }

    fn read_sync_stats(&self) -> DatabaseResult<HashMap<String, String>> {
        (**self).read_sync_stats()
    }

    fn write_sync_stats(&self, entries: &[(StatsKey, i64)]) -> DatabaseResult<()> {
        (**self).write_sync_stats(entries)
    }
}
