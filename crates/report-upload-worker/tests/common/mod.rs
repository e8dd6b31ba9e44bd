#![allow(dead_code)]

use async_trait::async_trait;
use report_database::{
    Database, DatabaseError, DatabaseResult, NewReport, QueuedReport, ReportOperation, StatsKey,
};
use report_upload_worker::{ReportStore, ReportSubmitter, SubmitOutcome};
use std::cell::Cell;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

pub fn report(cells: i64, wifis: i64) -> NewReport {
    NewReport {
        timestamp: 1_700_000_000_000,
        latitude: 48.85,
        longitude: 2.35,
        altitude: Some(35),
        accuracy: Some(10),
        radio: "lte".to_string(),
        cell: format!("[{}]", vec![r#"{"cid":1}"#; cells as usize].join(",")),
        wifi: format!("[{}]", vec![r#"{"key":"aa"}"#; wifis as usize].join(",")),
        cell_count: cells,
        wifi_count: wifis,
    }
}

pub fn seed(db: &Database, n: usize) -> Vec<i64> {
    (0..n)
        .map(|i| db.insert_report(&report(1, (i % 3) as i64)).unwrap())
        .collect()
}

pub fn retry_counts(db: &Database) -> Vec<i64> {
    let max = db.max_report_id().unwrap();
    db.report_window(0, max, 10_000)
        .unwrap()
        .into_iter()
        .map(|r| r.retry_count)
        .collect()
}

/// One recorded submission.
#[derive(Debug, Clone)]
pub struct Call {
    pub body: Vec<u8>,
    pub compress: bool,
}

/// Replays scripted outcomes, then accepts everything.
#[derive(Default)]
pub struct ScriptedSubmitter {
    script: Mutex<VecDeque<SubmitOutcome>>,
    calls: Mutex<Vec<Call>>,
}

impl ScriptedSubmitter {
    pub fn new(script: impl IntoIterator<Item = SubmitOutcome>) -> Self {
        Self {
            script: Mutex::new(script.into_iter().collect()),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn push(&self, outcome: SubmitOutcome) {
        self.script.lock().unwrap().push_back(outcome);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ReportSubmitter for ScriptedSubmitter {
    async fn submit(&self, body: &[u8], compress: bool) -> SubmitOutcome {
        self.calls.lock().unwrap().push(Call {
            body: body.to_vec(),
            compress,
        });
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(SubmitOutcome::Accepted { status: 204 })
    }
}

/// Which store step should fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    None,
    MaxId,
    Window,
    Delete,
    Operations,
    StatsWrite,
}

/// Wraps a database and fails one kind of operation on demand.
pub struct FaultyStore<'a> {
    pub db: &'a Database,
    pub fault: Cell<Fault>,
}

impl<'a> FaultyStore<'a> {
    pub fn new(db: &'a Database, fault: Fault) -> Self {
        Self {
            db,
            fault: Cell::new(fault),
        }
    }

    fn check(&self, step: Fault) -> DatabaseResult<()> {
        if self.fault.get() == step {
            Err(DatabaseError::Io(std::io::Error::other(format!(
                "injected {:?} failure",
                step
            ))))
        } else {
            Ok(())
        }
    }
}

impl ReportStore for FaultyStore<'_> {
    fn max_report_id(&self) -> DatabaseResult<i64> {
        self.check(Fault::MaxId)?;
        self.db.max_report_id()
    }

    fn report_window(
        &self,
        after_id: i64,
        up_to_id: i64,
        limit: usize,
    ) -> DatabaseResult<Vec<QueuedReport>> {
        self.check(Fault::Window)?;
        self.db.report_window(after_id, up_to_id, limit)
    }

    fn delete_reports_between(&self, min_id: i64, max_id: i64) -> DatabaseResult<usize> {
        self.check(Fault::Delete)?;
        self.db.delete_reports_between(min_id, max_id)
    }

    fn apply_report_operations(&self, operations: &[ReportOperation]) -> DatabaseResult<()> {
        self.check(Fault::Operations)?;
        self.db.apply_report_operations(operations)
    }

    fn read_sync_stats(&self) -> DatabaseResult<HashMap<String, String>> {
        self.db.read_sync_stats()
    }

    fn write_sync_stats(&self, entries: &[(StatsKey, i64)]) -> DatabaseResult<()> {
        self.check(Fault::StatsWrite)?;
        self.db.write_sync_stats(entries)
    }
}
