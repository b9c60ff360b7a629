//! Run bookkeeping around a [`Task`]: overlap guard, status report and
//! structured failure logging.

use super::{IngestError, Task, TaskOutcome};
use crate::domain::DatasetKind;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Instant;
use tracing::{Instrument, Span, error, info, info_span, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    Idle,
    Running,
}

/// Last known outcome of a managed task.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaskReport {
    pub dataset: &'static str,
    pub state: TaskState,
    pub runs: u64,
    pub failures: u64,
    pub last_started: Option<DateTime<Utc>>,
    pub last_success: Option<DateTime<Utc>>,
    pub last_rows: Option<u64>,
    pub last_error: Option<String>,
}

impl TaskReport {
    fn new(dataset: DatasetKind) -> Self {
        Self {
            dataset: dataset.as_str(),
            state: TaskState::Idle,
            runs: 0,
            failures: 0,
            last_started: None,
            last_success: None,
            last_rows: None,
            last_error: None,
        }
    }
}

/// Clears the running flag however the run ends. A run dropped before
/// [`RunningGuard::finish`] (panic or cancellation) is recorded as a failure.
struct RunningGuard<'a> {
    task: &'a ManagedTask,
    finished: bool,
}

impl RunningGuard<'_> {
    fn finish(mut self) {
        self.finished = true;
    }
}

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        if !self.finished {
            let dataset = self.task.dataset();
            error!(%dataset, "Update did not complete");
            self.task.record(|r| {
                r.state = TaskState::Idle;
                r.failures += 1;
                r.last_error = Some(format!("{dataset} run did not complete"));
            });
        }
        self.task.running.store(false, Ordering::Release);
    }
}

fn update_span(dataset: DatasetKind) -> Span {
    match dataset {
        DatasetKind::Stations => info_span!("update.stations"),
        DatasetKind::Statuses => info_span!("update.statuses"),
        DatasetKind::Districts => info_span!("update.districts"),
        DatasetKind::Boroughs => info_span!("update.boroughs"),
        DatasetKind::Bikeways => info_span!("update.bikeways"),
        DatasetKind::BikeLanes => info_span!("update.bikelanes"),
        DatasetKind::FreeFloatingBikes => info_span!("update.free_floating_bikes"),
    }
}

/// A task plus its run state. Runs never return an error: failures are
/// logged and recorded in the [`TaskReport`].
pub struct ManagedTask {
    task: Box<dyn Task>,
    running: AtomicBool,
    report: Mutex<TaskReport>,
}

impl ManagedTask {
    pub fn new(task: impl Task + 'static) -> Self {
        let report = TaskReport::new(task.dataset());
        Self {
            task: Box::new(task),
            running: AtomicBool::new(false),
            report: Mutex::new(report),
        }
    }

    pub fn dataset(&self) -> DatasetKind {
        self.task.dataset()
    }

    pub fn report(&self) -> TaskReport {
        self.report.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    fn record(&self, f: impl FnOnce(&mut TaskReport)) {
        f(&mut self.report.lock().unwrap_or_else(PoisonError::into_inner));
    }

    /// Runs the task once. Returns `None` when the run failed.
    pub async fn run_once(&self) -> Option<TaskOutcome> {
        let dataset = self.dataset();

        if self
            .running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            warn!(%dataset, "Previous run still in progress, skipping");
            return Some(TaskOutcome::AlreadyRunning);
        }
        let guard = RunningGuard {
            task: self,
            finished: false,
        };

        self.record(|r| {
            r.state = TaskState::Running;
            r.runs += 1;
            r.last_started = Some(Utc::now());
        });

        let started = Instant::now();
        let result = self.task.run().instrument(update_span(dataset)).await;
        let elapsed_ms = started.elapsed().as_millis() as u64;

        let outcome = match result {
            Ok(outcome) => {
                if let TaskOutcome::Persisted { rows } = outcome {
                    info!(%dataset, rows, elapsed_ms, "Update succeeded");
                }
                self.record(|r| {
                    r.state = TaskState::Idle;
                    r.last_success = Some(Utc::now());
                    r.last_error = None;
                    if let TaskOutcome::Persisted { rows } = outcome {
                        r.last_rows = Some(rows);
                    }
                });
                Some(outcome)
            }
            Err(e) => {
                self.fail(&e, elapsed_ms);
                None
            }
        };
        guard.finish();
        outcome
    }

    fn fail(&self, e: &IngestError, elapsed_ms: u64) {
        error!(
            dataset = %e.dataset,
            stage = %e.stage,
            error = %format!("{:#}", e.cause),
            elapsed_ms,
            "Update failed"
        );
        self.record(|r| {
            r.state = TaskState::Idle;
            r.failures += 1;
            r.last_error = Some(e.to_string());
        });
    }
}
