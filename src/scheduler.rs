//! Fixed-cadence scheduler driving the ingestion tasks.
//!
//! Tasks flagged for startup run once, sequentially, before any periodic
//! loop starts. Each periodic task then gets its own loop aligned on
//! wall-clock boundaries (UTC).

use crate::domain::DatasetKind;
use crate::tasks::{ManagedTask, Task, TaskOutcome, TaskReport};
use chrono::{DateTime, TimeDelta, Utc};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cadence {
    /// On every ten-minute boundary (:00, :10, ...).
    TenMinutes,
    /// Every day at 00:00 UTC.
    Daily,
}

impl Cadence {
    fn period(&self) -> TimeDelta {
        match self {
            Cadence::TenMinutes => TimeDelta::minutes(10),
            Cadence::Daily => TimeDelta::days(1),
        }
    }

    /// First boundary strictly after `now`.
    pub fn next_tick(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let period = self.period().num_seconds();
        let next = (now.timestamp().div_euclid(period) + 1) * period;
        DateTime::from_timestamp(next, 0).unwrap_or(now + self.period())
    }
}

struct Entry {
    task: Arc<ManagedTask>,
    at_startup: bool,
    cadence: Option<Cadence>,
}

#[derive(Default)]
pub struct Scheduler {
    entries: Vec<Entry>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `task`. `at_startup` runs it once in [`Scheduler::run_startup`];
    /// `cadence` runs it periodically after [`Scheduler::start`].
    pub fn add(
        &mut self,
        task: impl Task + 'static,
        at_startup: bool,
        cadence: Option<Cadence>,
    ) -> &mut Self {
        self.entries.push(Entry {
            task: Arc::new(ManagedTask::new(task)),
            at_startup,
            cadence,
        });
        self
    }

    pub fn task(&self, dataset: DatasetKind) -> Option<Arc<ManagedTask>> {
        self.entries
            .iter()
            .find(|e| e.task.dataset() == dataset)
            .map(|e| e.task.clone())
    }

    pub fn reports(&self) -> Vec<TaskReport> {
        self.entries.iter().map(|e| e.task.report()).collect()
    }

    /// Runs every startup task once, in registration order.
    pub async fn run_startup(&self) {
        for entry in self.entries.iter().filter(|e| e.at_startup) {
            entry.task.run_once().await;
        }
    }

    /// Spawns one loop per periodic task. Dropping the handles does not stop
    /// the loops; abort them to shut down.
    pub fn start(&self) -> Vec<JoinHandle<()>> {
        self.entries
            .iter()
            .filter_map(|e| e.cadence.map(|c| (e.task.clone(), c)))
            .map(|(task, cadence)| {
                info!(dataset = %task.dataset(), ?cadence, "Scheduling task");
                tokio::spawn(tick_loop(task, cadence))
            })
            .collect()
    }

    /// Runs a one-off task on the runner, off the caller's error path.
    /// The outcome is only logged and reported through the returned handle.
    pub fn dispatch(&self, task: impl Task + 'static) -> JoinHandle<Option<TaskOutcome>> {
        let task = ManagedTask::new(task);
        info!(dataset = %task.dataset(), "Dispatching one-off task");
        tokio::spawn(async move { task.run_once().await })
    }
}

async fn tick_loop(task: Arc<ManagedTask>, cadence: Cadence) {
    let mut next = cadence.next_tick(Utc::now());
    loop {
        let wait = (next - Utc::now()).to_std().unwrap_or_default();
        debug!(dataset = %task.dataset(), next = %next, "Next run scheduled");
        tokio::time::sleep(wait).await;

        // a slow run must not delay the clock, and a panic must not end the loop
        let run = task.clone();
        let dataset = task.dataset();
        tokio::spawn(async move {
            if let Err(e) = tokio::spawn(async move { run.run_once().await }).await {
                error!(%dataset, error = %e, "Task run panicked");
            }
        });

        next = cadence.next_tick(Utc::now().max(next));
    }
}
