//! Ingestion tasks. One task per dataset performs a full
//! fetch → normalize → persist cycle each time it runs.

pub mod persist;
pub mod runner;

pub use persist::Persist;
pub use runner::{ManagedTask, TaskReport, TaskState};

use crate::domain::{Bikeway, DatasetKind};
use crate::fetch::{FeedSource, HttpClient, RetryPolicy, fetch_json_with_retry};
use crate::store::Store;
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

/// Pipeline step in which a run failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Fetch,
    Normalize,
    Persist,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Stage::Fetch => "fetch",
            Stage::Normalize => "normalize",
            Stage::Persist => "persist",
        })
    }
}

/// Why a single task run failed.
#[derive(Debug, Error)]
#[error("{dataset} {stage} failed: {cause:#}")]
pub struct IngestError {
    pub dataset: DatasetKind,
    pub stage: Stage,
    pub cause: anyhow::Error,
}

impl IngestError {
    pub fn new(dataset: DatasetKind, stage: Stage, cause: impl Into<anyhow::Error>) -> Self {
        Self {
            dataset,
            stage,
            cause: cause.into(),
        }
    }
}

/// What a successful run did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskOutcome {
    Persisted { rows: u64 },
    /// Seed-once data is already present; nothing was fetched.
    AlreadyLoaded,
    /// A previous run of the same task had not finished yet.
    AlreadyRunning,
}

/// A zero-argument unit of ingestion work.
#[async_trait]
pub trait Task: Send + Sync {
    fn dataset(&self) -> DatasetKind;

    async fn run(&self) -> Result<TaskOutcome, IngestError>;
}

/// Deadline and retry budget of one feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchPolicy {
    pub timeout: Duration,
    pub retry: RetryPolicy,
}

impl FetchPolicy {
    /// One attempt; a failure skips this cycle.
    pub fn simple(timeout: Duration) -> Self {
        Self {
            timeout,
            retry: RetryPolicy::once(),
        }
    }

    /// Fibonacci backoff over 7 attempts.
    pub fn resilient(timeout: Duration) -> Self {
        Self {
            timeout,
            retry: RetryPolicy::fibonacci(),
        }
    }
}

/// Task for one upstream feed.
pub struct FeedTask<F> {
    feed: F,
    source: FeedSource,
    client: Arc<dyn HttpClient>,
    store: Store,
    policy: FetchPolicy,
}

impl<F: Persist> FeedTask<F> {
    pub fn new(
        feed: F,
        source: FeedSource,
        client: Arc<dyn HttpClient>,
        store: Store,
        policy: FetchPolicy,
    ) -> Self {
        Self {
            feed,
            source,
            client,
            store,
            policy,
        }
    }
}

#[async_trait]
impl<F> Task for FeedTask<F>
where
    F: Persist + 'static,
{
    fn dataset(&self) -> DatasetKind {
        self.feed.dataset()
    }

    async fn run(&self) -> Result<TaskOutcome, IngestError> {
        let dataset = self.dataset();

        let loaded = self
            .feed
            .already_loaded(&self.store)
            .await
            .map_err(|e| IngestError::new(dataset, Stage::Persist, e))?;
        if loaded {
            info!(%dataset, "Reference data already present, skipping fetch");
            return Ok(TaskOutcome::AlreadyLoaded);
        }

        let FetchPolicy { timeout, retry } = &self.policy;
        let payload: F::Payload =
            fetch_json_with_retry(&*self.client, &self.source, *timeout, retry)
                .await
                .map_err(|e| {
                    // the body arrived but did not match the feed schema
                    let stage = if e.is_decode() { Stage::Normalize } else { Stage::Fetch };
                    IngestError::new(dataset, stage, e)
                })?;

        let entities = self.feed.normalize(payload);
        debug!(%dataset, entities = entities.len(), "Payload normalized");

        let rows = self
            .feed
            .persist(&self.store, entities)
            .await
            .map_err(|e| IngestError::new(dataset, Stage::Persist, e))?;

        Ok(TaskOutcome::Persisted { rows })
    }
}

/// One-off replacement of the bikeway table with an externally supplied
/// snapshot, handed to the runner instead of being written by the caller.
pub struct ReplaceBikewaysTask {
    store: Store,
    bikeways: Vec<Bikeway>,
}

impl ReplaceBikewaysTask {
    pub fn new(store: Store, bikeways: Vec<Bikeway>) -> Self {
        Self { store, bikeways }
    }
}

#[async_trait]
impl Task for ReplaceBikewaysTask {
    fn dataset(&self) -> DatasetKind {
        DatasetKind::Bikeways
    }

    async fn run(&self) -> Result<TaskOutcome, IngestError> {
        let rows = self
            .store
            .replace_bikeways(&self.bikeways)
            .await
            .map_err(|e| IngestError::new(DatasetKind::Bikeways, Stage::Persist, e))?;
        Ok(TaskOutcome::Persisted { rows })
    }
}
