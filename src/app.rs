//! Application context: owns the configuration, the store, the HTTP client,
//! the scheduler with its task list, and the query engine.

use crate::config::{Config, FeedSources};
use crate::domain::{Bikeway, DatasetKind};
use crate::feeds::{
    BikeLanesFeed, BikewaysFeed, BoroughsFeed, DistrictsFeed, Feed, FreeFloatingBikesFeed,
    StationInformationFeed, StationStatusFeed,
};
use crate::fetch::{BasicClient, FeedSource, HttpClient, fetch_json};
use crate::query::QueryEngine;
use crate::scheduler::{Cadence, Scheduler};
use crate::store::Store;
use crate::tasks::{FeedTask, FetchPolicy, ManagedTask, Persist, ReplaceBikewaysTask, TaskOutcome};
use anyhow::{Context, Result};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::info;

const SHORT_TIMEOUT: Duration = Duration::from_secs(10);
const FREE_FLOATING_TIMEOUT: Duration = Duration::from_secs(20);
const GEOMETRY_TIMEOUT: Duration = Duration::from_secs(60);

pub struct App {
    pub config: Config,
    pub store: Store,
    pub scheduler: Scheduler,
    pub query: QueryEngine,
}

impl App {
    /// Opens the configured database and wires every task with the
    /// production HTTP client.
    pub async fn new(config: Config) -> Result<Self> {
        let store = Store::connect(&config.database_url).await?;
        Ok(Self::with_parts(config, store, Arc::new(BasicClient::new())))
    }

    pub fn with_parts(config: Config, store: Store, client: Arc<dyn HttpClient>) -> Self {
        let scheduler = build_scheduler(&config.sources, &store, &client);
        let query = QueryEngine::new(
            store.clone(),
            config.h3_resolution,
            config.time_series_window,
        );
        Self {
            config,
            store,
            scheduler,
            query,
        }
    }

    pub fn task(&self, dataset: DatasetKind) -> Option<Arc<ManagedTask>> {
        self.scheduler.task(dataset)
    }

    /// Hands an externally supplied bikeway snapshot to the runner. The
    /// write happens in the background; its outcome is reported by the runner.
    pub fn import_bikeways(&self, bikeways: Vec<Bikeway>) -> JoinHandle<Option<TaskOutcome>> {
        info!(rows = bikeways.len(), "Bikeway snapshot handed to the runner");
        self.scheduler
            .dispatch(ReplaceBikewaysTask::new(self.store.clone(), bikeways))
    }

    /// Reads a `reseau-cyclable` GeoJSON export from disk and hands it over
    /// as in [`App::import_bikeways`].
    pub async fn import_bikeways_file(
        &self,
        path: PathBuf,
    ) -> Result<JoinHandle<Option<TaskOutcome>>> {
        let source = FeedSource::File(path);
        let payload = fetch_json(&BasicClient::new(), &source, GEOMETRY_TIMEOUT)
            .await
            .with_context(|| format!("reading bikeway snapshot {source}"))?;
        Ok(self.import_bikeways(BikewaysFeed.normalize(payload)))
    }
}

fn feed_task<F: Persist>(
    feed: F,
    sources: &FeedSources,
    store: &Store,
    client: &Arc<dyn HttpClient>,
    policy: FetchPolicy,
) -> FeedTask<F> {
    let source = sources.get(feed.dataset()).clone();
    FeedTask::new(feed, source, client.clone(), store.clone(), policy)
}

/// Statuses and free-floating bikes every ten minutes; station metadata
/// and cycling geometry at startup then daily; boundaries once at startup.
fn build_scheduler(
    sources: &FeedSources,
    store: &Store,
    client: &Arc<dyn HttpClient>,
) -> Scheduler {
    let short = FetchPolicy::simple(SHORT_TIMEOUT);
    let short_resilient = FetchPolicy::resilient(SHORT_TIMEOUT);
    let geometry = FetchPolicy::simple(GEOMETRY_TIMEOUT);
    let mut scheduler = Scheduler::new();
    scheduler
        .add(
            feed_task(StationInformationFeed, sources, store, client, short),
            true,
            Some(Cadence::Daily),
        )
        .add(
            feed_task(StationStatusFeed, sources, store, client, short),
            false,
            Some(Cadence::TenMinutes),
        )
        .add(
            feed_task(DistrictsFeed, sources, store, client, short_resilient),
            true,
            None,
        )
        .add(
            feed_task(BoroughsFeed, sources, store, client, short_resilient),
            true,
            None,
        )
        .add(
            feed_task(BikewaysFeed, sources, store, client, geometry),
            true,
            Some(Cadence::Daily),
        )
        .add(
            feed_task(BikeLanesFeed, sources, store, client, geometry),
            true,
            Some(Cadence::Daily),
        )
        .add(
            feed_task(
                FreeFloatingBikesFeed,
                sources,
                store,
                client,
                FetchPolicy::resilient(FREE_FLOATING_TIMEOUT),
            ),
            false,
            Some(Cadence::TenMinutes),
        );
    scheduler
}
