//! How each feed's entities land in the store.

use crate::domain::BoundaryKind;
use crate::feeds::{
    BikeLanesFeed, BikewaysFeed, BoroughsFeed, DistrictsFeed, Feed, FreeFloatingBikesFeed,
    StationInformationFeed, StationStatusFeed,
};
use crate::store::Store;
use anyhow::Result;
use async_trait::async_trait;

/// Idempotency policy of a feed: what "already loaded" means and how a
/// normalized batch is written.
#[async_trait]
pub trait Persist: Feed {
    /// Seed-once guard. When `true` the run is skipped before any fetch.
    async fn already_loaded(&self, _store: &Store) -> Result<bool> {
        Ok(false)
    }

    /// Writes one normalized batch and returns the number of rows written.
    async fn persist(&self, store: &Store, entities: Vec<Self::Entity>) -> Result<u64>;
}

#[async_trait]
impl Persist for StationInformationFeed {
    async fn persist(&self, store: &Store, entities: Vec<Self::Entity>) -> Result<u64> {
        store.insert_stations(&entities).await
    }
}

#[async_trait]
impl Persist for StationStatusFeed {
    async fn persist(&self, store: &Store, entities: Vec<Self::Entity>) -> Result<u64> {
        store.insert_occupancy(&entities).await?;
        Ok(entities.len() as u64)
    }
}

#[async_trait]
impl Persist for DistrictsFeed {
    async fn already_loaded(&self, store: &Store) -> Result<bool> {
        store.has_boundaries(BoundaryKind::District).await
    }

    async fn persist(&self, store: &Store, entities: Vec<Self::Entity>) -> Result<u64> {
        store.insert_boundaries(BoundaryKind::District, &entities).await
    }
}

#[async_trait]
impl Persist for BoroughsFeed {
    async fn already_loaded(&self, store: &Store) -> Result<bool> {
        store.has_boundaries(BoundaryKind::Borough).await
    }

    async fn persist(&self, store: &Store, entities: Vec<Self::Entity>) -> Result<u64> {
        store.insert_boundaries(BoundaryKind::Borough, &entities).await
    }
}

#[async_trait]
impl Persist for BikewaysFeed {
    async fn persist(&self, store: &Store, entities: Vec<Self::Entity>) -> Result<u64> {
        store.replace_bikeways(&entities).await
    }
}

#[async_trait]
impl Persist for BikeLanesFeed {
    async fn persist(&self, store: &Store, entities: Vec<Self::Entity>) -> Result<u64> {
        store.replace_bike_lanes(&entities).await
    }
}

#[async_trait]
impl Persist for FreeFloatingBikesFeed {
    async fn persist(&self, store: &Store, entities: Vec<Self::Entity>) -> Result<u64> {
        store.insert_free_floating_bikes(&entities).await?;
        Ok(entities.len() as u64)
    }
}
