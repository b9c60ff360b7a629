//! Upstream payload schemas and their mapping into [`crate::domain`] entities.
//!
//! Each feed declares the exact shape it expects (`Payload`) and a pure
//! `normalize` function. Nothing in this module performs I/O.

pub mod bikelanes;
pub mod bikeways;
pub mod boundaries;
pub mod free_floating;
pub mod velib;

use crate::domain::DatasetKind;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};

pub use bikelanes::BikeLanesFeed;
pub use bikeways::BikewaysFeed;
pub use boundaries::{BoroughsFeed, DistrictsFeed};
pub use free_floating::FreeFloatingBikesFeed;
pub use velib::{StationInformationFeed, StationStatusFeed};

/// A feed schema plus its mapping into internal entities.
pub trait Feed: Send + Sync {
    type Payload: DeserializeOwned + Send;
    type Entity: Send + Sync;

    fn dataset(&self) -> DatasetKind;

    fn normalize(&self, payload: Self::Payload) -> Vec<Self::Entity>;
}

/// Envelope shared by the GBFS-style JSON feeds.
#[derive(Debug, Deserialize)]
pub struct GbfsEnvelope<T> {
    pub data: T,
    #[serde(default)]
    pub last_updated: Option<i64>,
    #[serde(default, rename = "lastUpdatedOther")]
    pub last_updated_other: Option<i64>,
    #[serde(default)]
    pub ttl: Option<i64>,
}

/// A GeoJSON FeatureCollection with typed properties.
#[derive(Debug, Deserialize)]
pub struct GeoFeatureCollection<P> {
    #[serde(default = "Vec::new")]
    pub features: Vec<GeoFeature<P>>,
}

#[derive(Debug, Deserialize)]
pub struct GeoFeature<P> {
    #[serde(default)]
    pub geometry: Option<geojson::Geometry>,
    pub properties: P,
}

/// Localized yes/no flags ("Oui"/"Non") become booleans. Only the
/// affirmative token, in any case, maps to `true`.
pub fn is_affirmative(value: Option<&str>) -> bool {
    value.is_some_and(|v| v.eq_ignore_ascii_case("oui"))
}

/// Accepts `true`/`false` as well as the `0`/`1` integers some GBFS
/// producers emit.
pub(crate) fn flexible_bool<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Flag {
        Bool(bool),
        Int(i64),
    }

    Ok(match Flag::deserialize(deserializer)? {
        Flag::Bool(b) => b,
        Flag::Int(i) => i != 0,
    })
}
