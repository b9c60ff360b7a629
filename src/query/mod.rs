//! Read side: joins stored occupancy with static geometry.
//!
//! Every operation returns a [`Served`] body together with the cache policy
//! an HTTP layer should apply. Reads pinned to a past timestamp are
//! immutable; reads that resolve to "latest" are not cacheable.

pub mod aggregate;
pub mod hex;

pub use aggregate::{BoundaryAggregate, aggregate};
pub use hex::{DEFAULT_RESOLUTION, cell_id, parse_resolution};

use crate::domain::BoundaryKind;
use crate::store::{DistributionPoint, Store, TimeSeriesPoint};
use chrono::{DateTime, TimeDelta, Utc};
use geojson::{Feature, FeatureCollection, JsonObject};
use h3o::Resolution;
use serde_json::json;
use thiserror::Error;
use tracing::debug;

/// Cache header for responses that can never change.
pub const IMMUTABLE: &str = "max-age=86400, immutable";

#[derive(Debug, Error)]
pub enum QueryError {
    #[error("invalid resolution '{0}': expected an integer between 0 and 15")]
    InvalidResolution(String),

    #[error("invalid station id '{0}'")]
    InvalidStationId(String),

    #[error("at least one station id is required")]
    MissingStationIds,

    #[error("invalid timestamp '{0}': expected RFC 3339")]
    InvalidTimestamp(String),

    #[error("store read failed: {0:#}")]
    Store(#[from] anyhow::Error),
}

impl QueryError {
    /// Caller mistakes, as opposed to server faults.
    pub fn is_client_error(&self) -> bool {
        !matches!(self, QueryError::Store(_))
    }
}

/// A response body plus its `Cache-Control` value, if any.
#[derive(Debug, Clone, PartialEq)]
pub struct Served<T> {
    pub body: T,
    pub cache_control: Option<&'static str>,
}

impl<T> Served<T> {
    fn immutable(body: T) -> Self {
        Self {
            body,
            cache_control: Some(IMMUTABLE),
        }
    }

    fn fresh(body: T) -> Self {
        Self {
            body,
            cache_control: None,
        }
    }

    fn pinned(body: T, pinned: bool) -> Self {
        if pinned { Self::immutable(body) } else { Self::fresh(body) }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct TimestampRange {
    pub min: DateTime<Utc>,
    pub max: DateTime<Utc>,
}

pub fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, QueryError> {
    DateTime::parse_from_rfc3339(raw.trim())
        .map(|t| t.with_timezone(&Utc))
        .map_err(|_| QueryError::InvalidTimestamp(raw.to_string()))
}

/// Parses a comma separated id list such as `"16107,9020"`.
pub fn parse_station_ids(raw: &str) -> Result<Vec<i64>, QueryError> {
    let ids = raw
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| s.parse::<i64>().map_err(|_| QueryError::InvalidStationId(s.to_string())))
        .collect::<Result<Vec<_>, _>>()?;

    if ids.is_empty() {
        return Err(QueryError::MissingStationIds);
    }
    Ok(ids)
}

fn feature(geometry: &geo::Geometry<f64>, properties: serde_json::Value) -> Feature {
    let properties = match properties {
        serde_json::Value::Object(map) => Some(map),
        _ => Some(JsonObject::new()),
    };
    Feature {
        bbox: None,
        geometry: Some(geojson::Geometry::new(geojson::Value::from(geometry))),
        id: None,
        properties,
        foreign_members: None,
    }
}

fn collection(features: Vec<Feature>) -> FeatureCollection {
    FeatureCollection {
        bbox: None,
        features,
        foreign_members: None,
    }
}

/// Read-side entry point, owning a store handle and the query defaults.
#[derive(Clone)]
pub struct QueryEngine {
    store: Store,
    default_resolution: Resolution,
    window: TimeDelta,
}

impl QueryEngine {
    pub fn new(store: Store, default_resolution: Resolution, window: TimeDelta) -> Self {
        Self {
            store,
            default_resolution,
            window,
        }
    }

    pub async fn timestamp_range(&self) -> Result<Served<Option<TimestampRange>>, QueryError> {
        let range = self
            .store
            .timestamp_range()
            .await?
            .map(|(min, max)| TimestampRange { min, max });
        Ok(Served::fresh(range))
    }

    /// The single maximum occupancy timestamp, or `None` for an empty store.
    pub async fn latest_timestamp(&self) -> Result<Option<DateTime<Utc>>, QueryError> {
        Ok(self.store.latest_timestamp().await?)
    }

    /// `at` when pinned, the latest stored timestamp otherwise.
    async fn resolve(
        &self,
        at: Option<DateTime<Utc>>,
    ) -> Result<Option<DateTime<Utc>>, QueryError> {
        match at {
            Some(at) => Ok(Some(at)),
            None => self.latest_timestamp().await,
        }
    }

    /// Stations with their occupancy at `at` (or the latest snapshot), each
    /// tagged with its hex cell at `resolution` (or the default).
    pub async fn stations_as_of(
        &self,
        at: Option<DateTime<Utc>>,
        resolution: Option<Resolution>,
    ) -> Result<Served<FeatureCollection>, QueryError> {
        let Some(ts) = self.resolve(at).await? else {
            return Ok(Served::fresh(collection(Vec::new())));
        };
        let resolution = resolution.unwrap_or(self.default_resolution);

        let stations = self.store.stations_at(ts).await?;
        debug!(timestamp = %ts, stations = stations.len(), "Stations resolved");

        let features = stations
            .iter()
            .map(|s| {
                feature(
                    &geo::Geometry::Point(s.position),
                    json!({
                        "station_id": s.id,
                        "name": s.name,
                        "capacity": s.capacity,
                        "mechanical": s.mechanical,
                        "electric": s.electric,
                        "bikes": s.mechanical + s.electric,
                        "h3": cell_id(&s.position, resolution),
                        "timestamp": ts,
                    }),
                )
            })
            .collect();

        Ok(Served::pinned(collection(features), at.is_some()))
    }

    /// One feature per boundary of `kind` that contains at least one
    /// station with occupancy at exactly `at` (or the latest snapshot).
    pub async fn boundary_aggregate_as_of(
        &self,
        kind: BoundaryKind,
        at: Option<DateTime<Utc>>,
    ) -> Result<Served<FeatureCollection>, QueryError> {
        let Some(ts) = self.resolve(at).await? else {
            return Ok(Served::fresh(collection(Vec::new())));
        };

        let boundaries = self.store.boundaries(kind).await?;
        let stations = self.store.stations_at(ts).await?;

        let features = aggregate(&boundaries, &stations)
            .into_iter()
            .map(|a| {
                feature(
                    &a.boundary.shape,
                    json!({
                        "name": a.boundary.name,
                        "label": a.boundary.label,
                        "ids": a.station_ids,
                        "mechanical": a.mechanical,
                        "electric": a.electric,
                        "bikes": a.bikes(),
                        "timestamp": ts,
                    }),
                )
            })
            .collect::<Vec<_>>();

        debug!(
            table = kind.table(),
            timestamp = %ts,
            features = features.len(),
            "Boundaries aggregated"
        );
        Ok(Served::pinned(collection(features), at.is_some()))
    }

    /// Free-floating bikes of the `at` bucket (or the latest one).
    pub async fn free_floating_as_of(
        &self,
        at: Option<DateTime<Utc>>,
    ) -> Result<Served<FeatureCollection>, QueryError> {
        let ts = match at {
            Some(at) => Some(at),
            None => self.store.latest_free_floating_timestamp().await?,
        };
        let Some(ts) = ts else {
            return Ok(Served::fresh(collection(Vec::new())));
        };

        let features = self
            .store
            .free_floating_at(ts)
            .await?
            .iter()
            .map(|b| {
                feature(
                    &geo::Geometry::Point(b.position),
                    json!({
                        "bike_id": b.bike_id,
                        "is_reserved": b.is_reserved,
                        "is_disabled": b.is_disabled,
                        "range_meters": b.range_meters,
                        "vehicle_type_id": b.vehicle_type_id,
                        "vehicle_type": b.vehicle_type,
                        "last_reported": b.last_reported,
                        "timestamp": ts,
                    }),
                )
            })
            .collect();

        Ok(Served::pinned(collection(features), at.is_some()))
    }

    /// Occupancy of `station_ids` summed per timestamp over the trailing window.
    pub async fn time_series(
        &self,
        station_ids: &[i64],
    ) -> Result<Served<Vec<TimeSeriesPoint>>, QueryError> {
        if station_ids.is_empty() {
            return Err(QueryError::MissingStationIds);
        }
        let since = Utc::now()
            .checked_sub_signed(self.window)
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        Ok(Served::fresh(self.store.time_series(station_ids, since).await?))
    }

    /// Typical-day profile of `station_ids`, averaged by time of day.
    pub async fn distribution(
        &self,
        station_ids: &[i64],
    ) -> Result<Served<Vec<DistributionPoint>>, QueryError> {
        if station_ids.is_empty() {
            return Err(QueryError::MissingStationIds);
        }
        Ok(Served::fresh(self.store.distribution(station_ids).await?))
    }

    pub async fn bikeways(&self) -> Result<Served<FeatureCollection>, QueryError> {
        let features = self
            .store
            .bikeways()
            .await?
            .iter()
            .map(|w| {
                feature(
                    &w.shape,
                    json!({
                        "id": w.id,
                        "typology": w.typology,
                        "bidirectional": w.bidirectional,
                        "status": w.status,
                        "direction": w.direction,
                        "route": w.route,
                    }),
                )
            })
            .collect();
        Ok(Served::immutable(collection(features)))
    }

    pub async fn bike_lanes(&self) -> Result<Served<FeatureCollection>, QueryError> {
        let features = self
            .store
            .bike_lanes()
            .await?
            .iter()
            .map(|l| {
                feature(
                    &l.shape,
                    json!({
                        "id": l.id,
                        "osm_id": l.osm_id,
                        "name": l.name,
                        "layout": l.layout,
                        "layout_side": l.layout_side,
                        "direction": l.direction,
                        "surface": l.surface,
                        "borough": l.borough,
                        "forest": l.forest,
                        "coronapiste": l.coronapiste,
                        "temporary": l.temporary,
                        "bidirectional": l.bidirectional,
                        "one_way_street": l.one_way_street,
                        "position": l.position,
                        "speed_limit": l.speed_limit,
                    }),
                )
            })
            .collect();
        Ok(Served::immutable(collection(features)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Boundary, BoundaryShape, FreeFloatingBike, Occupancy, StationInformation};
    use chrono::TimeZone;
    use geo::{Point, polygon};

    async fn engine() -> (Store, QueryEngine) {
        let store = Store::in_memory().await.unwrap();
        let engine = QueryEngine::new(store.clone(), Resolution::Eight, TimeDelta::days(7));
        (store, engine)
    }

    async fn seed_stations(store: &Store) {
        let stations: Vec<_> = [(1, 0.2, 0.2), (2, 0.8, 0.8), (3, 2.0, 2.0)]
            .into_iter()
            .map(|(id, x, y)| StationInformation {
                id,
                name: format!("S{id}"),
                capacity: 10,
                position: Point::new(x, y),
            })
            .collect();
        store.insert_stations(&stations).await.unwrap();
    }

    fn occupancy(station_id: i64, mechanical: i64, electric: i64) -> Occupancy {
        Occupancy {
            station_id,
            mechanical,
            electric,
        }
    }

    #[test]
    fn test_parse_station_ids() {
        assert_eq!(parse_station_ids("16107, 9020").unwrap(), vec![16107, 9020]);
        assert!(matches!(
            parse_station_ids("12,abc"),
            Err(QueryError::InvalidStationId(s)) if s == "abc"
        ));
        assert!(matches!(parse_station_ids(" , "), Err(QueryError::MissingStationIds)));
    }

    #[test]
    fn test_parse_timestamp() {
        let ts = parse_timestamp("2024-05-01T10:00:00+02:00").unwrap();
        assert_eq!(ts, Utc.with_ymd_and_hms(2024, 5, 1, 8, 0, 0).unwrap());
        assert!(parse_timestamp("yesterday").unwrap_err().is_client_error());
    }

    #[tokio::test]
    async fn test_empty_store_yields_empty_collection() {
        let (_, engine) = engine().await;
        let served = engine.stations_as_of(None, None).await.unwrap();
        assert!(served.body.features.is_empty());
        assert_eq!(served.cache_control, None);
        assert_eq!(engine.timestamp_range().await.unwrap().body, None);
    }

    #[tokio::test]
    async fn test_latest_is_default_and_not_cached() {
        let (store, engine) = engine().await;
        seed_stations(&store).await;
        let t0 = Utc.with_ymd_and_hms(2024, 5, 1, 8, 0, 0).unwrap();
        let t1 = Utc.with_ymd_and_hms(2024, 5, 1, 8, 10, 0).unwrap();
        store.insert_occupancy_at(&[occupancy(1, 1, 1), occupancy(2, 1, 1)], t0).await.unwrap();
        store.insert_occupancy_at(&[occupancy(1, 5, 0)], t1).await.unwrap();

        let served = engine.stations_as_of(None, None).await.unwrap();
        assert_eq!(served.cache_control, None);
        assert_eq!(served.body.features.len(), 1);
        let props = served.body.features[0].properties.as_ref().unwrap();
        assert_eq!(props["station_id"], 1);
        assert_eq!(props["bikes"], 5);
        assert!(props["h3"].is_string());

        let pinned = engine.stations_as_of(Some(t0), None).await.unwrap();
        assert_eq!(pinned.cache_control, Some(IMMUTABLE));
        assert_eq!(pinned.body.features.len(), 2);
    }

    #[tokio::test]
    async fn test_boundary_aggregate() {
        let (store, engine) = engine().await;
        seed_stations(&store).await;
        let boundary = Boundary {
            name: "Unit".to_string(),
            label: "1".to_string(),
            shape: BoundaryShape::Polygon(polygon![
                (x: 0.0, y: 0.0),
                (x: 1.0, y: 0.0),
                (x: 1.0, y: 1.0),
                (x: 0.0, y: 1.0),
                (x: 0.0, y: 0.0),
            ]),
        };
        store.insert_boundaries(BoundaryKind::Borough, &[boundary]).await.unwrap();
        let t0 = Utc.with_ymd_and_hms(2024, 5, 1, 8, 0, 0).unwrap();
        store
            .insert_occupancy_at(
                &[occupancy(1, 2, 1), occupancy(2, 3, 0), occupancy(3, 40, 40)],
                t0,
            )
            .await
            .unwrap();

        let served = engine.boundary_aggregate_as_of(BoundaryKind::Borough, None).await.unwrap();
        assert_eq!(served.body.features.len(), 1);
        let props = served.body.features[0].properties.as_ref().unwrap();
        assert_eq!(props["mechanical"], 5);
        assert_eq!(props["electric"], 1);
        assert_eq!(props["ids"], json!([1, 2]));

        let miss = engine
            .boundary_aggregate_as_of(BoundaryKind::Borough, Some(t0 + TimeDelta::minutes(1)))
            .await
            .unwrap();
        assert!(miss.body.features.is_empty());
        assert!(engine
            .boundary_aggregate_as_of(BoundaryKind::District, None)
            .await
            .unwrap()
            .body
            .features
            .is_empty());
    }

    #[tokio::test]
    async fn test_geometry_dumps_are_immutable() {
        let (_, engine) = engine().await;
        assert_eq!(engine.bikeways().await.unwrap().cache_control, Some(IMMUTABLE));
        assert_eq!(engine.bike_lanes().await.unwrap().cache_control, Some(IMMUTABLE));
    }

    #[tokio::test]
    async fn test_sub_second_pin_matches_nothing() {
        let (store, engine) = engine().await;
        seed_stations(&store).await;
        let t0 = Utc.with_ymd_and_hms(2024, 5, 1, 8, 0, 0).unwrap();
        store.insert_occupancy_at(&[occupancy(1, 1, 1)], t0).await.unwrap();

        let exact = engine.stations_as_of(Some(t0), None).await.unwrap();
        assert_eq!(exact.body.features.len(), 1);
        let late = engine
            .stations_as_of(Some(t0 + TimeDelta::milliseconds(900)), None)
            .await
            .unwrap();
        assert!(late.body.features.is_empty());
    }

    #[tokio::test]
    async fn test_free_floating_latest_and_pinned() {
        let (store, engine) = engine().await;
        let empty = engine.free_floating_as_of(None).await.unwrap();
        assert!(empty.body.features.is_empty());
        assert_eq!(empty.cache_control, None);

        let bike = |id: &str, x: f64| FreeFloatingBike {
            bike_id: id.to_string(),
            position: Point::new(x, 48.85),
            is_reserved: false,
            is_disabled: id == "b",
            range_meters: 12_000,
            vehicle_type_id: "1".to_string(),
            vehicle_type: "bike".to_string(),
            last_reported: None,
        };
        let t0 = Utc.with_ymd_and_hms(2024, 5, 1, 8, 3, 0).unwrap();
        let t1 = Utc.with_ymd_and_hms(2024, 5, 1, 8, 14, 0).unwrap();
        let b0 = store.insert_free_floating_bikes_at(&[bike("a", 2.30)], t0).await.unwrap();
        let b1 = store
            .insert_free_floating_bikes_at(&[bike("a", 2.31), bike("b", 2.32)], t1)
            .await
            .unwrap();
        assert_eq!(b1, Utc.with_ymd_and_hms(2024, 5, 1, 8, 10, 0).unwrap());

        let latest = engine.free_floating_as_of(None).await.unwrap();
        assert_eq!(latest.cache_control, None);
        assert_eq!(latest.body.features.len(), 2);
        let props = latest.body.features[1].properties.as_ref().unwrap();
        assert_eq!(props["bike_id"], "b");
        assert_eq!(props["is_disabled"], true);
        assert_eq!(props["range_meters"], 12_000);

        let pinned = engine.free_floating_as_of(Some(b0)).await.unwrap();
        assert_eq!(pinned.cache_control, Some(IMMUTABLE));
        assert_eq!(pinned.body.features.len(), 1);

        let miss = engine.free_floating_as_of(Some(t0)).await.unwrap();
        assert!(miss.body.features.is_empty());
        assert_eq!(miss.cache_control, Some(IMMUTABLE));
    }

    #[tokio::test]
    async fn test_oversized_window_reads_everything() {
        let store = Store::in_memory().await.unwrap();
        let engine = QueryEngine::new(store.clone(), Resolution::Eight, TimeDelta::MAX);
        let t0 = Utc.with_ymd_and_hms(2001, 1, 1, 0, 0, 0).unwrap();
        store.insert_occupancy_at(&[occupancy(1, 2, 3)], t0).await.unwrap();

        let served = engine.time_series(&[1]).await.unwrap();
        assert_eq!(served.body.len(), 1);
        assert_eq!(served.body[0].mechanical, 2);
    }

    #[tokio::test]
    async fn test_time_series_requires_ids() {
        let (_, engine) = engine().await;
        let err = engine.time_series(&[]).await.unwrap_err();
        assert!(err.is_client_error());
    }
}
