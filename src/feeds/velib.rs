//! Vélib' Métropole station feeds: `station_information.json` and
//! `station_status.json`.

use super::{Feed, GbfsEnvelope};
use crate::domain::{DatasetKind, Occupancy, StationInformation};
use geo::Point;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct StationList<T> {
    #[serde(default = "Vec::new")]
    pub stations: Vec<T>,
}

#[derive(Debug, Deserialize)]
pub struct RawStationInformation {
    pub station_id: i64,
    pub name: String,
    pub lat: f64,
    pub lon: f64,
    pub capacity: f64,
}

#[derive(Debug, Deserialize)]
pub struct RawStationStatus {
    pub station_id: i64,
    #[serde(default)]
    pub num_bikes_available_types: Vec<AvailableBikeType>,
}

/// One entry of `num_bikes_available_types`; each entry usually carries a
/// single key.
#[derive(Debug, Default, Deserialize)]
pub struct AvailableBikeType {
    pub mechanical: Option<i64>,
    pub ebike: Option<i64>,
}

pub struct StationInformationFeed;

impl Feed for StationInformationFeed {
    type Payload = GbfsEnvelope<StationList<RawStationInformation>>;
    type Entity = StationInformation;

    fn dataset(&self) -> DatasetKind {
        DatasetKind::Stations
    }

    fn normalize(&self, payload: Self::Payload) -> Vec<StationInformation> {
        payload
            .data
            .stations
            .into_iter()
            .map(|s| StationInformation {
                id: s.station_id,
                name: s.name,
                capacity: s.capacity.round() as i64,
                position: Point::new(s.lon, s.lat),
            })
            .collect()
    }
}

pub struct StationStatusFeed;

impl Feed for StationStatusFeed {
    type Payload = GbfsEnvelope<StationList<RawStationStatus>>;
    type Entity = Occupancy;

    fn dataset(&self) -> DatasetKind {
        DatasetKind::Statuses
    }

    fn normalize(&self, payload: Self::Payload) -> Vec<Occupancy> {
        payload.data.stations.iter().map(occupancy).collect()
    }
}

/// Counts for one station. A bike type listed several times keeps its last
/// value; a type never listed counts as zero.
pub fn occupancy(status: &RawStationStatus) -> Occupancy {
    let mut mechanical = 0;
    let mut electric = 0;

    for available in &status.num_bikes_available_types {
        if let Some(n) = available.mechanical {
            mechanical = n;
        }
        if let Some(n) = available.ebike {
            electric = n;
        }
    }

    Occupancy {
        station_id: status.station_id,
        mechanical,
        electric,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn statuses(json: &str) -> Vec<Occupancy> {
        let payload = serde_json::from_str(json).unwrap();
        StationStatusFeed.normalize(payload)
    }

    #[test]
    fn test_last_listed_value_wins() {
        let rows = statuses(
            r#"{"data": {"stations": [{
                "station_id": 1,
                "num_bikes_available_types": [{"mechanical": 3}, {"ebike": 2}, {"mechanical": 5}]
            }]}}"#,
        );
        assert_eq!(rows, vec![Occupancy { station_id: 1, mechanical: 5, electric: 2 }]);
    }

    #[test]
    fn test_missing_types_default_to_zero() {
        let rows = statuses(
            r#"{"data": {"stations": [
                {"station_id": 7, "num_bikes_available_types": [{"ebike": 4}]},
                {"station_id": 8}
            ]}}"#,
        );
        assert_eq!(rows[0], Occupancy { station_id: 7, mechanical: 0, electric: 4 });
        assert_eq!(rows[1], Occupancy { station_id: 8, mechanical: 0, electric: 0 });
    }

    #[test]
    fn test_station_information_keeps_lon_lat_order() {
        let payload = serde_json::from_str(
            r#"{"lastUpdatedOther": 1714567890, "ttl": 3600, "data": {"stations": [{
                "station_id": 213688169, "name": "Benjamin Godard - Victor Hugo",
                "lat": 48.865983, "lon": 2.275725, "capacity": 35, "stationCode": "16107"
            }]}}"#,
        )
        .unwrap();

        let stations = StationInformationFeed.normalize(payload);
        assert_eq!(stations.len(), 1);
        assert_eq!(stations[0].id, 213688169);
        assert_eq!(stations[0].capacity, 35);
        assert_eq!(stations[0].position.x(), 2.275725);
        assert_eq!(stations[0].position.y(), 48.865983);
    }

    #[test]
    fn test_missing_station_list_is_empty() {
        let payload = serde_json::from_str(r#"{"data": {}}"#).unwrap();
        assert!(StationInformationFeed.normalize(payload).is_empty());
        assert!(statuses(r#"{"data": {}}"#).is_empty());
    }

    #[test]
    fn test_schema_drift_is_a_decode_error() {
        let result: Result<<StationStatusFeed as Feed>::Payload, _> =
            serde_json::from_str(r#"{"data": {"stations": [{"station_id": "abc"}]}}"#);
        assert!(result.is_err());
    }
}
