//! GBFS `free_bike_status` feed of dockless bikes.

use super::{Feed, GbfsEnvelope, flexible_bool};
use crate::domain::{DatasetKind, FreeFloatingBike};
use chrono::DateTime;
use geo::Point;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct BikeList {
    #[serde(default)]
    pub bikes: Vec<RawFreeFloatingBike>,
}

#[derive(Debug, Deserialize)]
pub struct RawFreeFloatingBike {
    pub bike_id: String,
    pub lat: f64,
    pub lon: f64,
    #[serde(default, deserialize_with = "flexible_bool")]
    pub is_reserved: bool,
    #[serde(default, deserialize_with = "flexible_bool")]
    pub is_disabled: bool,
    #[serde(default)]
    pub current_range_meters: Option<f64>,
    #[serde(default)]
    pub vehicle_type_id: Option<String>,
    #[serde(default)]
    pub vehicle_type: Option<String>,
    #[serde(default)]
    pub last_reported: Option<i64>,
}

pub struct FreeFloatingBikesFeed;

impl Feed for FreeFloatingBikesFeed {
    type Payload = GbfsEnvelope<BikeList>;
    type Entity = FreeFloatingBike;

    fn dataset(&self) -> DatasetKind {
        DatasetKind::FreeFloatingBikes
    }

    fn normalize(&self, payload: Self::Payload) -> Vec<FreeFloatingBike> {
        payload
            .data
            .bikes
            .into_iter()
            .map(|b| FreeFloatingBike {
                bike_id: b.bike_id,
                position: Point::new(b.lon, b.lat),
                is_reserved: b.is_reserved,
                is_disabled: b.is_disabled,
                range_meters: b.current_range_meters.map(|m| m.round() as i64).unwrap_or(0),
                vehicle_type_id: b.vehicle_type_id.unwrap_or_default(),
                vehicle_type: b.vehicle_type.unwrap_or_default(),
                last_reported: b.last_reported.and_then(|t| DateTime::from_timestamp(t, 0)),
            })
            .collect()
    }
}
