use super::{Store, exact_epoch, from_epoch, geometry_from_json, to_epoch};
use crate::domain::BoundaryKind;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use geo::{Geometry, Point};
use serde::Serialize;

/// A station joined with its occupancy at one timestamp.
#[derive(Debug, Clone, PartialEq)]
pub struct StationSnapshot {
    pub id: i64,
    pub name: String,
    pub capacity: i64,
    pub position: Point<f64>,
    pub mechanical: i64,
    pub electric: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BoundaryRow {
    pub name: String,
    pub label: String,
    pub shape: Geometry<f64>,
}

/// Summed occupancy of the requested stations at one timestamp.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimeSeriesPoint {
    pub timestamp: DateTime<Utc>,
    pub mechanical: i64,
    pub electric: i64,
}

/// Average occupancy at one time of day (`HH:MM`, UTC).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DistributionPoint {
    pub time: String,
    pub mechanical: f64,
    pub electric: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BikewayRow {
    pub id: i64,
    pub typology: String,
    pub bidirectional: bool,
    pub status: String,
    pub direction: String,
    pub route: String,
    pub shape: Geometry<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BikeLaneRow {
    pub id: i64,
    pub osm_id: i64,
    pub name: String,
    pub layout: String,
    pub layout_side: String,
    pub direction: String,
    pub surface: String,
    pub borough: String,
    pub forest: bool,
    pub coronapiste: bool,
    pub temporary: bool,
    pub bidirectional: bool,
    pub one_way_street: bool,
    pub position: String,
    pub speed_limit: String,
    pub shape: Geometry<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FreeFloatingRow {
    pub bike_id: String,
    pub position: Point<f64>,
    pub is_reserved: bool,
    pub is_disabled: bool,
    pub range_meters: i64,
    pub vehicle_type_id: String,
    pub vehicle_type: String,
    pub last_reported: Option<DateTime<Utc>>,
}

#[derive(sqlx::FromRow)]
struct RawStation {
    id: i64,
    name: String,
    capacity: i64,
    longitude: f64,
    latitude: f64,
    mechanical: i64,
    electric: i64,
}

#[derive(sqlx::FromRow)]
struct RawBikeway {
    id: i64,
    typology: String,
    bidirectional: bool,
    status: String,
    direction: String,
    route: String,
    shape: String,
}

#[derive(sqlx::FromRow)]
struct RawBikeLane {
    id: i64,
    osm_id: i64,
    name: String,
    layout: String,
    layout_side: String,
    direction: String,
    surface: String,
    borough: String,
    forest: bool,
    coronapiste: bool,
    temporary_layout: bool,
    bidirectional: bool,
    one_way_street: bool,
    position: String,
    speed_limit: String,
    shape: String,
}

#[derive(sqlx::FromRow)]
struct RawFreeFloating {
    bike_id: String,
    longitude: f64,
    latitude: f64,
    is_reserved: bool,
    is_disabled: bool,
    range_meters: i64,
    vehicle_type_id: String,
    vehicle_type: String,
    last_reported: Option<i64>,
}

impl Store {
    /// Oldest and newest occupancy timestamps, or `None` when no snapshot
    /// has been stored yet.
    pub async fn timestamp_range(&self) -> Result<Option<(DateTime<Utc>, DateTime<Utc>)>> {
        let (min, max): (Option<i64>, Option<i64>) =
            sqlx::query_as("SELECT MIN(timestamp), MAX(timestamp) FROM statuses")
                .fetch_one(&self.pool)
                .await
                .context("reading timestamp range")?;

        match (min, max) {
            (Some(min), Some(max)) => Ok(Some((from_epoch(min)?, from_epoch(max)?))),
            _ => Ok(None),
        }
    }

    pub async fn latest_timestamp(&self) -> Result<Option<DateTime<Utc>>> {
        let max: Option<i64> = sqlx::query_scalar("SELECT MAX(timestamp) FROM statuses")
            .fetch_one(&self.pool)
            .await
            .context("reading latest timestamp")?;
        max.map(from_epoch).transpose()
    }

    pub async fn latest_free_floating_timestamp(&self) -> Result<Option<DateTime<Utc>>> {
        let max: Option<i64> = sqlx::query_scalar("SELECT MAX(timestamp) FROM free_floating_bikes")
            .fetch_one(&self.pool)
            .await
            .context("reading latest free-floating timestamp")?;
        max.map(from_epoch).transpose()
    }

    /// Stations with an occupancy row at exactly `at`. Stations without a
    /// row at that timestamp, and rows without a known station, are absent.
    pub async fn stations_at(&self, at: DateTime<Utc>) -> Result<Vec<StationSnapshot>> {
        let Some(ts) = exact_epoch(at) else {
            return Ok(Vec::new());
        };
        let rows: Vec<RawStation> = sqlx::query_as(
            r#"
            SELECT s.id, s.name, s.capacity, s.longitude, s.latitude, st.mechanical, st.electric
            FROM statuses st
            JOIN stations s ON s.id = st.station_id
            WHERE st.timestamp = ?
            ORDER BY s.id
            "#,
        )
        .bind(ts)
        .fetch_all(&self.pool)
        .await
        .context("reading stations")?;

        Ok(rows
            .into_iter()
            .map(|r| StationSnapshot {
                id: r.id,
                name: r.name,
                capacity: r.capacity,
                position: Point::new(r.longitude, r.latitude),
                mechanical: r.mechanical,
                electric: r.electric,
            })
            .collect())
    }

    pub async fn boundaries(&self, kind: BoundaryKind) -> Result<Vec<BoundaryRow>> {
        let sql = format!("SELECT name, label, shape FROM {} ORDER BY id", kind.table());
        let rows: Vec<(String, String, String)> = sqlx::query_as(&sql)
            .fetch_all(&self.pool)
            .await
            .with_context(|| format!("reading {}", kind.table()))?;

        rows.into_iter()
            .map(|(name, label, shape)| {
                Ok(BoundaryRow {
                    name,
                    label,
                    shape: geometry_from_json(&shape)?,
                })
            })
            .collect()
    }

    /// Chronological occupancy of `station_ids`, summed per timestamp,
    /// restricted to timestamps at or after `since`.
    pub async fn time_series(
        &self,
        station_ids: &[i64],
        since: DateTime<Utc>,
    ) -> Result<Vec<TimeSeriesPoint>> {
        let rows: Vec<(i64, i64, i64)> = sqlx::query_as(
            r#"
            SELECT timestamp, SUM(mechanical), SUM(electric)
            FROM statuses
            WHERE station_id IN (SELECT value FROM json_each(?))
              AND timestamp >= ?
            GROUP BY timestamp
            ORDER BY timestamp
            "#,
        )
        .bind(serde_json::to_string(station_ids)?)
        .bind(to_epoch(since))
        .fetch_all(&self.pool)
        .await
        .context("reading time series")?;

        rows.into_iter()
            .map(|(ts, mechanical, electric)| {
                Ok(TimeSeriesPoint {
                    timestamp: from_epoch(ts)?,
                    mechanical,
                    electric,
                })
            })
            .collect()
    }

    /// Average per-row occupancy of `station_ids` grouped by hour and
    /// minute of day, over all stored samples.
    pub async fn distribution(&self, station_ids: &[i64]) -> Result<Vec<DistributionPoint>> {
        let rows: Vec<(String, f64, f64)> = sqlx::query_as(
            r#"
            SELECT strftime('%H:%M', timestamp, 'unixepoch') AS time_of_day,
                   AVG(mechanical),
                   AVG(electric)
            FROM statuses
            WHERE station_id IN (SELECT value FROM json_each(?))
            GROUP BY time_of_day
            ORDER BY time_of_day
            "#,
        )
        .bind(serde_json::to_string(station_ids)?)
        .fetch_all(&self.pool)
        .await
        .context("reading distribution")?;

        Ok(rows
            .into_iter()
            .map(|(time, mechanical, electric)| DistributionPoint {
                time,
                mechanical,
                electric,
            })
            .collect())
    }

    pub async fn bikeways(&self) -> Result<Vec<BikewayRow>> {
        let rows: Vec<RawBikeway> = sqlx::query_as(
            r#"
            SELECT id, typology, bidirectional, status, direction, route, shape
            FROM bikeways
            ORDER BY id
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .context("reading bikeways")?;

        rows.into_iter()
            .map(|r| {
                Ok(BikewayRow {
                    shape: geometry_from_json(&r.shape)?,
                    id: r.id,
                    typology: r.typology,
                    bidirectional: r.bidirectional,
                    status: r.status,
                    direction: r.direction,
                    route: r.route,
                })
            })
            .collect()
    }

    pub async fn bike_lanes(&self) -> Result<Vec<BikeLaneRow>> {
        let rows: Vec<RawBikeLane> = sqlx::query_as(
            r#"
            SELECT id, osm_id, name, layout, layout_side, direction, surface, borough, forest,
                   coronapiste, temporary_layout, bidirectional, one_way_street, position,
                   speed_limit, shape
            FROM bikelanes
            ORDER BY id
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .context("reading bike lanes")?;

        rows.into_iter()
            .map(|r| {
                Ok(BikeLaneRow {
                    shape: geometry_from_json(&r.shape)?,
                    id: r.id,
                    osm_id: r.osm_id,
                    name: r.name,
                    layout: r.layout,
                    layout_side: r.layout_side,
                    direction: r.direction,
                    surface: r.surface,
                    borough: r.borough,
                    forest: r.forest,
                    coronapiste: r.coronapiste,
                    temporary: r.temporary_layout,
                    bidirectional: r.bidirectional,
                    one_way_street: r.one_way_street,
                    position: r.position,
                    speed_limit: r.speed_limit,
                })
            })
            .collect()
    }

    /// Free-floating bikes stored under exactly the bucket `at`.
    pub async fn free_floating_at(&self, at: DateTime<Utc>) -> Result<Vec<FreeFloatingRow>> {
        let Some(ts) = exact_epoch(at) else {
            return Ok(Vec::new());
        };
        let rows: Vec<RawFreeFloating> = sqlx::query_as(
            r#"
            SELECT bike_id, longitude, latitude, is_reserved, is_disabled, range_meters,
                   vehicle_type_id, vehicle_type, last_reported
            FROM free_floating_bikes
            WHERE timestamp = ?
            ORDER BY bike_id
            "#,
        )
        .bind(ts)
        .fetch_all(&self.pool)
        .await
        .context("reading free-floating bikes")?;

        rows.into_iter()
            .map(|r| {
                Ok(FreeFloatingRow {
                    position: Point::new(r.longitude, r.latitude),
                    last_reported: r.last_reported.map(from_epoch).transpose()?,
                    bike_id: r.bike_id,
                    is_reserved: r.is_reserved,
                    is_disabled: r.is_disabled,
                    range_meters: r.range_meters,
                    vehicle_type_id: r.vehicle_type_id,
                    vehicle_type: r.vehicle_type,
                })
            })
            .collect()
    }
}
