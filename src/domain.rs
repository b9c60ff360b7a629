//! Internal entity types shared by the ingestion pipeline and the read side.

use chrono::{DateTime, DurationRound, TimeDelta, Utc};
use geo::{Geometry, LineString, Point, Polygon};
use std::fmt;

/// Spatial reference attached to every stored geometry (WGS 84, lon/lat).
pub const SRID: i32 = 4326;

/// The datasets harvested by the pipeline. One task exists per kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DatasetKind {
    Stations,
    Statuses,
    Districts,
    Boroughs,
    Bikeways,
    BikeLanes,
    FreeFloatingBikes,
}

impl DatasetKind {
    pub const ALL: [DatasetKind; 7] = [
        DatasetKind::Stations,
        DatasetKind::Statuses,
        DatasetKind::Districts,
        DatasetKind::Boroughs,
        DatasetKind::Bikeways,
        DatasetKind::BikeLanes,
        DatasetKind::FreeFloatingBikes,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DatasetKind::Stations => "stations",
            DatasetKind::Statuses => "statuses",
            DatasetKind::Districts => "districts",
            DatasetKind::Boroughs => "boroughs",
            DatasetKind::Bikeways => "bikeways",
            DatasetKind::BikeLanes => "bikelanes",
            DatasetKind::FreeFloatingBikes => "free_floating_bikes",
        }
    }
}

impl fmt::Display for DatasetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Granularity used to bucket the fetch time of append-only snapshots.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bucket {
    Minute,
    TenMinutes,
}

impl Bucket {
    fn delta(&self) -> TimeDelta {
        match self {
            Bucket::Minute => TimeDelta::minutes(1),
            Bucket::TenMinutes => TimeDelta::minutes(10),
        }
    }

    /// Rounds `at` down to the start of its bucket.
    pub fn truncate(&self, at: DateTime<Utc>) -> DateTime<Utc> {
        // duration_trunc only fails for deltas larger than the timestamp itself
        at.duration_trunc(self.delta()).unwrap_or(at)
    }
}

/// Static, slow-changing metadata of a docking station.
#[derive(Debug, Clone, PartialEq)]
pub struct StationInformation {
    pub id: i64,
    pub name: String,
    pub capacity: i64,
    pub position: Point<f64>,
}

/// Bikes available at one station, as reported by one ingestion run.
///
/// The timestamp is assigned by the store when the batch is persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Occupancy {
    pub station_id: i64,
    pub mechanical: i64,
    pub electric: i64,
}

/// Which administrative boundary table a polygon belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoundaryKind {
    District,
    Borough,
}

impl BoundaryKind {
    pub fn table(&self) -> &'static str {
        match self {
            BoundaryKind::District => "districts",
            BoundaryKind::Borough => "boroughs",
        }
    }

    pub fn dataset(&self) -> DatasetKind {
        match self {
            BoundaryKind::District => DatasetKind::Districts,
            BoundaryKind::Borough => DatasetKind::Boroughs,
        }
    }
}

/// Polygonal reference geometry: a Paris district (quartier) or borough (arrondissement).
#[derive(Debug, Clone, PartialEq)]
pub struct Boundary {
    pub name: String,
    pub label: String,
    pub shape: BoundaryShape,
}

/// Boundaries are published either as single polygons or as multipolygons.
#[derive(Debug, Clone, PartialEq)]
pub enum BoundaryShape {
    Polygon(Polygon<f64>),
    MultiPolygon(geo::MultiPolygon<f64>),
}

impl BoundaryShape {
    pub fn to_geometry(&self) -> Geometry<f64> {
        match self {
            BoundaryShape::Polygon(p) => Geometry::Polygon(p.clone()),
            BoundaryShape::MultiPolygon(mp) => Geometry::MultiPolygon(mp.clone()),
        }
    }
}

/// One segment of the simplified cycling network.
#[derive(Debug, Clone, PartialEq)]
pub struct Bikeway {
    pub typology: String,
    pub bidirectional: bool,
    pub status: String,
    pub direction: String,
    pub route: String,
    pub path: LineString<f64>,
}

/// One element of the detailed cycling infrastructure dataset.
#[derive(Debug, Clone, PartialEq)]
pub struct BikeLane {
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

/// Position and state of a dockless bike.
#[derive(Debug, Clone, PartialEq)]
pub struct FreeFloatingBike {
    pub bike_id: String,
    pub position: Point<f64>,
    pub is_reserved: bool,
    pub is_disabled: bool,
    pub range_meters: i64,
    pub vehicle_type_id: String,
    pub vehicle_type: String,
    pub last_reported: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_minute_bucket_drops_seconds() {
        let at = Utc.with_ymd_and_hms(2024, 5, 1, 12, 34, 56).unwrap();
        let bucketed = Bucket::Minute.truncate(at);
        assert_eq!(bucketed, Utc.with_ymd_and_hms(2024, 5, 1, 12, 34, 0).unwrap());
    }

    #[test]
    fn test_ten_minute_bucket_rounds_down() {
        let at = Utc.with_ymd_and_hms(2024, 5, 1, 12, 39, 59).unwrap();
        let bucketed = Bucket::TenMinutes.truncate(at);
        assert_eq!(bucketed, Utc.with_ymd_and_hms(2024, 5, 1, 12, 30, 0).unwrap());
    }

    #[test]
    fn test_bucket_is_stable_on_boundary() {
        let at = Utc.with_ymd_and_hms(2024, 5, 1, 12, 40, 0).unwrap();
        assert_eq!(Bucket::TenMinutes.truncate(at), at);
    }

    #[test]
    fn test_dataset_names_are_unique() {
        let mut names: Vec<_> = DatasetKind::ALL.iter().map(|d| d.as_str()).collect();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), DatasetKind::ALL.len());
    }
}
