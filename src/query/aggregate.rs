//! Point-in-polygon aggregation of station occupancy.

use crate::store::{BoundaryRow, StationSnapshot};
use geo::{Contains, Geometry, Point};

/// Occupancy summed over the stations contained in one boundary.
#[derive(Debug, Clone, PartialEq)]
pub struct BoundaryAggregate<'a> {
    pub boundary: &'a BoundaryRow,
    pub station_ids: Vec<i64>,
    pub mechanical: i64,
    pub electric: i64,
}

impl BoundaryAggregate<'_> {
    pub fn bikes(&self) -> i64 {
        self.mechanical + self.electric
    }
}

/// Strict containment: a station exactly on a boundary edge is not inside.
fn contains(shape: &Geometry<f64>, point: &Point<f64>) -> bool {
    match shape {
        Geometry::Polygon(p) => p.contains(point),
        Geometry::MultiPolygon(mp) => mp.contains(point),
        _ => false,
    }
}

/// Aggregates `stations` into each of `boundaries`, in boundary order.
/// Boundaries that contain no station are left out entirely.
pub fn aggregate<'a>(
    boundaries: &'a [BoundaryRow],
    stations: &[StationSnapshot],
) -> Vec<BoundaryAggregate<'a>> {
    boundaries
        .iter()
        .filter_map(|boundary| {
            let inside: Vec<&StationSnapshot> = stations
                .iter()
                .filter(|s| contains(&boundary.shape, &s.position))
                .collect();

            if inside.is_empty() {
                return None;
            }

            Some(BoundaryAggregate {
                boundary,
                station_ids: inside.iter().map(|s| s.id).collect(),
                mechanical: inside.iter().map(|s| s.mechanical).sum(),
                electric: inside.iter().map(|s| s.electric).sum(),
            })
        })
        .collect()
}
