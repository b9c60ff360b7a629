//! Administrative boundaries published by opendata.paris.fr as GeoJSON:
//! districts (`quartier_paris`) and boroughs (`arrondissements`).

use super::{Feed, GeoFeature, GeoFeatureCollection};
use crate::domain::{Boundary, BoundaryShape, DatasetKind};
use serde::Deserialize;
use tracing::warn;

#[derive(Debug, Deserialize)]
pub struct DistrictProperties {
    /// District name, e.g. "Saint-Germain-l'Auxerrois".
    pub l_qu: String,
    /// District code.
    #[serde(default)]
    pub c_qu: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct BoroughProperties {
    /// Short name, e.g. "6ème Ardt".
    pub l_ar: String,
    /// Official label, e.g. "Luxembourg".
    #[serde(default)]
    pub l_aroff: Option<String>,
}

pub struct DistrictsFeed;

impl Feed for DistrictsFeed {
    type Payload = GeoFeatureCollection<DistrictProperties>;
    type Entity = Boundary;

    fn dataset(&self) -> DatasetKind {
        DatasetKind::Districts
    }

    fn normalize(&self, payload: Self::Payload) -> Vec<Boundary> {
        payload
            .features
            .into_iter()
            .filter_map(|f| {
                let GeoFeature { geometry, properties } = f;
                let shape = boundary_shape(geometry, &properties.l_qu)?;
                Some(Boundary {
                    name: properties.l_qu,
                    label: properties.c_qu.unwrap_or_default(),
                    shape,
                })
            })
            .collect()
    }
}

pub struct BoroughsFeed;

impl Feed for BoroughsFeed {
    type Payload = GeoFeatureCollection<BoroughProperties>;
    type Entity = Boundary;

    fn dataset(&self) -> DatasetKind {
        DatasetKind::Boroughs
    }

    fn normalize(&self, payload: Self::Payload) -> Vec<Boundary> {
        payload
            .features
            .into_iter()
            .filter_map(|f| {
                let GeoFeature { geometry, properties } = f;
                let shape = boundary_shape(geometry, &properties.l_ar)?;
                Some(Boundary {
                    name: properties.l_ar.replace("Ardt", "Arrondissement"),
                    label: properties.l_aroff.unwrap_or_default(),
                    shape,
                })
            })
            .collect()
    }
}

/// Features whose geometry is missing or not polygonal are dropped.
fn boundary_shape(geometry: Option<geojson::Geometry>, name: &str) -> Option<BoundaryShape> {
    let Some(geometry) = geometry else {
        warn!(boundary = name, "Boundary without geometry, skipping");
        return None;
    };

    match geo::Geometry::<f64>::try_from(geometry) {
        Ok(geo::Geometry::Polygon(p)) => Some(BoundaryShape::Polygon(p)),
        Ok(geo::Geometry::MultiPolygon(mp)) => Some(BoundaryShape::MultiPolygon(mp)),
        Ok(_) => {
            warn!(boundary = name, "Boundary geometry is not a polygon, skipping");
            None
        }
        Err(e) => {
            warn!(boundary = name, error = %e, "Invalid boundary geometry, skipping");
            None
        }
    }
}
