//! Simplified cycling network (`reseau-cyclable`).

use super::{Feed, GeoFeatureCollection, is_affirmative};
use crate::domain::{Bikeway, DatasetKind};
use serde::Deserialize;
use tracing::warn;

#[derive(Debug, Deserialize)]
pub struct BikewayProperties {
    pub typologie_simple: Option<String>,
    pub bidirectionnel: Option<String>,
    pub statut: Option<String>,
    pub sens_velo: Option<String>,
    pub voie: Option<String>,
}

pub struct BikewaysFeed;

impl Feed for BikewaysFeed {
    type Payload = GeoFeatureCollection<BikewayProperties>;
    type Entity = Bikeway;

    fn dataset(&self) -> DatasetKind {
        DatasetKind::Bikeways
    }

    fn normalize(&self, payload: Self::Payload) -> Vec<Bikeway> {
        let total = payload.features.len();
        let bikeways: Vec<_> = payload
            .features
            .into_iter()
            .filter_map(|f| {
                let path = match geo::Geometry::<f64>::try_from(f.geometry?) {
                    Ok(geo::Geometry::LineString(line)) => line,
                    _ => return None,
                };
                let p = f.properties;
                Some(Bikeway {
                    typology: p.typologie_simple.unwrap_or_default(),
                    bidirectional: is_affirmative(p.bidirectionnel.as_deref()),
                    status: p.statut.unwrap_or_default(),
                    direction: p.sens_velo.unwrap_or_default(),
                    route: p.voie.unwrap_or_default(),
                    path,
                })
            })
            .collect();

        if bikeways.len() < total {
            warn!(
                skipped = total - bikeways.len(),
                total, "Bikeway features without a linestring geometry were skipped"
            );
        }
        bikeways
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bikeway_normalization() {
        let payload = serde_json::from_str(
            r#"{"type": "FeatureCollection", "features": [{
                "type": "Feature",
                "geometry": {"type": "LineString", "coordinates": [[2.35, 48.85], [2.36, 48.86]]},
                "properties": {
                    "typologie_simple": "Pistes cyclables", "bidirectionnel": "Oui",
                    "statut": "Zone 30", "sens_velo": "Double", "voie": "Rue de Rivoli"
                }
            }, {
                "type": "Feature",
                "geometry": {"type": "LineString", "coordinates": [[2.30, 48.80], [2.31, 48.81]]},
                "properties": {"typologie_simple": "Bandes cyclables", "bidirectionnel": null}
            }]}"#,
        )
        .unwrap();

        let ways = BikewaysFeed.normalize(payload);
        assert_eq!(ways.len(), 2);
        assert!(ways[0].bidirectional);
        assert_eq!(ways[0].route, "Rue de Rivoli");
        assert_eq!(ways[0].path.0[0].x, 2.35);
        assert_eq!(ways[0].path.0[0].y, 48.85);
        assert!(!ways[1].bidirectional);
        assert_eq!(ways[1].status, "");
    }

    #[test]
    fn test_non_linestring_features_are_skipped() {
        let payload = serde_json::from_str(
            r#"{"type": "FeatureCollection", "features": [{
                "type": "Feature",
                "geometry": {"type": "Point", "coordinates": [2.35, 48.85]},
                "properties": {"typologie_simple": "Autre"}
            }]}"#,
        )
        .unwrap();

        assert!(BikewaysFeed.normalize(payload).is_empty());
    }
}
