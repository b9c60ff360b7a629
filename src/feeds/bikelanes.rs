//! Detailed cycling infrastructure (`amenagements-cyclables`).

use super::{Feed, GeoFeatureCollection, is_affirmative};
use crate::domain::{BikeLane, DatasetKind};
use serde::Deserialize;
use tracing::warn;

#[derive(Debug, Deserialize)]
pub struct BikeLaneProperties {
    #[serde(default)]
    pub osm_id: i64,
    pub nom: Option<String>,
    pub amenagement: Option<String>,
    pub cote_amenagement: Option<String>,
    pub sens: Option<String>,
    pub surface: Option<String>,
    pub arrondissement: Option<String>,
    pub bois: Option<String>,
    pub coronapiste: Option<String>,
    pub amenagement_temporaire: Option<String>,
    pub infrastructure_bidirection: Option<String>,
    pub voie_a_sens_unique: Option<String>,
    pub position_amenagement: Option<String>,
    pub vitesse_maximale_autorisee: Option<String>,
}

pub struct BikeLanesFeed;

impl Feed for BikeLanesFeed {
    type Payload = GeoFeatureCollection<BikeLaneProperties>;
    type Entity = BikeLane;

    fn dataset(&self) -> DatasetKind {
        DatasetKind::BikeLanes
    }

    fn normalize(&self, payload: Self::Payload) -> Vec<BikeLane> {
        payload
            .features
            .into_iter()
            .filter_map(|f| {
                let p = f.properties;
                let shape = match f.geometry.map(geo::Geometry::<f64>::try_from) {
                    Some(Ok(shape)) => shape,
                    Some(Err(e)) => {
                        warn!(
                            osm_id = p.osm_id,
                            error = %e,
                            "Invalid bike lane geometry, skipping"
                        );
                        return None;
                    }
                    None => return None,
                };

                Some(BikeLane {
                    osm_id: p.osm_id,
                    forest: is_affirmative(p.bois.as_deref()),
                    coronapiste: is_affirmative(p.coronapiste.as_deref()),
                    temporary: is_affirmative(p.amenagement_temporaire.as_deref()),
                    bidirectional: is_affirmative(p.infrastructure_bidirection.as_deref()),
                    one_way_street: is_affirmative(p.voie_a_sens_unique.as_deref()),
                    name: p.nom.unwrap_or_default(),
                    layout: p.amenagement.unwrap_or_default(),
                    layout_side: p.cote_amenagement.unwrap_or_default(),
                    direction: p.sens.unwrap_or_default(),
                    surface: p.surface.unwrap_or_default(),
                    borough: p.arrondissement.unwrap_or_default(),
                    position: p.position_amenagement.unwrap_or_default(),
                    speed_limit: p.vitesse_maximale_autorisee.unwrap_or_default(),
                    shape,
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags_are_normalized() {
        let payload = serde_json::from_str(
            r#"{"type": "FeatureCollection", "features": [{
                "type": "Feature",
                "geometry": {
                    "type": "MultiLineString",
                    "coordinates": [[[2.3, 48.8], [2.4, 48.9]]]
                },
                "properties": {
                    "osm_id": 4242, "nom": "Boulevard de Sébastopol",
                    "amenagement": "Piste cyclable",
                    "bois": "Non", "coronapiste": "OUI", "amenagement_temporaire": "",
                    "infrastructure_bidirection": "oui", "voie_a_sens_unique": null,
                    "vitesse_maximale_autorisee": "30"
                }
            }]}"#,
        )
        .unwrap();

        let lanes = BikeLanesFeed.normalize(payload);
        assert_eq!(lanes.len(), 1);
        let lane = &lanes[0];
        assert_eq!(lane.osm_id, 4242);
        assert!(!lane.forest);
        assert!(lane.coronapiste);
        assert!(!lane.temporary);
        assert!(lane.bidirectional);
        assert!(!lane.one_way_street);
        assert_eq!(lane.speed_limit, "30");
        assert!(matches!(lane.shape, geo::Geometry::MultiLineString(_)));
    }
}
