use crate::core::BoundarySource;
use crate::domain::model::{AdministrativeRegion, RegionSet};
use crate::utils::error::{EtlError, Result};
use geo::{ChamberlainDuquetteArea, LineString, MultiPolygon, Polygon};
use serde_json::Value;
use std::path::PathBuf;

/// Administrative boundaries from a GeoJSON FeatureCollection in WGS84.
#[derive(Debug, Clone)]
pub struct GeoJsonBoundaries {
    path: PathBuf,
}

impl GeoJsonBoundaries {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl BoundarySource for GeoJsonBoundaries {
    fn load_regions(&self, id_fields: &[String]) -> Result<RegionSet> {
        let bytes = std::fs::read(&self.path)?;
        let document: Value = serde_json::from_slice(&bytes)?;
        regions_from_geojson(&document, id_fields)
    }
}

/// Builds the region set, keyed by the first candidate field that any
/// feature carries. Every feature must then have a value for that field.
pub fn regions_from_geojson(document: &Value, id_fields: &[String]) -> Result<RegionSet> {
    let features = document
        .get("features")
        .and_then(Value::as_array)
        .ok_or_else(|| EtlError::BoundaryError {
            message: "expected a FeatureCollection with a 'features' array".to_string(),
        })?;

    if let Some(crs) = document.pointer("/crs/properties/name").and_then(Value::as_str) {
        if !(crs.contains("CRS84") || crs.ends_with("4326")) {
            tracing::warn!("⚠️ Boundary CRS '{}' is treated as WGS84 longitude/latitude", crs);
        }
    }

    let id_field = id_fields
        .iter()
        .find(|field| {
            features
                .iter()
                .any(|f| f.get("properties").and_then(|p| p.get(field.as_str())).is_some())
        })
        .ok_or_else(|| EtlError::MissingRegionIdentifier {
            candidates: id_fields.to_vec(),
        })?;

    let mut regions = Vec::with_capacity(features.len());
    for (index, feature) in features.iter().enumerate() {
        let properties = feature
            .get("properties")
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_default();

        let id = match properties.get(id_field.as_str()) {
            Some(Value::String(s)) if !s.trim().is_empty() => s.clone(),
            Some(Value::Number(n)) => n.to_string(),
            _ => {
                return Err(EtlError::MissingRegionIdValue {
                    index,
                    field: id_field.clone(),
                })
            }
        };

        let shape = parse_geometry(feature.get("geometry").unwrap_or(&Value::Null))
            .map_err(|message| EtlError::BoundaryError {
                message: format!("feature '{}': {}", id, message),
            })?;

        regions.push(AdministrativeRegion {
            area_km2: shape.chamberlain_duquette_unsigned_area() / 1_000_000.0,
            id,
            geometry: shape,
            properties,
        });
    }

    RegionSet::new(id_field.clone(), regions)
}

fn parse_geometry(value: &Value) -> std::result::Result<MultiPolygon<f64>, String> {
    if value.is_null() {
        return Ok(MultiPolygon::new(vec![]));
    }

    let kind = value.get("type").and_then(Value::as_str).unwrap_or_default();
    let coordinates = value.get("coordinates").cloned().unwrap_or(Value::Null);

    match kind {
        "Polygon" => {
            let rings: Vec<Vec<Vec<f64>>> =
                serde_json::from_value(coordinates).map_err(|e| e.to_string())?;
            Ok(MultiPolygon::new(vec![to_polygon(rings)?]))
        }
        "MultiPolygon" => {
            let polygons: Vec<Vec<Vec<Vec<f64>>>> =
                serde_json::from_value(coordinates).map_err(|e| e.to_string())?;
            polygons
                .into_iter()
                .map(to_polygon)
                .collect::<std::result::Result<Vec<_>, _>>()
                .map(MultiPolygon::new)
        }
        other => Err(format!("unsupported geometry type '{}'", other)),
    }
}

/// Exterior ring first, holes after; elevation and extra ordinates dropped.
fn to_polygon(rings: Vec<Vec<Vec<f64>>>) -> std::result::Result<Polygon<f64>, String> {
    let mut rings = rings.into_iter().map(|ring| {
        ring.into_iter()
            .map(|position| match position.as_slice() {
                [x, y, ..] => Ok((*x, *y)),
                _ => Err("position with fewer than two coordinates".to_string()),
            })
            .collect::<std::result::Result<Vec<_>, String>>()
            .map(LineString::from)
    });
    let exterior = rings
        .next()
        .transpose()?
        .ok_or_else(|| "polygon without rings".to_string())?;
    let interiors = rings.collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(Polygon::new(exterior, interiors))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn candidates() -> Vec<String> {
        ["ADM3_PCODE", "adm3_pcode", "ADM2_PCODE", "ADM3_EN", "adm3_en"]
            .iter()
            .map(|s| s.to_string())
            .collect()
    }

    fn feature(properties: Value) -> Value {
        json!({
            "type": "Feature",
            "properties": properties,
            "geometry": {
                "type": "Polygon",
                "coordinates": [[[44.0, 15.0], [44.1, 15.0], [44.1, 15.1], [44.0, 15.1], [44.0, 15.0]]]
            }
        })
    }

    #[test]
    fn test_first_present_candidate_wins() {
        let doc = json!({
            "type": "FeatureCollection",
            "features": [
                feature(json!({ "ADM3_EN": "Sanaa", "ADM2_PCODE": "YE13" })),
                feature(json!({ "ADM3_EN": "Aden", "ADM2_PCODE": "YE24" })),
            ]
        });
        let regions = regions_from_geojson(&doc, &candidates()).unwrap();
        assert_eq!(regions.id_field(), "ADM2_PCODE");
        let ids: Vec<&str> = regions.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["YE13", "YE24"]);
        assert!(regions.get(0).unwrap().area_km2 > 100.0);
    }

    #[test]
    fn test_no_candidate_field_is_fatal() {
        let doc = json!({
            "type": "FeatureCollection",
            "features": [feature(json!({ "name": "Sanaa" }))]
        });
        let err = regions_from_geojson(&doc, &candidates()).unwrap_err();
        assert!(matches!(err, EtlError::MissingRegionIdentifier { .. }));
    }

    #[test]
    fn test_feature_without_id_value_is_fatal() {
        let doc = json!({
            "type": "FeatureCollection",
            "features": [
                feature(json!({ "ADM3_PCODE": "YE1301" })),
                feature(json!({ "ADM3_PCODE": null })),
            ]
        });
        let err = regions_from_geojson(&doc, &candidates()).unwrap_err();
        assert!(matches!(err, EtlError::MissingRegionIdValue { index: 1, .. }));
    }

    #[test]
    fn test_numeric_ids_and_multipolygons() {
        let doc = json!({
            "type": "FeatureCollection",
            "features": [{
                "type": "Feature",
                "properties": { "adm3_en": 7 },
                "geometry": {
                    "type": "MultiPolygon",
                    "coordinates": [
                        [[[0.0, 0.0, 12.0], [1.0, 0.0, 12.0], [1.0, 1.0, 12.0], [0.0, 0.0, 12.0]]],
                        [[[2.0, 2.0], [3.0, 2.0], [3.0, 3.0], [2.0, 2.0]]]
                    ]
                }
            }, {
                "type": "Feature",
                "properties": { "adm3_en": 8 },
                "geometry": null
            }]
        });
        let regions = regions_from_geojson(&doc, &candidates()).unwrap();
        let first = regions.get(0).unwrap();
        assert_eq!(first.id, "7");
        assert_eq!(first.geometry.0.len(), 2);
        assert_eq!(regions.get(1).unwrap().area_km2, 0.0);
    }

    #[test]
    fn test_area_subtracts_holes() {
        let square = |holes: Value| {
            json!({
                "type": "FeatureCollection",
                "features": [{
                    "type": "Feature",
                    "properties": { "ADM3_PCODE": "YE1301" },
                    "geometry": {
                        "type": "Polygon",
                        "coordinates": holes
                    }
                }]
            })
        };
        let outer = json!([[0.0, 0.0], [1.0, 0.0], [1.0, 1.0], [0.0, 1.0], [0.0, 0.0]]);
        let hole = json!([[0.25, 0.25], [0.75, 0.25], [0.75, 0.75], [0.25, 0.75], [0.25, 0.25]]);

        let solid = regions_from_geojson(&square(json!([outer])), &candidates()).unwrap();
        let holed = regions_from_geojson(&square(json!([outer, hole])), &candidates()).unwrap();
        let solid_km2 = solid.get(0).unwrap().area_km2;
        let holed_km2 = holed.get(0).unwrap().area_km2;

        // one degree square at the equator
        assert!(solid_km2 > 12_000.0 && solid_km2 < 12_500.0, "{}", solid_km2);
        assert!((holed_km2 / solid_km2 - 0.75).abs() < 0.01);
        assert_eq!(holed.get(0).unwrap().geometry.0[0].interiors().len(), 1);
    }

    #[test]
    fn test_rejects_non_polygon_geometry() {
        let doc = json!({
            "type": "FeatureCollection",
            "features": [{
                "type": "Feature",
                "properties": { "ADM3_PCODE": "YE1301" },
                "geometry": { "type": "Point", "coordinates": [44.0, 15.0] }
            }]
        });
        assert!(matches!(
            regions_from_geojson(&doc, &candidates()),
            Err(EtlError::BoundaryError { .. })
        ));
    }
}
