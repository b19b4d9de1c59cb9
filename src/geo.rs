//! Point-in-region resolution over administrative boundary polygons.
//!
//! Every containment test in the crate goes through [`point_in_ring`], so
//! geocoding stays numerically consistent wherever it is used.

use std::path::Path;

use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::{info, warn};

use crate::error::{PipelineError, Result};
use crate::slug::{province_id, province_id_from_name};

pub const UNKNOWN_REGION: &str = "unknown";

/// Ordered vertex ring, `[x, y]` per vertex.
pub type Ring = Vec<[f64; 2]>;

#[derive(Debug, Clone, PartialEq)]
pub struct Region {
    pub id: String,
    pub polygons: Vec<Ring>,
}

/// Even-odd ray casting.
///
/// Horizontal edges never refresh the intersection value. Points lying on a
/// vertex or a horizontal edge may land on either side; that imprecision is
/// accepted for administrative boundaries.
pub fn point_in_ring(x: f64, y: f64, ring: &[[f64; 2]]) -> bool {
    let n = ring.len();
    if n == 0 {
        return false;
    }
    let mut inside = false;
    let mut xinters = f64::NAN;
    let [mut p1x, mut p1y] = ring[0];
    for i in 0..=n {
        let [p2x, p2y] = ring[i % n];
        if y > p1y.min(p2y) && y <= p1y.max(p2y) && x <= p1x.max(p2x) {
            if p1y != p2y {
                xinters = (y - p1y) * (p2x - p1x) / (p2y - p1y) + p1x;
            }
            if p1x == p2x || x <= xinters {
                inside = !inside;
            }
        }
        p1x = p2x;
        p1y = p2y;
    }
    inside
}

/// Resolves points to the first containing region. Region order is
/// significant: overlapping boundaries resolve to the earlier region.
#[derive(Debug, Clone, Default)]
pub struct GeometryClassifier {
    regions: Vec<Region>,
}

impl GeometryClassifier {
    pub fn new(regions: Vec<Region>) -> Self {
        GeometryClassifier { regions }
    }

    pub fn from_geojson(json: &str) -> Result<Self> {
        Ok(Self::new(parse_regions(json)?))
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            PipelineError::config(format!("cannot read region boundaries {}: {}", path.display(), e))
        })?;
        Self::from_geojson(&raw)
    }

    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }

    pub fn regions(&self) -> &[Region] {
        &self.regions
    }

    pub fn locate(&self, x: f64, y: f64) -> Option<&str> {
        self.regions
            .iter()
            .find(|r| r.polygons.iter().any(|ring| point_in_ring(x, y, ring)))
            .map(|r| r.id.as_str())
    }

    /// Like [`locate`](Self::locate) but falls back to [`UNKNOWN_REGION`].
    pub fn classify(&self, x: f64, y: f64) -> &str {
        self.locate(x, y).unwrap_or(UNKNOWN_REGION)
    }
}

#[derive(Deserialize)]
struct FeatureCollection {
    #[serde(default)]
    features: Vec<Feature>,
}

#[derive(Deserialize)]
struct Feature {
    #[serde(default)]
    properties: Option<Map<String, Value>>,
    geometry: Option<Geometry>,
}

#[derive(Deserialize)]
#[serde(tag = "type")]
enum Geometry {
    Polygon { coordinates: Vec<Vec<Vec<f64>>> },
    MultiPolygon { coordinates: Vec<Vec<Vec<Vec<f64>>>> },
    #[serde(other)]
    Unsupported,
}

fn parse_regions(json: &str) -> Result<Vec<Region>> {
    let collection: FeatureCollection = serde_json::from_str(json)
        .map_err(|e| PipelineError::config(format!("invalid region boundaries: {}", e)))?;

    let mut regions = Vec::with_capacity(collection.features.len());
    for (idx, feature) in collection.features.into_iter().enumerate() {
        let props = feature.properties.unwrap_or_default();
        let Some(id) = region_id(&props) else {
            warn!(feature = idx, "Skipping boundary feature without a region id");
            continue;
        };
        let polygons = match feature.geometry {
            Some(Geometry::Polygon { coordinates }) => {
                coordinates.into_iter().next().map(to_ring).into_iter().collect()
            }
            Some(Geometry::MultiPolygon { coordinates }) => coordinates
                .into_iter()
                .filter_map(|poly| poly.into_iter().next().map(to_ring))
                .collect(),
            Some(Geometry::Unsupported) | None => {
                warn!(region = %id, "Skipping boundary with unsupported geometry");
                continue;
            }
        };
        regions.push(Region { id, polygons });
    }
    info!("Loaded {} region boundaries", regions.len());
    Ok(regions)
}

fn region_id(props: &Map<String, Value>) -> Option<String> {
    let text = |key: &str| {
        props
            .get(key)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
    };
    if let Some(id) = text("id").or_else(|| text("province_id")) {
        return Some(id.to_string());
    }
    text("shapeName").map(province_id_from_name).map(|id| province_id(&id))
}

fn to_ring(positions: Vec<Vec<f64>>) -> Ring {
    positions
        .into_iter()
        .filter(|p| p.len() >= 2)
        .map(|p| [p[0], p[1]])
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square(x0: f64, y0: f64, size: f64) -> Ring {
        vec![
            [x0, y0],
            [x0 + size, y0],
            [x0 + size, y0 + size],
            [x0, y0 + size],
            [x0, y0],
        ]
    }

    #[test]
    fn interior_and_exterior_points() {
        let ring = square(0.0, 0.0, 10.0);
        assert!(point_in_ring(5.0, 5.0, &ring));
        assert!(point_in_ring(0.5, 9.5, &ring));
        assert!(!point_in_ring(15.0, 5.0, &ring));
        assert!(!point_in_ring(-1.0, 5.0, &ring));
        assert!(!point_in_ring(5.0, 11.0, &ring));
    }

    #[test]
    fn concave_polygon() {
        // U shape opening upwards
        let ring = vec![
            [0.0, 0.0],
            [6.0, 0.0],
            [6.0, 6.0],
            [4.0, 6.0],
            [4.0, 2.0],
            [2.0, 2.0],
            [2.0, 6.0],
            [0.0, 6.0],
        ];
        assert!(point_in_ring(1.0, 4.0, &ring));
        assert!(point_in_ring(5.0, 4.0, &ring));
        assert!(!point_in_ring(3.0, 4.0, &ring));
        assert!(point_in_ring(3.0, 1.0, &ring));
    }

    #[test]
    fn unclosed_ring_is_closed_implicitly() {
        let ring = vec![[0.0, 0.0], [4.0, 0.0], [4.0, 4.0], [0.0, 4.0]];
        assert!(point_in_ring(2.0, 2.0, &ring));
        assert!(!point_in_ring(5.0, 2.0, &ring));
    }

    #[test]
    fn empty_ring_contains_nothing() {
        assert!(!point_in_ring(0.0, 0.0, &[]));
    }

    #[test]
    fn first_region_wins() {
        let classifier = GeometryClassifier::new(vec![
            Region {
                id: "province/a".into(),
                polygons: vec![square(0.0, 0.0, 10.0)],
            },
            Region {
                id: "province/b".into(),
                polygons: vec![square(5.0, 5.0, 10.0)],
            },
        ]);
        assert_eq!(classifier.classify(7.0, 7.0), "province/a");
        assert_eq!(classifier.classify(12.0, 12.0), "province/b");
        assert_eq!(classifier.classify(50.0, 50.0), UNKNOWN_REGION);
        assert_eq!(classifier.locate(50.0, 50.0), None);
    }

    #[test]
    fn geojson_polygon_and_multipolygon() {
        let json = r#"{
          "type": "FeatureCollection",
          "features": [
            {"type": "Feature", "properties": {"id": "province/one"},
             "geometry": {"type": "Polygon",
               "coordinates": [[[0,0],[2,0],[2,2],[0,2],[0,0]], [[0.5,0.5],[1,0.5],[1,1],[0.5,0.5]]]}},
            {"type": "Feature", "properties": {"shapeName": "Province de Taroudant"},
             "geometry": {"type": "MultiPolygon",
               "coordinates": [[[[10,10],[12,10],[12,12],[10,12],[10,10]]],
                               [[[20,20],[22,20],[22,22,5],[20,22],[20,20]]]]}},
            {"type": "Feature", "properties": {"name": "no id"},
             "geometry": {"type": "Polygon", "coordinates": [[[0,0],[1,0],[1,1]]]}},
            {"type": "Feature", "properties": {"id": "province/line"},
             "geometry": {"type": "LineString", "coordinates": [[0,0],[1,1]]}}
          ]
        }"#;
        let classifier = GeometryClassifier::from_geojson(json).unwrap();
        assert_eq!(classifier.regions().len(), 2);
        // holes are ignored
        assert_eq!(classifier.classify(0.75, 0.7), "province/one");
        assert_eq!(classifier.classify(21.0, 21.0), "province/taroudant");
        assert_eq!(classifier.classify(11.0, 11.0), "province/taroudant");
        assert_eq!(classifier.classify(5.0, 5.0), UNKNOWN_REGION);
    }

    #[test]
    fn invalid_geojson_is_a_configuration_error() {
        let err = GeometryClassifier::from_geojson("{not json").unwrap_err();
        assert!(matches!(err, PipelineError::Configuration(_)));
    }
}
