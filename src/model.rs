use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

pub const NO_DESCRIPTION: &str = "No description available";

/// A placemark as it appears in the source markup, before any cleanup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawPlacemark {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default)]
    pub description: String,
    /// Innermost enclosing folder name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub point: Option<Point>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extended: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub longitude: f64,
    pub latitude: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub altitude: Option<f64>,
}

/// Rounded coordinates. Longitude and latitude always carry their
/// geographic meaning inside the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub longitude: f64,
    pub latitude: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub altitude: Option<f64>,
}

impl Coordinates {
    pub fn rounded(point: Point) -> Self {
        Coordinates {
            longitude: round_to(point.longitude, 6),
            latitude: round_to(point.latitude, 6),
            altitude: point.altitude.map(|a| round_to(a, 2)),
        }
    }
}

pub fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkType {
    Video,
    Social,
    Image,
    Map,
    Article,
    Book,
    Movie,
    Website,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Link {
    pub url: String,
    pub title: String,
    #[serde(rename = "type")]
    pub link_type: LinkType,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedPlace {
    pub name: String,
    pub description: String,
    #[serde(default)]
    pub links: Vec<Link>,
    #[serde(default)]
    pub fields: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub coordinates: Option<Coordinates>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extended: BTreeMap<String, String>,
    /// Set for placemarks coming from a mountain grouping context.
    #[serde(default)]
    pub summit: bool,
    /// Altitude taken from a summit name, kept even when there is no point.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summit_altitude: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrichedPlace {
    #[serde(flatten)]
    pub place: NormalizedPlace,
    pub id: String,
    pub kind: String,
    pub province: String,
    #[serde(rename = "timePeriods")]
    pub time_periods: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationFinding {
    pub place: String,
    pub messages: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalPlace {
    pub kind: String,
    pub spec: PlaceSpec,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaceSpec {
    pub name: String,
    pub id: String,
    pub description: String,
    pub location: Location,
    pub access: Access,
    pub time_periods: Vec<String>,
    pub people: Vec<serde_json::Value>,
    pub timeline: Vec<serde_json::Value>,
    pub links: Vec<Link>,
    pub activities: Vec<serde_json::Value>,
    pub items: Vec<serde_json::Value>,
    pub comments: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub province: String,
    pub longitude: Option<f64>,
    pub latitude: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub altitude: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Access {
    #[serde(rename = "type")]
    pub access_type: String,
    pub status: String,
    pub options: Vec<String>,
}

impl Default for Access {
    fn default() -> Self {
        Access {
            access_type: "public".into(),
            status: "open".into(),
            options: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rounding_is_idempotent() {
        let p = Point {
            longitude: -7.98912345678,
            latitude: 31.62954321987,
            altitude: Some(4167.4567),
        };
        let once = Coordinates::rounded(p);
        let twice = Coordinates::rounded(Point {
            longitude: once.longitude,
            latitude: once.latitude,
            altitude: once.altitude,
        });
        assert_eq!(once, twice);
        assert_eq!(once.longitude, -7.989123);
        assert_eq!(once.latitude, 31.629543);
        assert_eq!(once.altitude, Some(4167.46));
    }

    #[test]
    fn link_type_serializes_lowercase() {
        let link = Link {
            url: "https://youtube.com/x".into(),
            title: "Tour".into(),
            link_type: LinkType::Video,
        };
        let json = serde_json::to_value(&link).unwrap();
        assert_eq!(json["type"], "video");
    }

    #[test]
    fn enriched_place_flattens_normalized_fields() {
        let place = EnrichedPlace {
            place: NormalizedPlace {
                name: "Bahia Palace".into(),
                description: NO_DESCRIPTION.into(),
                links: vec![],
                fields: BTreeMap::new(),
                coordinates: None,
                group: None,
                extended: BTreeMap::new(),
                summit: false,
                summit_altitude: None,
            },
            id: "bahia-palace".into(),
            kind: "history/palace".into(),
            province: "province/marrakech".into(),
            time_periods: vec![],
        };
        let json = serde_json::to_value(&place).unwrap();
        assert_eq!(json["name"], "Bahia Palace");
        assert_eq!(json["timePeriods"], serde_json::json!([]));
        let back: EnrichedPlace = serde_json::from_value(json).unwrap();
        assert_eq!(back, place);
    }
}
