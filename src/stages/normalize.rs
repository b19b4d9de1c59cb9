use std::path::Path;
use std::sync::LazyLock;
use std::time::Instant;

use quick_xml::escape::{resolve_html5_entity, unescape_with};
use regex::Regex;
use tracing::{debug, info};

use super::{take, BagKey, DataBag, Stage, StageName};
use crate::error::Result;
use crate::metrics::RunTracker;
use crate::model::{Coordinates, NormalizedPlace, RawPlacemark};
use crate::parser;

static TAG_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]+>").unwrap());
static SPACE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());
// "Toubkal (4167m)" or "Toubkal - 4167m" / "Toubkal – 4167 m"
static ALTITUDE_RES: LazyLock<[Regex; 2]> = LazyLock::new(|| {
    [
        Regex::new(r"(?i)\(\s*(\d+)\s*m\s*\)").unwrap(),
        Regex::new(r"(?i)[-–]\s*(\d+)\s*m\b").unwrap(),
    ]
});

const NAME_MARKERS: &[char] = &['⭐', '👑'];

pub struct NormalizeStage;

impl Stage for NormalizeStage {
    fn name(&self) -> StageName {
        StageName::Normalize
    }

    fn requires(&self) -> &'static [BagKey] {
        &[BagKey::Placemarks]
    }

    fn produces(&self) -> &'static [BagKey] {
        &[BagKey::NormalizedPlaces]
    }

    fn run(&mut self, mut bag: DataBag, tracker: &mut RunTracker) -> Result<DataBag> {
        let t0 = Instant::now();
        let placemarks = take(&mut bag.placemarks, BagKey::Placemarks)?;
        let source = bag.source_file.as_deref();
        let n_in = placemarks.len();

        let normalized: Vec<NormalizedPlace> = placemarks
            .into_iter()
            .map(|p| normalize_placemark(p, source))
            .collect();
        info!(stage = "normalize", "Normalized {} places", normalized.len());

        tracker.record("normalize", n_in, normalized.len(), t0.elapsed());
        bag.normalized_places = Some(normalized);
        Ok(bag)
    }
}

pub fn normalize_placemark(raw: RawPlacemark, source: Option<&Path>) -> NormalizedPlace {
    let mut name = clean_text(raw.name.as_deref().unwrap_or(""));
    let mined = parser::mine(&raw.description);
    let mut coordinates = raw.point.map(Coordinates::rounded);

    let summit = is_mountain_context(raw.group.as_deref(), source);
    let mut summit_altitude = None;
    if summit {
        let (stripped, altitude) = split_altitude(&name);
        name = stripped;
        if let (Some(alt), Some(coords)) = (altitude, coordinates.as_mut()) {
            coords.altitude = Some(alt);
        }
        summit_altitude = altitude;
    }

    debug!(
        stage = "normalize",
        place = %name,
        links = mined.links.len(),
        fields = mined.fields.len(),
        "Normalized placemark"
    );

    NormalizedPlace {
        name,
        description: mined.description,
        links: mined.links,
        fields: mined.fields,
        coordinates,
        group: raw.group,
        extended: raw.extended,
        summit,
        summit_altitude,
    }
}

/// Decode entities, drop markup and star markers, collapse whitespace.
pub fn clean_text(text: &str) -> String {
    let decoded = unescape_with(text, resolve_html5_entity)
        .map(|c| c.into_owned())
        .unwrap_or_else(|_| text.to_string());
    let stripped = TAG_RE.replace_all(&decoded, "");
    let unmarked = stripped.replace(NAME_MARKERS, "");
    SPACE_RE.replace_all(unmarked.trim(), " ").to_string()
}

fn is_mountain_context(group: Option<&str>, source: Option<&Path>) -> bool {
    let in_group = group.is_some_and(|g| g.to_lowercase().contains("mountain"));
    let in_file = source
        .and_then(|p| p.file_name())
        .is_some_and(|f| f.to_string_lossy().to_lowercase().contains("mountain"));
    in_group || in_file
}

/// Remove an altitude suffix from a summit name and return it in metres.
pub fn split_altitude(name: &str) -> (String, Option<f64>) {
    for re in ALTITUDE_RES.iter() {
        if let Some(caps) = re.captures(name) {
            let altitude = caps[1].parse::<f64>().ok();
            let stripped = re.replace(name, "");
            let cleaned = stripped.trim().trim_matches([' ', '-', '–', '(', ')']).trim();
            return (cleaned.to_string(), altitude);
        }
    }
    (name.to_string(), None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Point, NO_DESCRIPTION};

    fn raw(name: &str, group: Option<&str>, point: Option<Point>) -> RawPlacemark {
        RawPlacemark {
            name: Some(name.into()),
            description: String::new(),
            group: group.map(String::from),
            point,
            extended: Default::default(),
        }
    }

    #[test]
    fn clean_names() {
        assert_eq!(clean_text("  Café <b>Clock</b>  ⭐ "), "Café Clock");
        assert_eq!(clean_text("Tom &amp; Jerry's  Place"), "Tom & Jerry's Place");
    }

    #[test]
    fn html_entities_in_names() {
        assert_eq!(clean_text("Caf&eacute;&nbsp;Clock &amp; Bar"), "Café Clock & Bar");
        assert_eq!(clean_text("Riad&nbsp;Yasmine &#8211; Medina"), "Riad Yasmine – Medina");
        assert_eq!(crate::slug::slugify(&clean_text("Caf&eacute; Clock")), "cafe-clock");
    }

    #[test]
    fn altitude_suffixes() {
        assert_eq!(split_altitude("Toubkal - 4167m"), ("Toubkal".into(), Some(4167.0)));
        assert_eq!(split_altitude("Toubkal (4167m)"), ("Toubkal".into(), Some(4167.0)));
        assert_eq!(split_altitude("Ouanoukrim – 4089 m"), ("Ouanoukrim".into(), Some(4089.0)));
        assert_eq!(split_altitude("Jbel Saghro"), ("Jbel Saghro".into(), None));
    }

    #[test]
    fn mountain_group_extracts_altitude() {
        let point = Point {
            longitude: -7.9158,
            latitude: 31.0597,
            altitude: Some(0.0),
        };
        let place = normalize_placemark(raw("Toubkal - 4167m", Some("High Atlas Mountains"), Some(point)), None);
        assert!(place.summit);
        assert_eq!(place.name, "Toubkal");
        assert_eq!(place.coordinates.unwrap().altitude, Some(4167.0));
        assert_eq!(place.description, NO_DESCRIPTION);
    }

    #[test]
    fn mountain_file_name_counts_as_context() {
        let place = normalize_placemark(
            raw("Toubkal - 4167m", Some("High Atlas"), None),
            Some(Path::new("/tmp/mountains.kml")),
        );
        assert!(place.summit);
        assert_eq!(place.name, "Toubkal");
        assert!(place.coordinates.is_none());
        assert_eq!(place.summit_altitude, Some(4167.0));
    }

    #[test]
    fn other_groups_keep_names_intact() {
        let place = normalize_placemark(raw("Route - 12m", Some("Squares & Parks"), None), None);
        assert!(!place.summit);
        assert_eq!(place.name, "Route - 12m");
    }

    #[test]
    fn coordinates_are_rounded() {
        let point = Point {
            longitude: -7.98912345678,
            latitude: 31.62954321,
            altitude: Some(455.123),
        };
        let place = normalize_placemark(raw("Koutoubia", None, Some(point)), None);
        let c = place.coordinates.unwrap();
        assert_eq!((c.longitude, c.latitude, c.altitude), (-7.989123, 31.629543, Some(455.12)));
    }
}
