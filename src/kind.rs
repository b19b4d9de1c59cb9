//! Place category inference.
//!
//! Two strategies share the [`KindClassifier`] trait: an exact-match table
//! (usually loaded from a mapping file) and a rule-based heuristic over the
//! grouping folder and the place name. Rules are plain data handed in at
//! construction so tests can run against their own fixtures.

use std::collections::HashMap;
use std::path::Path;

use serde::Deserialize;

use crate::error::{PipelineError, Result};

pub const DEFAULT_KIND: &str = "urban/landmark";

/// What a classifier gets to look at.
#[derive(Debug, Clone, Copy)]
pub struct PlaceRef<'a> {
    pub id: &'a str,
    pub name: &'a str,
    pub group: Option<&'a str>,
}

pub trait KindClassifier: Send + Sync {
    fn classify(&self, place: &PlaceRef<'_>) -> String;
}

/// Exact lookup: id first, then name, then the default kind.
#[derive(Debug, Clone)]
pub struct TableClassifier {
    table: HashMap<String, String>,
    default_kind: String,
}

impl TableClassifier {
    pub fn new(table: HashMap<String, String>) -> Self {
        TableClassifier {
            table,
            default_kind: DEFAULT_KIND.to_string(),
        }
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            PipelineError::config(format!("cannot read kind mappings {}: {}", path.display(), e))
        })?;
        let table: HashMap<String, String> = serde_json::from_str(&raw).map_err(|e| {
            PipelineError::config(format!("invalid kind mappings {}: {}", path.display(), e))
        })?;
        Ok(Self::new(table))
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }
}

impl KindClassifier for TableClassifier {
    fn classify(&self, place: &PlaceRef<'_>) -> String {
        self.table
            .get(place.id)
            .or_else(|| self.table.get(place.name))
            .cloned()
            .unwrap_or_else(|| self.default_kind.clone())
    }
}

/// A group-specific refinement: inside `group`, a name containing any of
/// `contains` becomes `kind`.
#[derive(Debug, Clone, Deserialize)]
pub struct GroupRefinement {
    pub group: String,
    pub contains: Vec<String>,
    pub kind: String,
}

/// Keyword rule over the lowercased name.
#[derive(Debug, Clone, Deserialize)]
pub struct KeywordRule {
    pub keywords: Vec<String>,
    pub kind: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct KindRules {
    #[serde(default)]
    pub name_overrides: HashMap<String, String>,
    #[serde(default)]
    pub groups: HashMap<String, String>,
    #[serde(default)]
    pub refinements: Vec<GroupRefinement>,
    #[serde(default)]
    pub keywords: Vec<KeywordRule>,
    #[serde(default = "default_kind")]
    pub default_kind: String,
}

fn default_kind() -> String {
    DEFAULT_KIND.to_string()
}

fn pairs(items: &[(&str, &str)]) -> HashMap<String, String> {
    items
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

fn rule(keywords: &[&str], kind: &str) -> KeywordRule {
    KeywordRule {
        keywords: keywords.iter().map(|k| k.to_string()).collect(),
        kind: kind.to_string(),
    }
}

impl KindRules {
    /// The catalog's own folder names and keyword list.
    pub fn builtin() -> Self {
        let groups = pairs(&[
            ("Cafés and Restaurants", "food/restaurant"),
            ("Mosques & Zaouias", "religion/mosque"),
            ("Museums & Civil architecture", "culture/museum"),
            ("Nature & Hiking", "nature/park"),
            ("Squares & Parks", "urban/square"),
            ("Churches and Synagogues", "religion/church"),
            ("Economy and lifestyle", "shopping/market"),
            ("Historical Landmarks", "history/historic-site"),
            ("Lakes", "nature/lake"),
            ("Rivers", "nature/river"),
            ("Dams", "nature/dam"),
            ("Beaches", "nature/beach"),
            ("Waterfalls", "nature/waterfall"),
            ("Mountains", "nature/mountain"),
        ]);

        let name_overrides = pairs(&[
            ("Ain Asserdoun Park", "nature/park"),
            ("Ajoujar Waterfalls", "nature/water-source"),
            ("Almoravid Minaret", "history/monument"),
            ("Babouch (Moroccan Snails)", "food/street-food"),
            ("Black Sultane's Castle", "history/kasbah"),
            ("Castle of Béni Mellal", "history/kasbah"),
            ("Cultural Heritage Interpretation Center", "culture/museum"),
            ("Fechtala Historical City", "history/historic-site"),
            ("Great Kasbah Mosque", "religion/mosque"),
            ("Jewish Cemetery", "religion/jewish-site"),
            ("Mouaalaja Sandwishes", "food/street-food"),
            ("Mount Tassemi", "nature/mountain"),
            ("Municipal Garden", "nature/park"),
            ("Spring of Coffee", "food/cafe"),
            ("The Great Mosque", "religion/mosque"),
        ]);

        let refinements = vec![
            GroupRefinement {
                group: "Mosques & Zaouias".into(),
                contains: vec!["Zaouiya".into(), "Zaouia".into()],
                kind: "religion/zaouiya".into(),
            },
            GroupRefinement {
                group: "Mosques & Zaouias".into(),
                contains: vec!["Mausoleum".into()],
                kind: "religion/mausoleum".into(),
            },
            GroupRefinement {
                group: "Churches and Synagogues".into(),
                contains: vec!["Synagogue".into()],
                kind: "religion/synagogue".into(),
            },
        ];

        let keywords = vec![
            rule(&["ksar"], "architecture/ksar"),
            rule(&["kasbah"], "architecture/kasbah"),
            rule(&["mosque"], "religion/mosque"),
            rule(&["synagogue"], "religion/synagogue"),
            rule(&["church", "cathedral"], "religion/church"),
            rule(&["museum"], "culture/museum"),
            rule(&["gallery"], "culture/art-gallery"),
            rule(&["park", "garden"], "nature/park"),
            rule(&["forest"], "nature/forest"),
            rule(&["square", "place "], "urban/square"),
            rule(&["market", "souk"], "shopping/market"),
            rule(&["mall"], "shopping/mall"),
            rule(&["school", "college", "lycee"], "architecture/school"),
            rule(&["hotel"], "architecture/hotel"),
            rule(&["restaurant"], "food/restaurant"),
            rule(&["cafe", "café"], "food/cafe"),
            rule(&["bakery", "boulangerie", "patisserie"], "food/bakery"),
            rule(&["pharmacy"], "architecture/pharmacy"),
            rule(&["hospital", "clinique"], "architecture/hospital"),
            rule(&["cinema"], "entertainment/cinema"),
            rule(&["theatre"], "entertainment/theatre"),
            rule(&["gate", "bab "], "history/gate"),
            rule(&["bastion", "borj", "tower", "fort"], "history/bastion"),
            rule(&["tannery"], "culture/tannery"),
            rule(&["mausoleum"], "religion/mausoleum"),
            rule(&["zaouiya", "zaouia"], "religion/zaouiya"),
            rule(&["hammam"], "leisure/hammam"),
            rule(&["fountain"], "urban/fountain"),
            rule(&["viewpoint"], "urban/viewpoint"),
            rule(&["gorge"], "nature/canyon"),
            rule(&["source", "ain ", " ain"], "nature/water-source"),
            rule(&["dam"], "nature/dam"),
            rule(&["lake"], "nature/lake"),
            rule(&["river", "oued"], "nature/river"),
            rule(&["beach", "plage"], "nature/beach"),
            rule(&["waterfall", "cascade"], "nature/waterfall"),
        ];

        KindRules {
            name_overrides,
            groups,
            refinements,
            keywords,
            default_kind: default_kind(),
        }
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            PipelineError::config(format!("cannot read kind rules {}: {}", path.display(), e))
        })?;
        serde_json::from_str(&raw).map_err(|e| {
            PipelineError::config(format!("invalid kind rules {}: {}", path.display(), e))
        })
    }
}

/// Name override, then grouping context (refined by name), then the first
/// keyword rule matching the lowercased name, then the default kind.
#[derive(Debug, Clone)]
pub struct HeuristicClassifier {
    rules: KindRules,
}

impl HeuristicClassifier {
    pub fn new(rules: KindRules) -> Self {
        HeuristicClassifier { rules }
    }
}

impl KindClassifier for HeuristicClassifier {
    fn classify(&self, place: &PlaceRef<'_>) -> String {
        let name = place.name.replace(['⭐', '👑'], "");
        let name = name.trim();
        let rules = &self.rules;

        if let Some(kind) = rules.name_overrides.get(name) {
            return kind.clone();
        }

        if let Some(group) = place.group {
            if let Some(kind) = rules.groups.get(group) {
                let refined = rules.refinements.iter().find(|r| {
                    r.group == group && r.contains.iter().any(|c| name.contains(c.as_str()))
                });
                return refined.map(|r| r.kind.clone()).unwrap_or_else(|| kind.clone());
            }
        }

        let lower = name.to_lowercase();
        rules
            .keywords
            .iter()
            .find(|r| r.keywords.iter().any(|k| lower.contains(k.as_str())))
            .map(|r| r.kind.clone())
            .unwrap_or_else(|| rules.default_kind.clone())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Strategy {
    Table,
    Heuristic,
}
