//! Pipeline stages and the data bag they pass along.
//!
//! Each stage takes the keys it consumes out of the bag and inserts the keys
//! it produces, so ownership of a record list moves forward with the bag and
//! no stage holds on to an earlier stage's output.

pub mod enrich;
pub mod normalize;
pub mod parse;
pub mod save;
pub mod transform;
pub mod validate;

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, Result};
use crate::metrics::RunTracker;
use crate::model::{CanonicalPlace, EnrichedPlace, NormalizedPlace, RawPlacemark, ValidationFinding};
use save::SaveReport;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BagKey {
    InputFile,
    Placemarks,
    NormalizedPlaces,
    EnrichedPlaces,
    ValidatedPlaces,
    ValidationFindings,
    Places,
    SaveReport,
}

impl fmt::Display for BagKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BagKey::InputFile => "input_file",
            BagKey::Placemarks => "placemarks",
            BagKey::NormalizedPlaces => "normalized_places",
            BagKey::EnrichedPlaces => "enriched_places",
            BagKey::ValidatedPlaces => "validated_places",
            BagKey::ValidationFindings => "validation_findings",
            BagKey::Places => "places",
            BagKey::SaveReport => "save_report",
        };
        f.write_str(name)
    }
}

/// Interchange format between stages. Serialized as JSON it can be written
/// after any stage and fed back in to resume a run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DataBag {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_file: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_file: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub placemarks: Option<Vec<RawPlacemark>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub normalized_places: Option<Vec<NormalizedPlace>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enriched_places: Option<Vec<EnrichedPlace>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validated_places: Option<Vec<EnrichedPlace>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validation_findings: Option<Vec<ValidationFinding>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub places: Option<Vec<CanonicalPlace>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub save_report: Option<SaveReport>,
}

impl DataBag {
    pub fn for_input(path: impl Into<PathBuf>) -> Self {
        DataBag {
            input_file: Some(path.into()),
            ..Default::default()
        }
    }

    pub fn has(&self, key: BagKey) -> bool {
        match key {
            BagKey::InputFile => self.input_file.is_some(),
            BagKey::Placemarks => self.placemarks.is_some(),
            BagKey::NormalizedPlaces => self.normalized_places.is_some(),
            BagKey::EnrichedPlaces => self.enriched_places.is_some(),
            BagKey::ValidatedPlaces => self.validated_places.is_some(),
            BagKey::ValidationFindings => self.validation_findings.is_some(),
            BagKey::Places => self.places.is_some(),
            BagKey::SaveReport => self.save_report.is_some(),
        }
    }

    pub fn keys(&self) -> Vec<BagKey> {
        ALL_KEYS.iter().copied().filter(|k| self.has(*k)).collect()
    }

    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            PipelineError::config(format!("cannot read data bag {}: {}", path.display(), e))
        })?;
        Ok(serde_json::from_str(&raw)?)
    }

    pub fn store(&self, path: &Path) -> Result<()> {
        write_json(path, self)
    }
}

/// Pretty JSON with a trailing newline, creating parent directories.
pub(crate) fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let mut json = serde_json::to_string_pretty(value)?;
    json.push('\n');
    std::fs::write(path, json)?;
    Ok(())
}

const ALL_KEYS: &[BagKey] = &[
    BagKey::InputFile,
    BagKey::Placemarks,
    BagKey::NormalizedPlaces,
    BagKey::EnrichedPlaces,
    BagKey::ValidatedPlaces,
    BagKey::ValidationFindings,
    BagKey::Places,
    BagKey::SaveReport,
];

/// Take a required key out of the bag.
pub(crate) fn take<T>(slot: &mut Option<T>, key: BagKey) -> Result<T> {
    slot.take()
        .ok_or_else(|| PipelineError::config(format!("data bag is missing '{}'", key)))
}

/// A unit of work that consumes a data bag and returns the next one.
pub trait Stage {
    fn name(&self) -> StageName;

    fn requires(&self) -> &'static [BagKey];

    fn produces(&self) -> &'static [BagKey];

    fn run(&mut self, bag: DataBag, tracker: &mut RunTracker) -> Result<DataBag>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StageName {
    Parse,
    Normalize,
    Enrich,
    Validate,
    Transform,
    Save,
}

impl StageName {
    pub const CANONICAL: [StageName; 6] = [
        StageName::Parse,
        StageName::Normalize,
        StageName::Enrich,
        StageName::Validate,
        StageName::Transform,
        StageName::Save,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            StageName::Parse => "parse",
            StageName::Normalize => "normalize",
            StageName::Enrich => "enrich",
            StageName::Validate => "validate",
            StageName::Transform => "transform",
            StageName::Save => "save",
        }
    }

    /// Parse a comma-separated stage list such as `parse,normalize`.
    pub fn parse_list(list: &str) -> Result<Vec<StageName>> {
        list.split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(StageName::from_str)
            .collect()
    }
}

impl fmt::Display for StageName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for StageName {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self> {
        StageName::CANONICAL
            .iter()
            .copied()
            .find(|n| n.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| PipelineError::config(format!("unknown stage: {}", s)))
    }
}
