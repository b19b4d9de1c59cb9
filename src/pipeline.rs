//! Runs a caller-chosen sequence of stages over one data bag.
//!
//! The whole plan is checked before the first stage runs: duplicate stages
//! and required keys that nothing provides are configuration errors.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tracing::{error, info};

use crate::config::Settings;
use crate::error::{PipelineError, Result};
use crate::geo::GeometryClassifier;
use crate::kind::{KindClassifier, TableClassifier};
use crate::metrics::RunTracker;
use crate::stages::enrich::EnrichStage;
use crate::stages::normalize::NormalizeStage;
use crate::stages::parse::ParseStage;
use crate::stages::save::{CollisionDecider, SaveStage};
use crate::stages::transform::TransformStage;
use crate::stages::validate::ValidateStage;
use crate::stages::{BagKey, DataBag, Stage, StageName};

/// Loaded once per run and shared by the stages that need them.
pub struct Resources {
    pub classifier: Arc<dyn KindClassifier>,
    pub regions: Arc<GeometryClassifier>,
    /// Used by Save under the prompt policy; defaults to the terminal.
    pub decider: Option<Box<dyn CollisionDecider>>,
}

impl Default for Resources {
    fn default() -> Self {
        Resources {
            classifier: Arc::new(TableClassifier::new(HashMap::new())),
            regions: Arc::new(GeometryClassifier::default()),
            decider: None,
        }
    }
}

pub struct Pipeline {
    stages: Vec<Box<dyn Stage>>,
}

impl Pipeline {
    pub fn new(names: &[StageName], settings: &Settings, mut resources: Resources) -> Result<Self> {
        let mut seen = HashSet::new();
        let mut stages: Vec<Box<dyn Stage>> = Vec::with_capacity(names.len());
        for &name in names {
            if !seen.insert(name) {
                return Err(PipelineError::config(format!("stage '{}' is listed twice", name)));
            }
            let stage: Box<dyn Stage> = match name {
                StageName::Parse => Box::new(ParseStage),
                StageName::Normalize => Box::new(NormalizeStage),
                StageName::Enrich => Box::new(EnrichStage::new(
                    Arc::clone(&resources.classifier),
                    Arc::clone(&resources.regions),
                    settings.default_province.clone(),
                )),
                StageName::Validate => Box::new(ValidateStage::new(settings.bounds.clone())),
                StageName::Transform => Box::new(TransformStage::new(settings.legacy_swapped_axes)),
                StageName::Save => {
                    let save = SaveStage::new(&settings.output_dir, settings.on_collision);
                    match resources.decider.take() {
                        Some(decider) => Box::new(save.with_decider(decider)),
                        None => Box::new(save),
                    }
                }
            };
            stages.push(stage);
        }
        Ok(Pipeline { stages })
    }

    pub fn stages(&self) -> impl Iterator<Item = &dyn Stage> {
        self.stages.iter().map(|s| s.as_ref())
    }

    /// Every stage must find its required keys in the initial bag or in the
    /// output of an earlier stage.
    pub fn check(&self, bag: &DataBag) -> Result<()> {
        let mut available: HashSet<BagKey> = bag.keys().into_iter().collect();
        for stage in &self.stages {
            if let Some(missing) = stage.requires().iter().find(|k| !available.contains(*k)) {
                return Err(PipelineError::config(format!(
                    "stage '{}' needs '{}', which is neither in the input nor produced by an earlier stage",
                    stage.name(),
                    missing
                )));
            }
            available.extend(stage.produces().iter().copied());
        }
        Ok(())
    }

    /// Run all stages in order. The first failing stage ends the run.
    pub fn run(&mut self, bag: DataBag, tracker: &mut RunTracker) -> Result<DataBag> {
        self.check(&bag)?;
        let plan: Vec<&str> = self.stages.iter().map(|s| s.name().as_str()).collect();
        info!(run = %tracker.run_id(), "Stages: {}", plan.join(" -> "));

        let mut bag = bag;
        for stage in &mut self.stages {
            let name = stage.name();
            info!(stage = %name, "Running");
            bag = stage.run(bag, tracker).map_err(|e| {
                error!(stage = %name, "Stage failed: {}", e);
                e
            })?;
        }
        Ok(bag)
    }
}
