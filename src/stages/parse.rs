use std::time::Instant;

use tracing::info;

use super::{take, BagKey, DataBag, Stage, StageName};
use crate::error::{PipelineError, Result};
use crate::metrics::RunTracker;
use crate::parser;

pub struct ParseStage;

impl Stage for ParseStage {
    fn name(&self) -> StageName {
        StageName::Parse
    }

    fn requires(&self) -> &'static [BagKey] {
        &[BagKey::InputFile]
    }

    fn produces(&self) -> &'static [BagKey] {
        &[BagKey::Placemarks]
    }

    fn run(&mut self, mut bag: DataBag, tracker: &mut RunTracker) -> Result<DataBag> {
        let t0 = Instant::now();
        let path = take(&mut bag.input_file, BagKey::InputFile)?;
        let xml = std::fs::read_to_string(&path).map_err(|e| {
            PipelineError::config(format!("cannot read source {}: {}", path.display(), e))
        })?;
        info!(stage = "parse", file = %path.display(), "Parsing placemarks");

        let placemarks = parser::parse_placemarks(&xml)?;
        info!(stage = "parse", "Found {} placemarks", placemarks.len());

        tracker.record("parse", 0, placemarks.len(), t0.elapsed());
        bag.placemarks = Some(placemarks);
        bag.source_file = Some(path);
        Ok(bag)
    }
}
