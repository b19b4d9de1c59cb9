use std::time::Instant;

use tracing::{info, warn};

use super::{take, BagKey, DataBag, Stage, StageName};
use crate::config::Bounds;
use crate::error::Result;
use crate::metrics::{Notice, RunTracker};
use crate::model::{Coordinates, EnrichedPlace, ValidationFinding};

#[cfg(feature = "rayon")]
use rayon::prelude::*;

/// Flags problems without removing anything: every input place is passed on.
pub struct ValidateStage {
    bounds: Bounds,
}

impl ValidateStage {
    pub fn new(bounds: Bounds) -> Self {
        ValidateStage { bounds }
    }

    /// All messages for one place, empty when it is clean.
    pub fn check(&self, place: &EnrichedPlace) -> Vec<String> {
        let mut messages = required_fields(place);
        if let Some(coords) = &place.place.coordinates {
            messages.extend(self.coordinates(coords));
        }
        if !place.kind.contains('/') {
            messages.push(format!(
                "Invalid kind format: {} (should be category/kind)",
                place.kind
            ));
        }
        messages
    }

    fn coordinates(&self, c: &Coordinates) -> Vec<String> {
        let b = &self.bounds;
        let mut messages = Vec::new();
        if !(b.min_latitude..=b.max_latitude).contains(&c.latitude) {
            messages.push(format!(
                "Latitude {} outside bounds ({} to {})",
                c.latitude, b.min_latitude, b.max_latitude
            ));
        }
        if !(b.min_longitude..=b.max_longitude).contains(&c.longitude) {
            messages.push(format!(
                "Longitude {} outside bounds ({} to {})",
                c.longitude, b.min_longitude, b.max_longitude
            ));
        }
        messages
    }

    #[cfg(feature = "rayon")]
    fn check_all(&self, places: &[EnrichedPlace]) -> Vec<Vec<String>> {
        places.par_iter().map(|p| self.check(p)).collect()
    }

    #[cfg(not(feature = "rayon"))]
    fn check_all(&self, places: &[EnrichedPlace]) -> Vec<Vec<String>> {
        places.iter().map(|p| self.check(p)).collect()
    }
}

// `timePeriods` is a typed list and therefore always present.
fn required_fields(place: &EnrichedPlace) -> Vec<String> {
    [
        ("name", place.place.name.as_str()),
        ("id", place.id.as_str()),
        ("description", place.place.description.as_str()),
        ("kind", place.kind.as_str()),
        ("province", place.province.as_str()),
    ]
    .into_iter()
    .filter(|(_, value)| value.trim().is_empty())
    .map(|(field, _)| format!("Field cannot be empty: {}", field))
    .collect()
}

impl Stage for ValidateStage {
    fn name(&self) -> StageName {
        StageName::Validate
    }

    fn requires(&self) -> &'static [BagKey] {
        &[BagKey::EnrichedPlaces]
    }

    fn produces(&self) -> &'static [BagKey] {
        &[BagKey::ValidatedPlaces, BagKey::ValidationFindings]
    }

    fn run(&mut self, mut bag: DataBag, tracker: &mut RunTracker) -> Result<DataBag> {
        let t0 = Instant::now();
        let places = take(&mut bag.enriched_places, BagKey::EnrichedPlaces)?;

        let mut findings = Vec::new();
        for (i, (place, messages)) in places.iter().zip(self.check_all(&places)).enumerate() {
            if messages.is_empty() {
                continue;
            }
            let reference = if place.place.name.is_empty() {
                format!("index_{}", i)
            } else {
                place.place.name.clone()
            };
            warn!(stage = "validate", place = %reference, "{}", messages.join(", "));
            tracker.notice(Notice::Finding {
                place: reference.clone(),
                messages: messages.clone(),
            });
            findings.push(ValidationFinding {
                place: reference,
                messages,
            });
        }

        if findings.is_empty() {
            info!(stage = "validate", "All {} places validated", places.len());
        } else {
            info!(
                stage = "validate",
                "Found {} places with findings out of {}",
                findings.len(),
                places.len()
            );
        }

        tracker.record("validate", places.len(), places.len(), t0.elapsed());
        bag.validated_places = Some(places);
        bag.validation_findings = Some(findings);
        Ok(bag)
    }
}
