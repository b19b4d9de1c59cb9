use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info, warn};

use super::{take, BagKey, DataBag, Stage, StageName};
use crate::error::Result;
use crate::geo::{GeometryClassifier, UNKNOWN_REGION};
use crate::kind::{KindClassifier, PlaceRef};
use crate::metrics::{Notice, RunTracker};
use crate::model::{EnrichedPlace, NormalizedPlace};
use crate::slug::{province_id, slugify};

pub const SUMMIT_KIND: &str = "nature/mountain";

/// Adds id, kind, province and time periods to each place.
pub struct EnrichStage {
    classifier: Arc<dyn KindClassifier>,
    regions: Arc<GeometryClassifier>,
    default_province: String,
}

impl EnrichStage {
    pub fn new(
        classifier: Arc<dyn KindClassifier>,
        regions: Arc<GeometryClassifier>,
        default_province: impl Into<String>,
    ) -> Self {
        EnrichStage {
            classifier,
            regions,
            default_province: default_province.into(),
        }
    }

    pub fn enrich(&self, place: NormalizedPlace, tracker: &mut RunTracker) -> EnrichedPlace {
        let id = slugify(&place.name);
        let kind = if place.summit {
            SUMMIT_KIND.to_string()
        } else {
            self.classifier.classify(&PlaceRef {
                id: &id,
                name: &place.name,
                group: place.group.as_deref(),
            })
        };
        let time_periods = place.fields.get("period").cloned().into_iter().collect();
        let province = self.resolve_province(&place, tracker);

        debug!(stage = "enrich", place = %place.name, %kind, %province, "Enriched place");
        EnrichedPlace {
            place,
            id,
            kind,
            province,
            time_periods,
        }
    }

    fn resolve_province(&self, place: &NormalizedPlace, tracker: &mut RunTracker) -> String {
        let Some(coords) = place.coordinates else {
            return self.default_province.clone();
        };
        if self.regions.is_empty() {
            return self.default_province.clone();
        }
        let region = self.regions.classify(coords.longitude, coords.latitude);
        if region == UNKNOWN_REGION {
            warn!(
                stage = "enrich",
                place = %place.name,
                longitude = coords.longitude,
                latitude = coords.latitude,
                "Point is outside every region"
            );
            tracker.notice(Notice::GeocodeMiss {
                place: place.name.clone(),
                longitude: coords.longitude,
                latitude: coords.latitude,
            });
        }
        province_id(region)
    }
}

impl Stage for EnrichStage {
    fn name(&self) -> StageName {
        StageName::Enrich
    }

    fn requires(&self) -> &'static [BagKey] {
        &[BagKey::NormalizedPlaces]
    }

    fn produces(&self) -> &'static [BagKey] {
        &[BagKey::EnrichedPlaces]
    }

    fn run(&mut self, mut bag: DataBag, tracker: &mut RunTracker) -> Result<DataBag> {
        let t0 = Instant::now();
        let places = take(&mut bag.normalized_places, BagKey::NormalizedPlaces)?;
        let n_in = places.len();

        let enriched: Vec<EnrichedPlace> = places
            .into_iter()
            .map(|p| self.enrich(p, tracker))
            .collect();
        info!(stage = "enrich", "Enriched {} places", enriched.len());

        tracker.record("enrich", n_in, enriched.len(), t0.elapsed());
        bag.enriched_places = Some(enriched);
        Ok(bag)
    }
}
