use std::time::Instant;

use tracing::info;

use super::{take, BagKey, DataBag, Stage, StageName};
use crate::error::Result;
use crate::metrics::RunTracker;
use crate::model::{Access, CanonicalPlace, EnrichedPlace, Location, PlaceSpec};

pub struct TransformStage {
    legacy_swapped_axes: bool,
}

impl TransformStage {
    pub fn new(legacy_swapped_axes: bool) -> Self {
        TransformStage {
            legacy_swapped_axes,
        }
    }

    pub fn transform(&self, enriched: EnrichedPlace) -> CanonicalPlace {
        let EnrichedPlace {
            place,
            id,
            kind,
            province,
            time_periods,
        } = enriched;

        let mut location = Location {
            province,
            longitude: place.coordinates.map(|c| c.longitude),
            latitude: place.coordinates.map(|c| c.latitude),
            altitude: place
                .coordinates
                .and_then(|c| c.altitude)
                .or(place.summit_altitude),
        };
        // Older catalog files store latitude under "longitude" and vice versa.
        if self.legacy_swapped_axes {
            std::mem::swap(&mut location.longitude, &mut location.latitude);
        }

        let comments = place
            .fields
            .iter()
            .map(|(key, value)| format!("{}: {}", key, value))
            .collect();

        CanonicalPlace {
            kind,
            spec: PlaceSpec {
                name: place.name,
                id,
                description: place.description,
                location,
                access: Access::default(),
                time_periods,
                people: Vec::new(),
                timeline: Vec::new(),
                links: place.links,
                activities: Vec::new(),
                items: Vec::new(),
                comments,
            },
        }
    }
}

impl Stage for TransformStage {
    fn name(&self) -> StageName {
        StageName::Transform
    }

    fn requires(&self) -> &'static [BagKey] {
        &[BagKey::ValidatedPlaces]
    }

    fn produces(&self) -> &'static [BagKey] {
        &[BagKey::Places]
    }

    fn run(&mut self, mut bag: DataBag, tracker: &mut RunTracker) -> Result<DataBag> {
        let t0 = Instant::now();
        let validated = take(&mut bag.validated_places, BagKey::ValidatedPlaces)?;
        let n_in = validated.len();

        let places: Vec<CanonicalPlace> = validated.into_iter().map(|p| self.transform(p)).collect();
        info!(stage = "transform", "Transformed {} places", places.len());

        tracker.record("transform", n_in, places.len(), t0.elapsed());
        bag.places = Some(places);
        Ok(bag)
    }
}
