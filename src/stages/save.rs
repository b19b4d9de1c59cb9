use std::collections::HashSet;
use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;

use clap::ValueEnum;
use indicatif::{ProgressBar, ProgressStyle};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::{take, write_json, BagKey, DataBag, Stage, StageName};
use crate::error::{PipelineError, Result};
use crate::metrics::{Notice, RunTracker};
use crate::model::CanonicalPlace;
use crate::slug::province_slug;

const PREVIEW_LIMIT: usize = 10;

/// What to do when a target file already exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum CollisionPolicy {
    #[serde(rename = "overwrite", alias = "overwrite_all")]
    #[value(name = "overwrite", alias = "overwrite-all")]
    OverwriteAll,
    #[serde(rename = "skip", alias = "skip_all")]
    #[value(name = "skip", alias = "skip-all")]
    SkipAll,
    Abort,
    Prompt,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Overwrite,
    Skip,
    /// Overwrite this file and every later collision without asking again.
    OverwriteAll,
    Abort,
}

/// Answers collisions one file at a time under [`CollisionPolicy::Prompt`].
pub trait CollisionDecider {
    fn decide(&mut self, path: &Path) -> Result<Decision>;
}

/// Asks on the terminal. End of input counts as quitting.
pub struct TerminalPrompt;

impl CollisionDecider for TerminalPrompt {
    fn decide(&mut self, path: &Path) -> Result<Decision> {
        let stdin = std::io::stdin();
        let mut input = stdin.lock();
        loop {
            print!("Overwrite {}? [y]es, [n]o, [a]ll, [q]uit: ", path.display());
            std::io::stdout().flush()?;
            let mut line = String::new();
            if input.read_line(&mut line)? == 0 {
                return Ok(Decision::Abort);
            }
            if let Some(decision) = parse_answer(&line) {
                return Ok(decision);
            }
        }
    }
}

fn parse_answer(line: &str) -> Option<Decision> {
    match line.trim().to_lowercase().as_str() {
        "y" | "yes" => Some(Decision::Overwrite),
        "n" | "no" => Some(Decision::Skip),
        "a" | "all" => Some(Decision::OverwriteAll),
        "q" | "quit" => Some(Decision::Abort),
        _ => None,
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SaveReport {
    pub written: usize,
    pub skipped: usize,
    pub skipped_no_id: usize,
    /// Targets that already existed before the first write, plus targets
    /// shared by more than one record of the run.
    pub collisions: usize,
    pub aborted: bool,
}

pub struct SaveStage {
    root: PathBuf,
    policy: CollisionPolicy,
    decider: Box<dyn CollisionDecider>,
}

impl SaveStage {
    pub fn new(root: impl Into<PathBuf>, policy: CollisionPolicy) -> Self {
        SaveStage {
            root: root.into(),
            policy,
            decider: Box::new(TerminalPrompt),
        }
    }

    pub fn with_decider(mut self, decider: Box<dyn CollisionDecider>) -> Self {
        self.decider = decider;
        self
    }

    /// `<root>/<province-slug>/<id>.json`, or `None` for a place without id.
    pub fn target(&self, place: &CanonicalPlace) -> Option<PathBuf> {
        if place.spec.id.is_empty() {
            return None;
        }
        let province = province_slug(&place.spec.location.province);
        Some(self.root.join(province).join(format!("{}.json", place.spec.id)))
    }

    fn preview_collisions(&self, existing: &[&PathBuf]) {
        if existing.is_empty() {
            return;
        }
        warn!(stage = "save", "Found {} colliding targets", existing.len());
        for path in existing.iter().take(PREVIEW_LIMIT) {
            warn!(stage = "save", "  - {}", path.display());
        }
        if existing.len() > PREVIEW_LIMIT {
            warn!(stage = "save", "  ... and {} more", existing.len() - PREVIEW_LIMIT);
        }
    }

    pub fn save_all(&mut self, places: &[CanonicalPlace], tracker: &mut RunTracker) -> Result<SaveReport> {
        let targets: Vec<Option<PathBuf>> = places.iter().map(|p| self.target(p)).collect();
        let mut seen = HashSet::new();
        let existing: Vec<&PathBuf> = targets
            .iter()
            .flatten()
            .filter(|p| !seen.insert(p.as_path()) || p.exists())
            .collect();
        self.preview_collisions(&existing);

        let mut report = SaveReport {
            collisions: existing.len(),
            ..Default::default()
        };
        let mut overwrite_all = self.policy == CollisionPolicy::OverwriteAll;
        let mut written: HashSet<PathBuf> = HashSet::new();

        let pb = ProgressBar::new(places.len() as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("[{elapsed_precise}] {bar:40} {pos}/{len} ({per_sec})")
                .map_err(|e| PipelineError::config(e.to_string()))?
                .progress_chars("=> "),
        );

        for (place, target) in places.iter().zip(targets) {
            pb.inc(1);
            let Some(path) = target else {
                info!(stage = "save", place = %place.spec.name, "Skipping place without id");
                report.skipped_no_id += 1;
                tracker.notice(Notice::MissingId {
                    place: place.spec.name.clone(),
                });
                continue;
            };

            if path.exists() && !overwrite_all {
                let decision = match self.policy {
                    CollisionPolicy::OverwriteAll => Decision::OverwriteAll,
                    CollisionPolicy::SkipAll => Decision::Skip,
                    CollisionPolicy::Abort => Decision::Abort,
                    CollisionPolicy::Prompt => {
                        let decider = &mut self.decider;
                        pb.suspend(|| decider.decide(&path))?
                    }
                };
                match decision {
                    Decision::Overwrite => {}
                    Decision::OverwriteAll => overwrite_all = true,
                    Decision::Skip => {
                        report.skipped += 1;
                        tracker.notice(Notice::CollisionSkipped {
                            path: path.display().to_string(),
                        });
                        continue;
                    }
                    Decision::Abort => {
                        warn!(stage = "save", path = %path.display(), "Save aborted");
                        report.aborted = true;
                        tracker.notice(Notice::Aborted {
                            path: path.display().to_string(),
                        });
                        break;
                    }
                }
            }

            write_json(&path, place)?;
            report.written += 1;
            if !written.insert(path.clone()) {
                warn!(stage = "save", path = %path.display(), "Replaced a file written earlier in this run");
                tracker.notice(Notice::Replaced {
                    path: path.display().to_string(),
                });
            }
        }
        pb.finish_and_clear();

        info!(
            stage = "save",
            "Saved {} places to {} ({} skipped, {} without id)",
            report.written,
            self.root.display(),
            report.skipped,
            report.skipped_no_id
        );
        Ok(report)
    }
}

impl Stage for SaveStage {
    fn name(&self) -> StageName {
        StageName::Save
    }

    fn requires(&self) -> &'static [BagKey] {
        &[BagKey::Places]
    }

    fn produces(&self) -> &'static [BagKey] {
        &[BagKey::SaveReport]
    }

    fn run(&mut self, mut bag: DataBag, tracker: &mut RunTracker) -> Result<DataBag> {
        let t0 = Instant::now();
        let places = take(&mut bag.places, BagKey::Places)?;
        let report = self.save_all(&places, tracker)?;

        tracker.record("save", places.len(), report.written, t0.elapsed());
        bag.places = Some(places);
        bag.save_report = Some(report);
        Ok(bag)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;

    use super::*;
    use crate::model::{Access, Location, PlaceSpec};

    fn place(id: &str, province: &str) -> CanonicalPlace {
        CanonicalPlace {
            kind: "urban/landmark".into(),
            spec: PlaceSpec {
                name: id.to_uppercase(),
                id: id.into(),
                description: "x".into(),
                location: Location {
                    province: province.into(),
                    longitude: Some(-7.99),
                    latitude: Some(31.62),
                    altitude: None,
                },
                access: Access::default(),
                time_periods: vec![],
                people: vec![],
                timeline: vec![],
                links: vec![],
                activities: vec![],
                items: vec![],
                comments: vec![],
            },
        }
    }

    struct Scripted {
        answers: VecDeque<Decision>,
        asked: Vec<PathBuf>,
    }

    impl CollisionDecider for Scripted {
        fn decide(&mut self, path: &Path) -> Result<Decision> {
            self.asked.push(path.to_path_buf());
            Ok(self.answers.pop_front().unwrap_or(Decision::Abort))
        }
    }

    fn existing(root: &Path, province: &str, id: &str) -> PathBuf {
        let path = root.join(province).join(format!("{}.json", id));
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, "{}\n").unwrap();
        path
    }

    #[test]
    fn writes_every_place_without_collisions() {
        let dir = tempfile::tempdir().unwrap();
        let mut tracker = RunTracker::new("t".into());
        let places = vec![
            place("koutoubia", "province/marrakech"),
            place("hassan-tower", "province/rabat"),
            place("menara", "province/marrakech"),
        ];
        let report = SaveStage::new(dir.path(), CollisionPolicy::OverwriteAll)
            .save_all(&places, &mut tracker)
            .unwrap();
        assert_eq!(report.written, 3);
        assert_eq!(report.skipped, 0);
        assert_eq!(report.collisions, 0);

        let raw = std::fs::read_to_string(dir.path().join("rabat/hassan-tower.json")).unwrap();
        assert!(raw.ends_with("}\n"));
        let back: CanonicalPlace = serde_json::from_str(&raw).unwrap();
        assert_eq!(back, places[1]);
    }

    #[test]
    fn places_without_id_are_counted() {
        let dir = tempfile::tempdir().unwrap();
        let mut tracker = RunTracker::new("t".into());
        let report = SaveStage::new(dir.path(), CollisionPolicy::SkipAll)
            .save_all(&[place("", "province/marrakech"), place("a", "province/marrakech")], &mut tracker)
            .unwrap();
        assert_eq!(report.written, 1);
        assert_eq!(report.skipped_no_id, 1);
        assert!(matches!(tracker.notices(), [Notice::MissingId { .. }]));
    }

    #[test]
    fn skip_policy_keeps_existing_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = existing(dir.path(), "marrakech", "koutoubia");
        let mut tracker = RunTracker::new("t".into());
        let report = SaveStage::new(dir.path(), CollisionPolicy::SkipAll)
            .save_all(&[place("koutoubia", "province/marrakech")], &mut tracker)
            .unwrap();
        assert_eq!((report.written, report.skipped, report.collisions), (0, 1, 1));
        assert_eq!(std::fs::read_to_string(path).unwrap(), "{}\n");
    }

    #[test]
    fn abort_stops_without_rollback() {
        let dir = tempfile::tempdir().unwrap();
        existing(dir.path(), "marrakech", "b");
        let mut tracker = RunTracker::new("t".into());
        let places = [
            place("a", "province/marrakech"),
            place("b", "province/marrakech"),
            place("c", "province/marrakech"),
        ];
        let report = SaveStage::new(dir.path(), CollisionPolicy::Abort)
            .save_all(&places, &mut tracker)
            .unwrap();
        assert!(report.aborted);
        assert_eq!(report.written, 1);
        assert!(dir.path().join("marrakech/a.json").exists());
        assert!(!dir.path().join("marrakech/c.json").exists());
    }

    #[test]
    fn prompt_overwrite_all_is_sticky() {
        let dir = tempfile::tempdir().unwrap();
        for id in ["a", "b", "c"] {
            existing(dir.path(), "marrakech", id);
        }
        let decider = Scripted {
            answers: VecDeque::from([Decision::Skip, Decision::OverwriteAll]),
            asked: vec![],
        };
        let mut stage = SaveStage::new(dir.path(), CollisionPolicy::Prompt).with_decider(Box::new(decider));
        let mut tracker = RunTracker::new("t".into());
        let places = [
            place("a", "province/marrakech"),
            place("b", "province/marrakech"),
            place("c", "province/marrakech"),
        ];
        let report = stage.save_all(&places, &mut tracker).unwrap();
        assert_eq!((report.written, report.skipped, report.collisions), (2, 1, 3));
        assert!(!report.aborted);
        assert_eq!(std::fs::read_to_string(dir.path().join("marrakech/a.json")).unwrap(), "{}\n");
        assert_ne!(std::fs::read_to_string(dir.path().join("marrakech/c.json")).unwrap(), "{}\n");
    }

    #[test]
    fn shared_target_within_a_run_is_a_collision() {
        let dir = tempfile::tempdir().unwrap();
        let mut first = place("bab-doukkala", "province/marrakech");
        first.spec.description = "first".into();
        let second = place("bab-doukkala", "province/marrakech");

        let mut tracker = RunTracker::new("t".into());
        let report = SaveStage::new(dir.path(), CollisionPolicy::OverwriteAll)
            .save_all(&[first, second.clone()], &mut tracker)
            .unwrap();
        assert_eq!((report.written, report.collisions), (2, 1));
        assert!(matches!(tracker.notices(), [Notice::Replaced { .. }]));
        let raw = std::fs::read_to_string(dir.path().join("marrakech/bab-doukkala.json")).unwrap();
        assert_eq!(serde_json::from_str::<CanonicalPlace>(&raw).unwrap(), second);

        let other = tempfile::tempdir().unwrap();
        let mut tracker = RunTracker::new("t".into());
        let report = SaveStage::new(other.path(), CollisionPolicy::SkipAll)
            .save_all(&[second.clone(), second], &mut tracker)
            .unwrap();
        assert_eq!((report.written, report.skipped, report.collisions), (1, 1, 1));
        assert!(matches!(tracker.notices(), [Notice::CollisionSkipped { .. }]));
    }

    #[test]
    fn answers() {
        assert_eq!(parse_answer("Y\n"), Some(Decision::Overwrite));
        assert_eq!(parse_answer("no"), Some(Decision::Skip));
        assert_eq!(parse_answer(" all "), Some(Decision::OverwriteAll));
        assert_eq!(parse_answer("q"), Some(Decision::Abort));
        assert_eq!(parse_answer("maybe"), None);
    }

    #[test]
    fn stage_keeps_places_and_adds_report() {
        let dir = tempfile::tempdir().unwrap();
        let mut tracker = RunTracker::new("t".into());
        let bag = DataBag {
            places: Some(vec![place("a", "province/unknown")]),
            ..Default::default()
        };
        let out = SaveStage::new(dir.path(), CollisionPolicy::OverwriteAll)
            .run(bag, &mut tracker)
            .unwrap();
        assert_eq!(out.save_report.map(|r| r.written), Some(1));
        assert!(out.places.is_some());
        assert!(dir.path().join("unknown/a.json").exists());
    }
}
