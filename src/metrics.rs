use std::fmt::Write as _;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Non-fatal conditions collected over a run. None of these stop the
/// pipeline; all of them end up in the summary.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Notice {
    Finding { place: String, messages: Vec<String> },
    GeocodeMiss { place: String, longitude: f64, latitude: f64 },
    MissingId { place: String },
    CollisionSkipped { path: String },
    /// A file written earlier in the same run was replaced.
    Replaced { path: String },
    Aborted { path: String },
}

impl Notice {
    fn label(&self) -> &'static str {
        match self {
            Notice::Finding { .. } => "validation findings",
            Notice::GeocodeMiss { .. } => "geocode misses",
            Notice::MissingId { .. } => "records without id",
            Notice::CollisionSkipped { .. } => "collisions skipped",
            Notice::Replaced { .. } => "files replaced within the run",
            Notice::Aborted { .. } => "aborted saves",
        }
    }

    fn describe(&self) -> String {
        match self {
            Notice::Finding { place, messages } => format!("{}: {}", place, messages.join("; ")),
            Notice::GeocodeMiss {
                place,
                longitude,
                latitude,
            } => format!("{}: ({}, {}) is outside every region", place, longitude, latitude),
            Notice::MissingId { place } => format!("{}: no id, not saved", place),
            Notice::CollisionSkipped { path } => format!("{}: kept existing file", path),
            Notice::Replaced { path } => format!("{}: two records share this target, the later one won", path),
            Notice::Aborted { path } => format!("{}: run aborted here", path),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct StageMetric {
    pub stage: String,
    pub records_in: usize,
    pub records_out: usize,
    pub elapsed_ms: u128,
}

pub struct RunTracker {
    run_id: String,
    started_at: DateTime<Utc>,
    stages: Vec<StageMetric>,
    notices: Vec<Notice>,
}

impl RunTracker {
    pub fn new(run_id: String) -> Self {
        RunTracker {
            run_id,
            started_at: Utc::now(),
            stages: Vec::new(),
            notices: Vec::new(),
        }
    }

    pub fn record(&mut self, stage: &str, records_in: usize, records_out: usize, elapsed: Duration) {
        self.stages.push(StageMetric {
            stage: stage.to_string(),
            records_in,
            records_out,
            elapsed_ms: elapsed.as_millis(),
        });
    }

    pub fn notice(&mut self, notice: Notice) {
        self.notices.push(notice);
    }

    pub fn notices(&self) -> &[Notice] {
        &self.notices
    }

    pub fn stages(&self) -> &[StageMetric] {
        &self.stages
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn count(&self, pred: impl Fn(&Notice) -> bool) -> usize {
        self.notices.iter().filter(|n| pred(n)).count()
    }

    /// Counts per notice category followed by the itemized list.
    pub fn summary(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(
            out,
            "Run {} (started {})",
            self.run_id,
            self.started_at.format("%Y-%m-%d %H:%M:%S UTC")
        );
        for m in &self.stages {
            let _ = writeln!(
                out,
                "  {:<10} {:>5} in -> {:>5} out  ({} ms)",
                m.stage, m.records_in, m.records_out, m.elapsed_ms
            );
        }
        if self.notices.is_empty() {
            let _ = writeln!(out, "No warnings.");
            return out;
        }

        let mut labels: Vec<&'static str> = Vec::new();
        for n in &self.notices {
            if !labels.contains(&n.label()) {
                labels.push(n.label());
            }
        }
        let _ = writeln!(out, "Warnings:");
        for label in &labels {
            let count = self.count(|n| n.label() == *label);
            let _ = writeln!(out, "  {:>5} {}", count, label);
        }
        for n in &self.notices {
            let _ = writeln!(out, "  - {}", n.describe());
        }
        out
    }
}

pub fn new_run_id() -> String {
    format!("run-{}", Utc::now().format("%Y%m%dT%H%M%S"))
}
