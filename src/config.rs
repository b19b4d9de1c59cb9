use std::path::{Path, PathBuf};

use config::{Config, Environment, File};
use serde::Deserialize;

use crate::error::{PipelineError, Result};
use crate::kind::Strategy;
use crate::stages::save::CollisionPolicy;

pub const CONFIG_FILE: &str = "placemarks";
pub const ENV_PREFIX: &str = "PLACEMARKS";

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Bounds {
    pub min_latitude: f64,
    pub max_latitude: f64,
    pub min_longitude: f64,
    pub max_longitude: f64,
}

impl Default for Bounds {
    fn default() -> Self {
        Bounds {
            min_latitude: 21.0,
            max_latitude: 36.0,
            min_longitude: -17.0,
            max_longitude: -1.0,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub output_dir: PathBuf,
    /// Region used when a place has no coordinates or no boundaries are loaded.
    pub default_province: String,
    /// Write latitude under `longitude` and vice versa in saved records.
    pub legacy_swapped_axes: bool,
    pub classifier: Strategy,
    pub on_collision: CollisionPolicy,
    pub bounds: Bounds,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            output_dir: PathBuf::from("data/places"),
            default_province: "province/marrakech".into(),
            legacy_swapped_axes: false,
            classifier: Strategy::Table,
            on_collision: CollisionPolicy::Prompt,
            bounds: Bounds::default(),
        }
    }
}

impl Settings {
    /// Defaults, then `placemarks.{toml,json,..}` in `dir` if present, then
    /// `PLACEMARKS_*` environment variables (`PLACEMARKS_BOUNDS__MIN_LATITUDE`
    /// for nested keys).
    pub fn load(dir: &Path) -> Result<Self> {
        let d = Settings::default();
        let b = Bounds::default();
        let built = Config::builder()
            .set_default("output_dir", d.output_dir.to_string_lossy().to_string())
            .and_then(|c| c.set_default("default_province", d.default_province))
            .and_then(|c| c.set_default("legacy_swapped_axes", d.legacy_swapped_axes))
            .and_then(|c| c.set_default("classifier", "table"))
            .and_then(|c| c.set_default("on_collision", "prompt"))
            .and_then(|c| c.set_default("bounds.min_latitude", b.min_latitude))
            .and_then(|c| c.set_default("bounds.max_latitude", b.max_latitude))
            .and_then(|c| c.set_default("bounds.min_longitude", b.min_longitude))
            .and_then(|c| c.set_default("bounds.max_longitude", b.max_longitude))
            .map_err(config_error)?
            .add_source(File::from(dir.join(CONFIG_FILE)).required(false))
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(config_error)?;
        built.try_deserialize().map_err(config_error)
    }
}

fn config_error(e: config::ConfigError) -> PipelineError {
    PipelineError::config(e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_without_file() {
        let dir = tempfile::tempdir().unwrap();
        let settings = Settings::load(dir.path()).unwrap();
        assert_eq!(settings.default_province, "province/marrakech");
        assert_eq!(settings.bounds, Bounds::default());
        assert_eq!(settings.classifier, Strategy::Table);
        assert!(!settings.legacy_swapped_axes);
    }

    #[test]
    fn file_overrides_defaults() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("placemarks.toml"),
            "output_dir = \"out\"\nclassifier = \"heuristic\"\non_collision = \"skip\"\n\n[bounds]\nmin_latitude = 20.0\n",
        )
        .unwrap();
        let settings = Settings::load(dir.path()).unwrap();
        assert_eq!(settings.output_dir, PathBuf::from("out"));
        assert_eq!(settings.classifier, Strategy::Heuristic);
        assert_eq!(settings.on_collision, CollisionPolicy::SkipAll);
        assert_eq!(settings.bounds.min_latitude, 20.0);
        assert_eq!(settings.bounds.max_latitude, 36.0);
    }
}
