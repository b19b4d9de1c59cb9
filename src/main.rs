mod config;
mod error;
mod geo;
mod kind;
mod metrics;
mod model;
mod parser;
mod pipeline;
mod slug;
mod stages;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use tracing::{info, warn};

use config::Settings;
use geo::GeometryClassifier;
use kind::{HeuristicClassifier, KindClassifier, KindRules, Strategy, TableClassifier};
use metrics::RunTracker;
use pipeline::{Pipeline, Resources};
use stages::save::CollisionPolicy;
use stages::{DataBag, StageName};

const ALL_STAGES: &str = "parse,normalize,enrich,validate,transform,save";

#[derive(Parser)]
#[command(name = "placemark_pipeline", about = "Turn KML placemark exports into canonical place records")]
struct Cli {
    /// Directory searched for placemarks.toml
    #[arg(long, global = true, default_value = ".")]
    config_dir: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run pipeline stages over a KML export
    Run {
        /// KML file (optional when resuming from --bag-in)
        input: Option<PathBuf>,
        /// Comma-separated stages, in order
        #[arg(long, default_value = ALL_STAGES)]
        stages: String,
        /// JSON object mapping place id or name to a kind
        #[arg(long)]
        kind_mappings: Option<PathBuf>,
        /// JSON rules for the heuristic classifier (built-in rules otherwise)
        #[arg(long)]
        kind_rules: Option<PathBuf>,
        /// GeoJSON FeatureCollection of province boundaries
        #[arg(long)]
        province_geojson: Option<PathBuf>,
        #[arg(long)]
        default_province: Option<String>,
        #[arg(long, value_enum)]
        classifier: Option<Strategy>,
        #[arg(long, value_enum)]
        on_collision: Option<CollisionPolicy>,
        #[arg(long)]
        output_dir: Option<PathBuf>,
        /// Start from a data bag written by an earlier run
        #[arg(long)]
        bag_in: Option<PathBuf>,
        /// Write the final data bag here
        #[arg(long)]
        bag_out: Option<PathBuf>,
    },
    /// Mine a description string and print fields, links and text as JSON
    Mine { text: String },
    /// Resolve a point to its province
    Locate {
        #[arg(allow_negative_numbers = true)]
        longitude: f64,
        #[arg(allow_negative_numbers = true)]
        latitude: f64,
        #[arg(long)]
        province_geojson: PathBuf,
    },
    /// List stages in canonical order with the keys they use
    Stages,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let t0 = Instant::now();
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Run {
            input,
            stages,
            kind_mappings,
            kind_rules,
            province_geojson,
            default_province,
            classifier,
            on_collision,
            output_dir,
            bag_in,
            bag_out,
        } => {
            let mut settings = Settings::load(&cli.config_dir)?;
            if let Some(p) = default_province {
                settings.default_province = p;
            }
            if let Some(c) = classifier {
                settings.classifier = c;
            }
            if let Some(c) = on_collision {
                settings.on_collision = c;
            }
            if let Some(d) = output_dir {
                settings.output_dir = d;
            }

            let names = StageName::parse_list(&stages)?;
            let mut bag = match &bag_in {
                Some(path) => DataBag::load(path)?,
                None => DataBag::default(),
            };
            match input {
                Some(path) => bag.input_file = Some(path),
                None if bag_in.is_none() => bail!("either an input file or --bag-in is required"),
                None => {}
            }

            let resources = Resources {
                classifier: load_classifier(settings.classifier, kind_mappings.as_deref(), kind_rules.as_deref())?,
                regions: Arc::new(match &province_geojson {
                    Some(path) => GeometryClassifier::from_file(path)?,
                    None => GeometryClassifier::default(),
                }),
                decider: None,
            };

            let mut pipeline = Pipeline::new(&names, &settings, resources)?;
            let mut tracker = RunTracker::new(metrics::new_run_id());
            let bag = match pipeline.run(bag, &mut tracker) {
                Ok(bag) => bag,
                Err(e) => {
                    println!("\n{}", tracker.summary());
                    return Err(e.into());
                }
            };

            if let Some(path) = &bag_out {
                bag.store(path)
                    .with_context(|| format!("writing data bag to {}", path.display()))?;
                info!("Data bag written to {}", path.display());
            }
            if let Some(report) = &bag.save_report {
                println!(
                    "Saved {} places ({} skipped, {} without id, {} collisions){}",
                    report.written,
                    report.skipped,
                    report.skipped_no_id,
                    report.collisions,
                    if report.aborted { ", aborted" } else { "" }
                );
            }
            println!("\n{}", tracker.summary());
            Ok(())
        }
        Commands::Mine { text } => {
            let mined = parser::mine(&text);
            println!("{}", serde_json::to_string_pretty(&mined)?);
            Ok(())
        }
        Commands::Locate {
            longitude,
            latitude,
            province_geojson,
        } => {
            let regions = GeometryClassifier::from_file(&province_geojson)?;
            match regions.locate(longitude, latitude) {
                Some(id) => println!("{}", id),
                None => println!(
                    "{} (outside all {} regions)",
                    slug::province_id(geo::UNKNOWN_REGION),
                    regions.regions().len()
                ),
            }
            Ok(())
        }
        Commands::Stages => {
            let settings = Settings::load(&cli.config_dir)?;
            let pipeline = Pipeline::new(&StageName::CANONICAL, &settings, Resources::default())?;
            for stage in pipeline.stages() {
                let keys = |ks: &[stages::BagKey]| {
                    ks.iter().map(ToString::to_string).collect::<Vec<_>>().join(", ")
                };
                println!(
                    "{:<10} needs [{}] -> adds [{}]",
                    stage.name(),
                    keys(stage.requires()),
                    keys(stage.produces())
                );
            }
            Ok(())
        }
    };

    let elapsed = t0.elapsed();
    if elapsed.as_secs() >= 1 {
        println!("\nDone in {}", format_duration(elapsed));
    }

    result
}

fn load_classifier(
    strategy: Strategy,
    mappings: Option<&Path>,
    rules: Option<&Path>,
) -> anyhow::Result<Arc<dyn KindClassifier>> {
    Ok(match strategy {
        Strategy::Table => {
            let table = match mappings {
                Some(path) => TableClassifier::from_file(path)?,
                None => {
                    warn!("No kind mappings given, every place gets {}", kind::DEFAULT_KIND);
                    TableClassifier::new(Default::default())
                }
            };
            info!("Loaded {} kind mappings", table.len());
            Arc::new(table)
        }
        Strategy::Heuristic => {
            let rules = match rules {
                Some(path) => KindRules::from_file(path)?,
                None => KindRules::builtin(),
            };
            Arc::new(HeuristicClassifier::new(rules))
        }
    })
}

fn format_duration(d: std::time::Duration) -> String {
    let secs = d.as_secs();
    if secs < 60 {
        format!("{:.1}s", d.as_secs_f64())
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}
