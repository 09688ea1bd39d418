//! Flood composite pipeline.
//!
//! Groups flood-depth tiles into events, mosaics each event into one raster,
//! optionally keeps only events touching a set of regions, and merges the
//! survivors into a single global composite.

mod config_loader;

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use flood_common::Crs;
use ingestion::{FloodPipeline, GeoTiffCompression, PipelineConfig, StageReport};
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(name = "flood-pipeline")]
#[command(about = "Mosaic flood-depth tiles into per-event rasters and a global composite")]
struct Args {
    /// Configuration file path
    #[arg(short, long, env = "FLOOD_CONFIG", global = true)]
    config: Option<PathBuf>,

    /// Log level
    #[arg(long, default_value = "info", global = true)]
    log_level: String,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    log_json: bool,

    /// Worker threads for per-event processing (default: all cores)
    #[arg(long, env = "FLOOD_THREADS", global = true)]
    threads: Option<usize>,

    /// Recompute outputs that already exist
    #[arg(long, global = true)]
    force: bool,

    #[command(flatten)]
    overrides: Overrides,

    #[command(subcommand)]
    command: Command,
}

/// Flags that take precedence over the configuration file.
#[derive(clap::Args, Debug, Default)]
struct Overrides {
    /// Root directory of the source tiles
    #[arg(long, global = true)]
    input_dir: Option<PathBuf>,

    /// Output directory for per-event rasters
    #[arg(long, global = true)]
    events_dir: Option<PathBuf>,

    /// Output directory for region-filtered rasters
    #[arg(long, global = true)]
    filtered_dir: Option<PathBuf>,

    /// Path of the global composite
    #[arg(long, global = true)]
    composite_path: Option<PathBuf>,

    /// Per-event size cap in pixels
    #[arg(long, global = true)]
    max_event_dimension: Option<usize>,

    /// Global composite size cap in pixels
    #[arg(long, global = true)]
    max_global_dimension: Option<usize>,

    /// CRS assumed for tiles without one (e.g. EPSG:27704)
    #[arg(long, global = true)]
    default_crs: Option<String>,

    /// CRS of the outputs (e.g. EPSG:4326)
    #[arg(long, global = true)]
    output_crs: Option<String>,

    /// Region to keep; repeat for several
    #[arg(long = "region", global = true)]
    regions: Vec<String>,

    /// GeoJSON file with the region polygons
    #[arg(long, global = true)]
    region_file: Option<PathBuf>,

    /// Process events one at a time
    #[arg(long, global = true)]
    sequential: bool,

    /// Output compression: lzw, deflate or none
    #[arg(long, global = true)]
    compression: Option<String>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Mosaic every event into one raster
    Events,
    /// Copy the event rasters that touch the configured regions
    Filter,
    /// Merge the event rasters into the global composite
    Composite,
    /// Run every stage in order
    Run,
    /// Print the effective configuration as YAML
    ShowConfig,
}

impl Overrides {
    fn apply(self, config: &mut PipelineConfig) -> Result<()> {
        if let Some(dir) = self.input_dir {
            config.input_dir = dir;
        }
        if let Some(dir) = self.events_dir {
            config.events_dir = dir;
        }
        if let Some(dir) = self.filtered_dir {
            config.filtered_dir = dir;
        }
        if let Some(path) = self.composite_path {
            config.composite_path = Some(path);
        }
        if let Some(size) = self.max_event_dimension {
            config.max_event_dimension = size;
        }
        if let Some(size) = self.max_global_dimension {
            config.max_global_dimension = size;
        }
        if let Some(crs) = self.default_crs {
            config.default_crs =
                Crs::parse(&crs).with_context(|| format!("Invalid --default-crs {}", crs))?;
        }
        if let Some(crs) = self.output_crs {
            config.output_crs =
                Crs::parse(&crs).with_context(|| format!("Invalid --output-crs {}", crs))?;
        }
        if !self.regions.is_empty() {
            config.regions = self.regions;
        }
        if let Some(path) = self.region_file {
            config.region_file = Some(path);
        }
        if self.sequential {
            config.parallel_events = false;
        }
        if let Some(compression) = self.compression {
            config.compression = GeoTiffCompression::from_str(&compression);
        }
        Ok(())
    }
}

fn init_tracing(log_level: &str, json: bool) -> Result<()> {
    let level = match log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let builder = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(true);

    if json {
        tracing::subscriber::set_global_default(builder.json().finish())?;
    } else {
        tracing::subscriber::set_global_default(builder.finish())?;
    }
    Ok(())
}

fn main() -> Result<ExitCode> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    let args = Args::parse();
    init_tracing(&args.log_level, args.log_json)?;

    let mut config = config_loader::load_pipeline_config(args.config.as_deref())?;
    args.overrides.apply(&mut config)?;
    config
        .validate()
        .map_err(anyhow::Error::msg)
        .context("Invalid pipeline configuration")?;

    if let Command::ShowConfig = args.command {
        print!("{}", serde_yaml::to_string(&config)?);
        return Ok(ExitCode::SUCCESS);
    }

    if let Some(threads) = args.threads {
        rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .build_global()
            .context("Failed to configure worker threads")?;
    }

    info!(
        input_dir = %config.input_dir.display(),
        events_dir = %config.events_dir.display(),
        output_crs = %config.output_crs,
        regions = ?config.regions,
        "Starting flood pipeline"
    );

    let pipeline = FloodPipeline::new(config)?.with_force(args.force);

    let reports: Vec<StageReport> = match args.command {
        Command::Events => vec![pipeline.process_events()?],
        Command::Filter => vec![pipeline.filter_events()?],
        Command::Composite => vec![pipeline.composite_events()?],
        Command::Run => pipeline.run_all()?,
        Command::ShowConfig => Vec::new(),
    };

    let failed: usize = reports.iter().map(|r| r.failed).sum();
    if failed > 0 {
        for report in &reports {
            for (unit, message) in &report.failures {
                error!(stage = %report.stage, unit = %unit, error = %message, "Failed");
            }
        }
        return Ok(ExitCode::from(2));
    }

    info!("Flood pipeline finished");
    Ok(ExitCode::SUCCESS)
}
