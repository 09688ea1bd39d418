//! Batch stages: per-event mosaics, region filter, global composite.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use flood_common::{Crs, Tile};
use grid_processor::{
    check_crs, reproject, target_grid_for_crs, Compositor, EventMosaic, GlobalExtent,
    GridProcessorError, ResampleMethod,
};
use projection::TransformerCache;
use rayon::prelude::*;
use tracing::{debug, info, warn};

use crate::config::PipelineConfig;
use crate::error::{IngestionError, Result};
use crate::events::{group_by_event, DateRangeKey, Event, EventKey, EventKeyStrategy, COMPOSITE_FILE_NAME};
use crate::geotiff;
use crate::region::RegionGeometry;
use crate::report::StageReport;
use crate::scan::{find_rasters, ScanOptions};

/// Number of samples per edge when moving a raster footprint into the
/// region CRS.
const FOOTPRINT_DENSIFY: usize = 11;

/// Result of processing one event.
#[derive(Debug)]
pub enum EventOutcome {
    Written(PathBuf),
    SkippedExisting(PathBuf),
}

/// The flood composite pipeline.
pub struct FloodPipeline {
    config: PipelineConfig,
    strategy: Box<dyn EventKeyStrategy>,
    force: bool,
}

impl FloodPipeline {
    /// Create a pipeline for a validated configuration.
    pub fn new(config: PipelineConfig) -> Result<Self> {
        config.validate().map_err(IngestionError::InvalidConfig)?;
        let strategy = Box::new(DateRangeKey::new(config.event_prefix.clone()));
        Ok(Self {
            config,
            strategy,
            force: false,
        })
    }

    /// Use a different event naming scheme.
    pub fn with_strategy(mut self, strategy: Box<dyn EventKeyStrategy>) -> Self {
        self.strategy = strategy;
        self
    }

    /// Recompute outputs that already exist.
    pub fn with_force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    // ========================================================================
    // Stage 1: per-event mosaics
    // ========================================================================

    /// Scan the input tree and group the tiles into events.
    ///
    /// Files under the events or filtered directories are ignored so outputs
    /// nested inside the input tree are never read back as sources.
    pub fn discover_events(&self) -> Result<BTreeMap<EventKey, Event>> {
        let files: Vec<PathBuf> = find_rasters(&self.config.input_dir, &ScanOptions::default())?
            .into_iter()
            .filter(|p| !p.starts_with(&self.config.events_dir) && !p.starts_with(&self.config.filtered_dir))
            .collect();

        let events = group_by_event(files, self.strategy.as_ref());
        info!(
            input_dir = %self.config.input_dir.display(),
            events = events.len(),
            "Grouped tiles into events"
        );
        Ok(events)
    }

    /// Mosaic every event and write one raster per event.
    ///
    /// A failing event is logged and counted; the remaining events still run.
    pub fn process_events(&self) -> Result<StageReport> {
        let events = self.discover_events()?;
        std::fs::create_dir_all(&self.config.events_dir)?;

        let events: Vec<&Event> = events.values().collect();
        let total = events.len();

        let run = |(index, event): (usize, &&Event)| {
            info!(
                event = %event.key,
                index = index + 1,
                total = total,
                files = event.sources.len(),
                "Processing event"
            );
            (event.key.clone(), self.process_event(event))
        };

        let outcomes: Vec<(EventKey, Result<EventOutcome>)> = if self.config.parallel_events {
            events.par_iter().enumerate().map(run).collect()
        } else {
            events.iter().enumerate().map(run).collect()
        };

        let mut report = StageReport::new("events");
        for (key, outcome) in outcomes {
            match outcome {
                Ok(EventOutcome::Written(path)) => {
                    info!(event = %key, path = %path.display(), "Saved event raster");
                    report.processed += 1;
                }
                Ok(EventOutcome::SkippedExisting(path)) => {
                    info!(event = %key, path = %path.display(), "Already processed, skipping");
                    report.skipped_existing += 1;
                }
                Err(e) => {
                    warn!(event = %key, error = %e, "Event processing failed");
                    report.record_failure(key.as_str(), e);
                }
            }
        }

        report.log();
        Ok(report)
    }

    /// Process one event with its own transformer cache.
    pub fn process_event(&self, event: &Event) -> Result<EventOutcome> {
        let out_path = self.config.events_dir.join(event.output_file_name());
        if out_path.exists() && !self.force {
            return Ok(EventOutcome::SkippedExisting(out_path));
        }

        let cache = TransformerCache::new();
        let tile = self
            .build_event_tile(event, &cache)
            .map_err(|e| e.in_event(event.key.as_str()))?;

        geotiff::write_tile(&out_path, &tile, self.config.compression)
            .map_err(|e| e.in_event(event.key.as_str()))?;
        Ok(EventOutcome::Written(out_path))
    }

    /// Mosaic an event's sources and warp the result to the output CRS.
    ///
    /// Sources are read one at a time and folded into the mosaic.
    pub fn build_event_tile(&self, event: &Event, cache: &TransformerCache) -> Result<Tile> {
        let mut sources = event.sources.iter();
        let first_path = sources.next().ok_or_else(|| {
            grid_processor::GridProcessorError::empty_input(format!("event {} has no files", event.key))
        })?;

        let mut mosaic = EventMosaic::new(
            geotiff::read_tile(first_path)?,
            &self.config.mosaic_config(),
            cache,
        )?;
        if mosaic.factor() > 1 {
            info!(event = %event.key, factor = mosaic.factor(), "Downsampling event tiles");
        }

        for path in sources {
            debug!(event = %event.key, path = %path.display(), "Adding tile");
            mosaic.add(geotiff::read_tile(path)?, cache)?;
        }

        let merged = mosaic.finish()?;
        to_output_crs(merged, &self.config.output_crs, cache)
    }

    // ========================================================================
    // Stage 2: region filter
    // ========================================================================

    /// Load the configured region geometry.
    pub fn load_region(&self) -> Result<RegionGeometry> {
        let path = self
            .config
            .region_file
            .as_ref()
            .ok_or_else(|| IngestionError::InvalidConfig("region_file is not set".to_string()))?;
        RegionGeometry::from_file(
            path,
            self.config.regions.as_slice(),
            self.config.region_name_fields.as_slice(),
        )
    }

    /// Copy the event rasters that touch the configured region.
    pub fn filter_events(&self) -> Result<StageReport> {
        let region = self.load_region()?;
        let report = filter_events(
            &self.config.events_dir,
            &region,
            &self.config.filtered_dir,
            &TransformerCache::new(),
        )?;
        Ok(report)
    }

    // ========================================================================
    // Stage 3: global composite
    // ========================================================================

    /// Merge all event rasters into one global raster.
    ///
    /// Skipped when the output exists unless forced. Any input not in the
    /// output CRS aborts the stage.
    pub fn composite_events(&self) -> Result<StageReport> {
        let input_dir = self.config.composite_input_dir();
        let output = self.config.composite_output_path();
        let mut report = StageReport::new("composite");

        let output_name = output
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or(COMPOSITE_FILE_NAME);
        let files = find_rasters(
            input_dir,
            &ScanOptions::flat_excluding(&[COMPOSITE_FILE_NAME, output_name]),
        )?;

        if files.is_empty() {
            warn!(input_dir = %input_dir.display(), "No per-event rasters to composite");
            report.record_failure(
                input_dir.display().to_string(),
                GridProcessorError::empty_input("no per-event rasters to composite"),
            );
            report.log();
            return Ok(report);
        }

        if output.exists() && !self.force {
            info!(path = %output.display(), "Composite already exists, skipping");
            report.skipped_existing = 1;
            report.log();
            return Ok(report);
        }

        let composite_config = self.config.composite_config();
        let cache = TransformerCache::new();

        // Pass 1: headers only. A CRS problem aborts the stage.
        let mut inputs = Vec::with_capacity(files.len());
        for path in &files {
            match geotiff::read_grid(path) {
                Ok(grid) => {
                    check_crs(&grid, &composite_config.target_crs)
                        .map_err(|e| IngestionError::from(e).in_event(file_label(path)))?;
                    inputs.push((path, grid));
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Unreadable composite input, skipping");
                    report.record_failure(file_label(path), e);
                }
            }
        }

        if inputs.is_empty() {
            warn!(input_dir = %input_dir.display(), "No readable per-event rasters to composite");
            report.record_failure(
                input_dir.display().to_string(),
                GridProcessorError::empty_input("no readable per-event rasters to composite"),
            );
            report.log();
            return Ok(report);
        }

        let extent = GlobalExtent::scan(inputs.iter().map(|(_, grid)| grid), &composite_config.target_crs)?;

        info!(
            inputs = extent.inputs,
            min_x = extent.bbox.min_x,
            min_y = extent.bbox.min_y,
            max_x = extent.bbox.max_x,
            max_y = extent.bbox.max_y,
            res_x = extent.resolution.0,
            res_y = extent.resolution.1,
            "Computed global extent"
        );

        // Pass 2: one tile in memory at a time
        let mut compositor = Compositor::new(&extent, composite_config.max_dimension)?;
        for (path, _) in &inputs {
            debug!(path = %path.display(), "Merging into composite");
            let tile = match geotiff::read_tile(path) {
                Ok(tile) => tile,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Unreadable composite input, skipping");
                    report.record_failure(file_label(path), e);
                    continue;
                }
            };
            compositor
                .add(&tile, &cache)
                .map_err(|e| IngestionError::from(e).in_event(file_label(path)))?;
            report.processed += 1;
        }

        let tile = compositor.finish()?;
        geotiff::write_tile(&output, &tile, self.config.compression)?;
        info!(
            path = %output.display(),
            width = tile.width(),
            height = tile.height(),
            valid_cells = tile.valid_count(),
            "Saved global composite"
        );

        report.log();
        Ok(report)
    }

    /// Run every stage in order. The filter stage runs only when regions are
    /// configured.
    pub fn run_all(&self) -> Result<Vec<StageReport>> {
        let mut reports = vec![self.process_events()?];
        if self.config.filter_enabled() {
            reports.push(self.filter_events()?);
        }
        reports.push(self.composite_events()?);
        Ok(reports)
    }
}

/// Warp `tile` into `crs` unless it is already there.
fn to_output_crs(tile: Tile, crs: &Crs, cache: &TransformerCache) -> Result<Tile> {
    if tile.crs() == Some(crs) {
        return Ok(tile);
    }
    let grid = target_grid_for_crs(tile.grid(), crs, cache)?;
    debug!(
        crs = %crs,
        width = grid.width,
        height = grid.height,
        "Warping event to output CRS"
    );
    Ok(reproject(&tile, &grid, ResampleMethod::Nearest, cache)?)
}

fn file_label(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// Copy every raster in `input_dir` whose bounding box touches `region`
/// into `output_dir`.
///
/// Footprints in another CRS are moved into the region's CRS first; a
/// raster without a CRS is assumed to already be in it. Unreadable rasters
/// are counted as failures and the scan continues.
pub fn filter_events(
    input_dir: &Path,
    region: &RegionGeometry,
    output_dir: &Path,
    cache: &TransformerCache,
) -> Result<StageReport> {
    std::fs::create_dir_all(output_dir)?;
    let files = find_rasters(input_dir, &ScanOptions::flat_excluding(&[COMPOSITE_FILE_NAME]))?;
    let mut report = StageReport::new("filter");

    if files.is_empty() {
        warn!(input_dir = %input_dir.display(), "No event rasters to filter");
    }

    for path in &files {
        let name = file_label(path);
        match event_touches_region(path, region, cache) {
            Ok(true) => match std::fs::copy(path, output_dir.join(&name)) {
                Ok(_) => {
                    info!(file = %name, "Keep");
                    report.kept += 1;
                }
                Err(e) => {
                    warn!(file = %name, error = %e, "Could not copy kept event");
                    report.record_failure(name, e);
                }
            },
            Ok(false) => {
                info!(file = %name, "Skip");
                report.discarded += 1;
            }
            Err(e) => {
                warn!(file = %name, error = %e, "Could not test event against region");
                report.record_failure(name, e);
            }
        }
    }

    info!(
        regions = ?region.names,
        kept = report.kept,
        skipped = report.discarded,
        output_dir = %output_dir.display(),
        "Filtered events"
    );
    report.log();
    Ok(report)
}

fn event_touches_region(path: &Path, region: &RegionGeometry, cache: &TransformerCache) -> Result<bool> {
    let grid = geotiff::read_grid(path)?;
    let bbox = match &grid.crs {
        Some(crs) if *crs != region.crs => cache
            .get(crs, &region.crs)?
            .transform_bounds(&grid.bbox(), FOOTPRINT_DENSIFY)?,
        Some(_) => grid.bbox(),
        None => {
            warn!(path = %path.display(), region_crs = %region.crs, "Raster has no CRS, assuming region CRS");
            grid.bbox()
        }
    };
    Ok(region.intersects_bbox(&bbox))
}
