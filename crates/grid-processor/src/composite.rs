//! Global composite of event tiles.
//!
//! Compositing runs in two passes so the caller never has to hold more than
//! one event tile at a time:
//!
//! 1. [`GlobalExtent::scan`] walks the grid descriptors only, checks the CRS
//!    contract and builds the union extent.
//! 2. [`Compositor`] allocates the single global accumulator and merges tiles
//!    into it one at a time.
//!
//! Peak memory is one global grid plus one tile, regardless of the number
//! of events.

use flood_common::{BoundingBox, Crs, GeoTransform, GridDescriptor, Tile};
use projection::TransformerCache;
use tracing::{debug, info};

use crate::accumulate::MaxAccumulator;
use crate::config::CompositeConfig;
use crate::error::{GridProcessorError, Result};
use crate::projection::reproject;
use crate::projection::reproject::dims_for;
use crate::types::ResampleMethod;

/// Union footprint of all composite inputs.
#[derive(Debug, Clone, PartialEq)]
pub struct GlobalExtent {
    pub bbox: BoundingBox,
    /// Pixel size magnitudes `(res_x, res_y)` of the first input.
    pub resolution: (f64, f64),
    pub crs: Crs,
    /// Number of grids scanned.
    pub inputs: usize,
}

impl GlobalExtent {
    /// Build the union extent over `grids`.
    ///
    /// # Errors
    /// * `MissingCrs` / `CrsMismatch` when any grid is not exactly in
    ///   `target_crs`. Inputs are never reprojected between CRSs here.
    /// * `EmptyInput` when there are no grids.
    pub fn scan<'a, I>(grids: I, target_crs: &Crs) -> Result<Self>
    where
        I: IntoIterator<Item = &'a GridDescriptor>,
    {
        let mut bbox = BoundingBox::empty();
        let mut resolution = None;
        let mut inputs = 0;

        for grid in grids {
            check_crs(grid, target_crs)?;
            resolution.get_or_insert_with(|| grid.resolution());
            bbox = bbox.union(&grid.bbox());
            inputs += 1;
        }

        let resolution =
            resolution.ok_or_else(|| GridProcessorError::empty_input("no tiles to composite"))?;

        if !bbox.is_finite() {
            return Err(flood_common::FloodError::invalid_grid("union extent is not finite").into());
        }

        Ok(Self {
            bbox,
            resolution,
            crs: target_crs.clone(),
            inputs,
        })
    }

    /// Global grid covering the extent, capped at `max_dimension` pixels
    /// along its longest side.
    ///
    /// Native dimensions come from the reference resolution. Above the cap
    /// both dimensions are divided (rounding up) by the smallest integer
    /// factor that satisfies it. Pixel size is then the extent divided by
    /// the dimensions.
    pub fn grid(&self, max_dimension: usize) -> Result<GridDescriptor> {
        let (native_w, native_h) = dims_for(&self.bbox, self.resolution.0, self.resolution.1);

        let longest = native_w.max(native_h);
        let factor = if max_dimension > 0 && longest > max_dimension {
            longest.div_ceil(max_dimension)
        } else {
            1
        };
        let width = native_w.div_ceil(factor);
        let height = native_h.div_ceil(factor);

        debug!(
            native_width = native_w,
            native_height = native_h,
            factor = factor,
            width = width,
            height = height,
            "Global grid dimensions"
        );

        let transform = GeoTransform::from_bounds(&self.bbox, width, height);
        Ok(GridDescriptor::new(Some(self.crs.clone()), transform, width, height)?)
    }
}

/// Streaming max-merge into one global grid.
#[derive(Debug)]
pub struct Compositor {
    target_crs: Crs,
    accumulator: MaxAccumulator,
    merged: usize,
}

impl Compositor {
    pub fn new(extent: &GlobalExtent, max_dimension: usize) -> Result<Self> {
        let grid = extent.grid(max_dimension)?;
        info!(
            width = grid.width,
            height = grid.height,
            inputs = extent.inputs,
            "Allocated global composite grid"
        );
        Ok(Self {
            target_crs: extent.crs.clone(),
            accumulator: MaxAccumulator::new(grid),
            merged: 0,
        })
    }

    pub fn grid(&self) -> &GridDescriptor {
        self.accumulator.grid()
    }

    /// Number of tiles merged so far.
    pub fn merged(&self) -> usize {
        self.merged
    }

    /// Reproject (nearest neighbour), normalize and merge one tile.
    pub fn add(&mut self, tile: &Tile, cache: &TransformerCache) -> Result<()> {
        check_crs(tile.grid(), &self.target_crs)?;

        let aligned = reproject(tile, self.accumulator.grid(), ResampleMethod::Nearest, cache)?;
        self.accumulator.merge_tile(&aligned.normalize_validity())?;
        self.merged += 1;
        Ok(())
    }

    pub fn finish(self) -> Result<Tile> {
        self.accumulator.into_tile()
    }
}

/// Composite in-memory tiles into one global tile.
pub fn composite(tiles: &[Tile], config: &CompositeConfig, cache: &TransformerCache) -> Result<Tile> {
    config.validate().map_err(GridProcessorError::ConfigError)?;
    let extent = GlobalExtent::scan(tiles.iter().map(Tile::grid), &config.target_crs)?;
    let mut compositor = Compositor::new(&extent, config.max_dimension)?;
    for tile in tiles {
        compositor.add(tile, cache)?;
    }
    compositor.finish()
}

/// Composite inputs must already be in the target CRS.
pub fn check_crs(grid: &GridDescriptor, target_crs: &Crs) -> Result<()> {
    match &grid.crs {
        None => Err(GridProcessorError::missing_crs(format!(
            "composite input has no CRS, expected {}",
            target_crs
        ))),
        Some(crs) if crs != target_crs => Err(GridProcessorError::crs_mismatch(target_crs, crs)),
        Some(_) => Ok(()),
    }
}
