//! Per-event mosaicking.
//!
//! All tiles of one event are brought onto the grid of the first tile and
//! reduced with a pixel-wise maximum. Tiles are downsampled *before* they
//! are reprojected, all with the factor derived from the first tile, so the
//! full-resolution reprojected array is never materialized and every tile
//! lands on the same reference resolution.

use flood_common::{Crs, GridDescriptor, Tile};
use projection::TransformerCache;
use tracing::debug;

use crate::accumulate::MaxAccumulator;
use crate::config::MosaicConfig;
use crate::downsample::{downsample_by_factor, downsample_factor};
use crate::error::{GridProcessorError, Result};
use crate::projection::reproject;
use crate::types::ResampleMethod;

/// Incremental mosaic of one event.
///
/// Built from the event's first tile, which fixes the downsample factor and
/// the reference grid; further tiles are streamed in with [`EventMosaic::add`].
#[derive(Debug)]
pub struct EventMosaic {
    factor: usize,
    default_crs: Crs,
    accumulator: MaxAccumulator,
    tiles: usize,
}

impl EventMosaic {
    /// Start a mosaic from the event's first tile.
    pub fn new(first: Tile, config: &MosaicConfig, cache: &TransformerCache) -> Result<Self> {
        config.validate().map_err(GridProcessorError::ConfigError)?;
        let factor = downsample_factor(first.height(), first.width(), config.max_dimension);
        let first = prepare(first, factor, &config.default_crs)?;

        debug!(
            factor = factor,
            width = first.width(),
            height = first.height(),
            "Event reference grid"
        );

        let mut mosaic = Self {
            factor,
            default_crs: config.default_crs.clone(),
            accumulator: MaxAccumulator::new(first.grid().clone()),
            tiles: 0,
        };
        mosaic.merge_prepared(first, cache)?;
        Ok(mosaic)
    }

    /// Downsample, reproject and merge one more tile.
    pub fn add(&mut self, tile: Tile, cache: &TransformerCache) -> Result<()> {
        let tile = prepare(tile, self.factor, &self.default_crs)?;
        self.merge_prepared(tile, cache)
    }

    /// Downsample factor shared by every tile of the event.
    pub fn factor(&self) -> usize {
        self.factor
    }

    /// Reference grid all tiles are aligned to.
    pub fn grid(&self) -> &GridDescriptor {
        self.accumulator.grid()
    }

    /// Number of tiles merged so far.
    pub fn tile_count(&self) -> usize {
        self.tiles
    }

    pub fn finish(self) -> Result<Tile> {
        self.accumulator.into_tile()
    }

    fn merge_prepared(&mut self, tile: Tile, cache: &TransformerCache) -> Result<()> {
        let aligned = if tile.grid() == self.accumulator.grid() {
            tile
        } else {
            reproject(&tile, self.accumulator.grid(), ResampleMethod::Average, cache)?
        };

        self.accumulator.merge_tile(&aligned.normalize_validity())?;
        self.tiles += 1;
        Ok(())
    }
}

/// Mosaic all tiles of one event into a single tile.
///
/// The output grid and CRS are those of the first (downsampled) tile.
///
/// # Errors
/// * `EmptyInput` when `tiles` yields nothing.
/// * Any reprojection error from an individual tile.
pub fn mosaic<I>(tiles: I, config: &MosaicConfig, cache: &TransformerCache) -> Result<Tile>
where
    I: IntoIterator<Item = Tile>,
{
    let mut tiles = tiles.into_iter();
    let first = tiles
        .next()
        .ok_or_else(|| GridProcessorError::empty_input("event has no tiles"))?;

    let mut mosaic = EventMosaic::new(first, config, cache)?;
    for tile in tiles {
        mosaic.add(tile, cache)?;
    }
    mosaic.finish()
}

/// Resolve the CRS, mask the sentinel and apply the shared downsample factor.
fn prepare(tile: Tile, factor: usize, default_crs: &Crs) -> Result<Tile> {
    let tile = tile.with_default_crs(default_crs).mask_nodata();
    downsample_by_factor(tile, factor)
}
