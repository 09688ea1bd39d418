//! Reprojection of tiles onto arbitrary target grids.
//!
//! Every output cell centre is carried back into the source tile:
//!
//! ```text
//! output pixel ─affine─► target world ─CRS─► source world ─inverse affine─► source pixel
//! ```
//!
//! and sampled there with the requested kernel. Output cells whose centre
//! lands outside the source footprint are `NaN`.

use flood_common::{BoundingBox, Crs, GeoTransform, GridDescriptor, Tile};
use projection::{CrsTransformer, TransformerCache};
use tracing::debug;

use super::interpolation::sample;
use crate::error::{GridProcessorError, Result};
use crate::types::ResampleMethod;

/// Number of samples per edge when transforming bounds between CRSs.
const BOUNDS_DENSIFY: usize = 21;

/// Reproject `tile` onto `target`.
///
/// The returned tile's grid is exactly `target`. The source sentinel is
/// masked before sampling, so the output carries no sentinel and `NaN`
/// marks every cell without data.
///
/// # Errors
/// * `MissingCrs` when the tile or the target grid has no CRS. No CRS is
///   ever assumed here.
/// * `CrsMismatch` when no transformation between the two CRSs can be built.
pub fn reproject(
    tile: &Tile,
    target: &GridDescriptor,
    method: ResampleMethod,
    cache: &TransformerCache,
) -> Result<Tile> {
    let src_crs = tile
        .crs()
        .ok_or_else(|| GridProcessorError::missing_crs("source tile has no CRS"))?;
    let dst_crs = target
        .crs
        .as_ref()
        .ok_or_else(|| GridProcessorError::missing_crs("target grid has no CRS"))?;

    if tile.grid() == target {
        return Ok(tile.clone().mask_nodata());
    }

    // Output pixels are mapped target -> source, so the transformer runs
    // in that direction.
    let transformer = cache.get(dst_crs, src_crs).map_err(|e| {
        debug!(error = %e, "Transformer construction failed");
        GridProcessorError::crs_mismatch(dst_crs, src_crs)
    })?;

    let src_grid = tile.grid();
    let src = masked_values(tile);
    let (src_w, src_h) = (src_grid.width, src_grid.height);

    let scale = match method {
        ResampleMethod::Average => footprint_scale(target, src_grid, &transformer),
        ResampleMethod::Nearest => (1.0, 1.0),
    };
    debug!(
        method = %method,
        from = %src_crs,
        to = %dst_crs,
        width = target.width,
        height = target.height,
        "Reprojecting tile"
    );

    let mut output = vec![f32::NAN; target.len()];

    for row in 0..target.height {
        for col in 0..target.width {
            let Some((sx, sy)) = source_position(
                target,
                src_grid,
                &transformer,
                col as f64 + 0.5,
                row as f64 + 0.5,
            ) else {
                continue;
            };

            output[row * target.width + col] = sample(&src, src_w, src_h, sx, sy, method, scale);
        }
    }

    Ok(Tile::new(output, target.clone(), None)?)
}

/// Output grid for warping `grid` into `dst_crs`.
///
/// The source footprint is transformed with densified edges; pixels are
/// square and sized so the output keeps the source pixel count along the
/// diagonal. A grid already in `dst_crs` is returned unchanged.
pub fn target_grid_for_crs(
    grid: &GridDescriptor,
    dst_crs: &Crs,
    cache: &TransformerCache,
) -> Result<GridDescriptor> {
    let src_crs = grid
        .crs
        .as_ref()
        .ok_or_else(|| GridProcessorError::missing_crs("grid has no CRS"))?;

    if src_crs == dst_crs {
        return Ok(grid.clone());
    }

    let transformer = cache
        .get(src_crs, dst_crs)
        .map_err(|_| GridProcessorError::crs_mismatch(dst_crs, src_crs))?;
    let bounds = transformer.transform_bounds(&grid.bbox(), BOUNDS_DENSIFY)?;

    let src_diagonal = (grid.width as f64).hypot(grid.height as f64);
    let dst_diagonal = bounds.width().hypot(bounds.height());
    let res = dst_diagonal / src_diagonal;

    let (width, height) = dims_for(&bounds, res, res);
    let transform = GeoTransform::north_up(bounds.min_x, bounds.max_y, res, -res);

    debug!(
        from = %src_crs,
        to = %dst_crs,
        width = width,
        height = height,
        resolution = res,
        "Computed warp output grid"
    );

    Ok(GridDescriptor::new(Some(dst_crs.clone()), transform, width, height)?)
}

/// Pixel counts covering `bounds` at the given resolution, at least 1x1.
pub(crate) fn dims_for(bounds: &BoundingBox, res_x: f64, res_y: f64) -> (usize, usize) {
    // The epsilon keeps exact multiples from gaining a column to rounding.
    let width = (bounds.width() / res_x - 1e-9).ceil().max(1.0) as usize;
    let height = (bounds.height() / res_y - 1e-9).ceil().max(1.0) as usize;
    (width, height)
}

fn masked_values(tile: &Tile) -> Vec<f32> {
    match tile.nodata() {
        Some(_) => tile.clone().mask_nodata().into_parts().0,
        None => tile.data().to_vec(),
    }
}

/// Map a corner-based target pixel position into source pixel space.
#[inline]
fn source_position(
    target: &GridDescriptor,
    src_grid: &GridDescriptor,
    transformer: &CrsTransformer,
    col: f64,
    row: f64,
) -> Option<(f64, f64)> {
    let (tx, ty) = target.pixel_to_world(col, row);
    let (sx, sy) = transformer.transform(tx, ty)?;
    src_grid.world_to_pixel(sx, sy)
}

/// Size of one target pixel in source pixels, measured at the target centre.
fn footprint_scale(
    target: &GridDescriptor,
    src_grid: &GridDescriptor,
    transformer: &CrsTransformer,
) -> (f64, f64) {
    let col = (target.width / 2) as f64 + 0.5;
    let row = (target.height / 2) as f64 + 0.5;

    let centre = source_position(target, src_grid, transformer, col, row);
    let right = source_position(target, src_grid, transformer, col + 1.0, row);
    let below = source_position(target, src_grid, transformer, col, row + 1.0);

    match (centre, right, below) {
        (Some(c), Some(r), Some(b)) => {
            let sx = (r.0 - c.0).hypot(r.1 - c.1);
            let sy = (b.0 - c.0).hypot(b.1 - c.1);
            if sx.is_finite() && sy.is_finite() {
                (sx, sy)
            } else {
                (1.0, 1.0)
            }
        }
        _ => (1.0, 1.0),
    }
}
