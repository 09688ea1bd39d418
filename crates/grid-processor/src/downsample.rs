//! Block downsampling for bounding memory before reprojection.
//!
//! A tile whose longest side exceeds a pixel budget is reduced by an integer
//! factor `f`: every `f x f` block collapses to one output cell. Blocks at the
//! right and bottom edges are truncated rather than padded, so the output
//! shape is `ceil(h / f) x ceil(w / f)` and the origin stays put.

use flood_common::Tile;
use tracing::debug;

use crate::error::Result;

/// Integer reduction factor that brings `max(height, width)` within
/// `max_dimension`.
///
/// Returns 1 when the grid already fits.
pub fn downsample_factor(height: usize, width: usize, max_dimension: usize) -> usize {
    let longest = height.max(width);
    if max_dimension == 0 || longest <= max_dimension {
        return 1;
    }
    longest.div_ceil(max_dimension)
}

/// Downsample a tile so its longest side is at most `max_dimension`.
///
/// Tiles that already fit are moved through untouched.
pub fn downsample(tile: Tile, max_dimension: usize) -> Result<Tile> {
    let factor = downsample_factor(tile.height(), tile.width(), max_dimension);
    downsample_by_factor(tile, factor)
}

/// Reduce a tile by an explicit integer factor.
///
/// A factor of 0 or 1 returns the tile unchanged.
pub fn downsample_by_factor(tile: Tile, factor: usize) -> Result<Tile> {
    if factor <= 1 {
        return Ok(tile);
    }

    let (data, grid, nodata) = tile.into_parts();
    let (data, new_width, new_height) =
        downsample_block(&data, grid.width, grid.height, factor);

    let out_grid = grid.downsampled(factor);
    debug_assert_eq!(out_grid.width, new_width);
    debug_assert_eq!(out_grid.height, new_height);

    debug!(
        factor = factor,
        from_width = grid.width,
        from_height = grid.height,
        to_width = new_width,
        to_height = new_height,
        "Downsampled tile"
    );

    Ok(Tile::new(data, out_grid, nodata)?)
}

/// Block-average a row-major 2D array by `factor` in both axes.
///
/// NaN cells are left out of each block's mean; a block with no valid cell
/// stays NaN.
///
/// # Returns
/// Tuple of (downsampled_data, new_width, new_height)
pub fn downsample_block(
    data: &[f32],
    width: usize,
    height: usize,
    factor: usize,
) -> (Vec<f32>, usize, usize) {
    let factor = factor.max(1);
    let new_width = width.div_ceil(factor);
    let new_height = height.div_ceil(factor);

    let mut output = vec![f32::NAN; new_width * new_height];

    for out_y in 0..new_height {
        let y0 = out_y * factor;
        let y1 = (y0 + factor).min(height);

        for out_x in 0..new_width {
            let x0 = out_x * factor;
            let x1 = (x0 + factor).min(width);

            let block = (y0..y1).flat_map(move |y| data[y * width + x0..y * width + x1].iter().copied());

            output[out_y * new_width + out_x] = mean_of_block(block);
        }
    }

    (output, new_width, new_height)
}

/// Mean of the valid (non-NaN) values in a block; NaN if there are none.
#[inline]
fn mean_of_block(values: impl Iterator<Item = f32>) -> f32 {
    let mut sum = 0.0f64;
    let mut count = 0usize;

    for v in values {
        if !v.is_nan() {
            sum += v as f64;
            count += 1;
        }
    }

    if count == 0 {
        f32::NAN
    } else {
        (sum / count as f64) as f32
    }
}
