//! Sampling kernels for grid resampling.
//!
//! All kernels take corner-based fractional pixel coordinates: `(0, 0)` is
//! the top-left corner of the first cell and `(0.5, 0.5)` its centre. A
//! coordinate outside `[0, width) x [0, height)` samples nothing and yields
//! `NaN`.

use crate::types::ResampleMethod;

/// Nearest neighbor interpolation.
///
/// Returns the value of the cell containing `(x, y)`.
pub fn nearest_interpolate(data: &[f32], width: usize, height: usize, x: f64, y: f64) -> f32 {
    if !in_bounds(width, height, x, y) {
        return f32::NAN;
    }

    let col = (x.floor() as usize).min(width - 1);
    let row = (y.floor() as usize).min(height - 1);
    data[row * width + col]
}

/// Area-weighted average over a destination pixel footprint.
///
/// `scale` is the size of one destination pixel measured in source pixels
/// along each axis. The footprint is centred on `(x, y)` with half-width
/// `max(scale / 2, 0.5)`; each source cell contributes in proportion to its
/// overlap with it. NaN cells are skipped. Returns NaN when nothing valid is
/// covered.
pub fn average_interpolate(
    data: &[f32],
    width: usize,
    height: usize,
    x: f64,
    y: f64,
    scale: (f64, f64),
) -> f32 {
    if !in_bounds(width, height, x, y) {
        return f32::NAN;
    }

    let hx = (scale.0 / 2.0).max(0.5);
    let hy = (scale.1 / 2.0).max(0.5);

    let x_min = ((x - hx).floor().max(0.0)) as usize;
    let x_max = ((x + hx).ceil() as usize).min(width);
    let y_min = ((y - hy).floor().max(0.0)) as usize;
    let y_max = ((y + hy).ceil() as usize).min(height);

    if x_min >= x_max || y_min >= y_max {
        return f32::NAN;
    }

    let mut weighted_sum = 0.0_f64;
    let mut total_weight = 0.0_f64;

    for iy in y_min..y_max {
        let oy = overlap(iy, y, hy);
        if oy <= 0.0 {
            continue;
        }

        for ix in x_min..x_max {
            let val = data[iy * width + ix];
            if val.is_nan() {
                continue;
            }

            let w = overlap(ix, x, hx) * oy;
            weighted_sum += w * val as f64;
            total_weight += w;
        }
    }

    if total_weight < 1e-15 {
        return f32::NAN;
    }
    (weighted_sum / total_weight) as f32
}

/// Sample `data` at `(x, y)` with the given method.
#[inline]
pub fn sample(
    data: &[f32],
    width: usize,
    height: usize,
    x: f64,
    y: f64,
    method: ResampleMethod,
    scale: (f64, f64),
) -> f32 {
    match method {
        ResampleMethod::Nearest => nearest_interpolate(data, width, height, x, y),
        ResampleMethod::Average => average_interpolate(data, width, height, x, y, scale),
    }
}

#[inline]
fn in_bounds(width: usize, height: usize, x: f64, y: f64) -> bool {
    x >= 0.0 && y >= 0.0 && x < width as f64 && y < height as f64
}

/// Length of `[cell, cell + 1]` intersected with `[centre - half, centre + half]`.
#[inline]
fn overlap(cell: usize, centre: f64, half: f64) -> f64 {
    let lo = (cell as f64).max(centre - half);
    let hi = ((cell + 1) as f64).min(centre + half);
    (hi - lo).max(0.0)
}
