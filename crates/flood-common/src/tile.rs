//! In-memory raster tiles.
//!
//! A [`Tile`] owns its cell array and its [`GridDescriptor`]. Tiles are never
//! modified once built; every transformation consumes or borrows a tile and
//! returns a new one, so two stages can never observe each other's writes.

use crate::{BoundingBox, Crs, FloodError, FloodResult, GridDescriptor};

/// A single-band `f32` raster aligned to a [`GridDescriptor`].
///
/// Cells are stored row-major, top row first, so cell `(col, row)` lives at
/// `row * width + col`.
#[derive(Debug, Clone, PartialEq)]
pub struct Tile {
    data: Vec<f32>,
    grid: GridDescriptor,
    nodata: Option<f32>,
}

impl Tile {
    /// Create a tile, checking that the array matches the grid shape.
    pub fn new(data: Vec<f32>, grid: GridDescriptor, nodata: Option<f32>) -> FloodResult<Self> {
        if data.len() != grid.len() {
            return Err(FloodError::ShapeMismatch {
                expected: grid.len(),
                actual: data.len(),
            });
        }
        Ok(Self { data, grid, nodata })
    }

    pub fn grid(&self) -> &GridDescriptor {
        &self.grid
    }

    pub fn data(&self) -> &[f32] {
        &self.data
    }

    /// The source no-data sentinel, if the tile still carries one.
    pub fn nodata(&self) -> Option<f32> {
        self.nodata
    }

    pub fn crs(&self) -> Option<&Crs> {
        self.grid.crs.as_ref()
    }

    pub fn width(&self) -> usize {
        self.grid.width
    }

    pub fn height(&self) -> usize {
        self.grid.height
    }

    pub fn bbox(&self) -> BoundingBox {
        self.grid.bbox()
    }

    /// Split the tile into its parts, handing ownership of the array back.
    pub fn into_parts(self) -> (Vec<f32>, GridDescriptor, Option<f32>) {
        (self.data, self.grid, self.nodata)
    }

    /// Value at `(col, row)`, or `None` when out of range.
    pub fn get(&self, col: usize, row: usize) -> Option<f32> {
        if col >= self.grid.width || row >= self.grid.height {
            return None;
        }
        self.data.get(row * self.grid.width + col).copied()
    }

    /// Same cells, CRS filled in from `crs` only when the grid has none.
    pub fn with_default_crs(self, crs: &Crs) -> Self {
        if self.grid.crs.is_some() {
            return self;
        }
        let grid = self.grid.with_default_crs(crs);
        Self { grid, ..self }
    }

    /// Replace sentinel-matched cells with `NaN` and drop the sentinel.
    ///
    /// Positive and zero values are kept; use [`Tile::normalize_validity`] for
    /// the full flood validity convention.
    pub fn mask_nodata(self) -> Self {
        let Some(sentinel) = self.nodata else {
            return self;
        };
        let data = self
            .data
            .into_iter()
            .map(|v| if is_sentinel(v, sentinel) { f32::NAN } else { v })
            .collect();
        Self {
            data,
            grid: self.grid,
            nodata: None,
        }
    }

    /// Apply the flood validity convention.
    ///
    /// Sentinel-matched, non-finite and non-positive cells all become `NaN`,
    /// so afterwards `NaN` is the only representation of "no flood".
    pub fn normalize_validity(self) -> Self {
        let sentinel = self.nodata;
        let data = self
            .data
            .into_iter()
            .map(|v| {
                let masked = sentinel.is_some_and(|s| is_sentinel(v, s));
                if masked || !is_valid_value(v) {
                    f32::NAN
                } else {
                    v
                }
            })
            .collect();
        Self {
            data,
            grid: self.grid,
            nodata: None,
        }
    }

    /// Number of valid (non-NaN) cells.
    pub fn valid_count(&self) -> usize {
        self.data.iter().filter(|v| !v.is_nan()).count()
    }

    /// Minimum and maximum over valid cells.
    pub fn value_range(&self) -> Option<(f32, f32)> {
        self.data
            .iter()
            .filter(|v| !v.is_nan())
            .fold(None, |acc, &v| match acc {
                None => Some((v, v)),
                Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
            })
    }
}

/// A value counts as flood signal only when finite and strictly positive.
#[inline]
pub fn is_valid_value(v: f32) -> bool {
    v.is_finite() && v > 0.0
}

#[inline]
fn is_sentinel(v: f32, sentinel: f32) -> bool {
    if sentinel.is_nan() {
        v.is_nan()
    } else {
        v == sentinel
    }
}
