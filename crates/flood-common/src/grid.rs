//! Georeferenced grid descriptors.
//!
//! A [`GridDescriptor`] ties a `width x height` pixel array to world
//! coordinates through a 6-parameter affine [`GeoTransform`] and an optional
//! [`Crs`]. Descriptors are immutable values: every operation that changes
//! resolution, extent or CRS returns a new descriptor.

use crate::{BoundingBox, Crs, FloodError, FloodResult};
use serde::{Deserialize, Serialize};

/// Affine transform from pixel space to CRS coordinates.
///
/// Parameters follow GDAL ordering:
///
/// ```text
/// x = origin_x + col * pixel_width  + row * row_rotation
/// y = origin_y + col * col_rotation + row * pixel_height
/// ```
///
/// `(col, row)` are corner-based: `(0, 0)` is the top-left corner of the
/// first pixel and `(0.5, 0.5)` its center. North-up grids have zero
/// rotation and a negative `pixel_height`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoTransform {
    pub origin_x: f64,
    pub pixel_width: f64,
    pub row_rotation: f64,
    pub origin_y: f64,
    pub col_rotation: f64,
    pub pixel_height: f64,
}

impl GeoTransform {
    /// Build from the six GDAL coefficients.
    pub fn from_gdal(gt: [f64; 6]) -> Self {
        Self {
            origin_x: gt[0],
            pixel_width: gt[1],
            row_rotation: gt[2],
            origin_y: gt[3],
            col_rotation: gt[4],
            pixel_height: gt[5],
        }
    }

    /// The six coefficients in GDAL order.
    pub fn to_gdal(&self) -> [f64; 6] {
        [
            self.origin_x,
            self.pixel_width,
            self.row_rotation,
            self.origin_y,
            self.col_rotation,
            self.pixel_height,
        ]
    }

    /// A rotation-free transform. `pixel_height` keeps its sign.
    pub fn north_up(origin_x: f64, origin_y: f64, pixel_width: f64, pixel_height: f64) -> Self {
        Self {
            origin_x,
            pixel_width,
            row_rotation: 0.0,
            origin_y,
            col_rotation: 0.0,
            pixel_height,
        }
    }

    /// North-up transform spanning `bbox` with the given pixel counts.
    ///
    /// Equivalent to rasterio's `from_bounds(west, south, east, north, w, h)`.
    pub fn from_bounds(bbox: &BoundingBox, width: usize, height: usize) -> Self {
        Self::north_up(
            bbox.min_x,
            bbox.max_y,
            bbox.width() / width as f64,
            -bbox.height() / height as f64,
        )
    }

    /// True when the transform has no rotation terms.
    pub fn is_north_up(&self) -> bool {
        self.row_rotation == 0.0 && self.col_rotation == 0.0
    }

    fn determinant(&self) -> f64 {
        self.pixel_width * self.pixel_height - self.row_rotation * self.col_rotation
    }

    /// Map a pixel-space position to world coordinates.
    #[inline]
    pub fn apply(&self, col: f64, row: f64) -> (f64, f64) {
        (
            self.origin_x + col * self.pixel_width + row * self.row_rotation,
            self.origin_y + col * self.col_rotation + row * self.pixel_height,
        )
    }

    /// Map world coordinates back to a fractional pixel-space position.
    ///
    /// Returns `None` for a degenerate (non-invertible) transform.
    #[inline]
    pub fn invert_point(&self, x: f64, y: f64) -> Option<(f64, f64)> {
        let det = self.determinant();
        if det == 0.0 || !det.is_finite() {
            return None;
        }
        let dx = x - self.origin_x;
        let dy = y - self.origin_y;
        let col = (dx * self.pixel_height - dy * self.row_rotation) / det;
        let row = (dy * self.pixel_width - dx * self.col_rotation) / det;
        Some((col, row))
    }

    /// Same origin, pixel size multiplied by `factor`.
    pub fn scaled(&self, factor: f64) -> Self {
        Self {
            origin_x: self.origin_x,
            pixel_width: self.pixel_width * factor,
            row_rotation: self.row_rotation * factor,
            origin_y: self.origin_y,
            col_rotation: self.col_rotation * factor,
            pixel_height: self.pixel_height * factor,
        }
    }
}

/// A georeferenced 2D grid: CRS + affine transform + dimensions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridDescriptor {
    /// Coordinate reference system; `None` when the source carried none.
    pub crs: Option<Crs>,
    pub transform: GeoTransform,
    pub width: usize,
    pub height: usize,
}

impl GridDescriptor {
    /// Create a validated grid descriptor.
    ///
    /// Requires `width, height >= 1`, a positive pixel width, a non-zero
    /// pixel height and an invertible transform.
    pub fn new(
        crs: Option<Crs>,
        transform: GeoTransform,
        width: usize,
        height: usize,
    ) -> FloodResult<Self> {
        if width == 0 || height == 0 {
            return Err(FloodError::invalid_grid(format!(
                "dimensions must be at least 1x1, got {}x{}",
                width, height
            )));
        }
        if transform.to_gdal().iter().any(|v| !v.is_finite()) {
            return Err(FloodError::invalid_grid("transform has non-finite terms"));
        }
        if transform.pixel_width <= 0.0 {
            return Err(FloodError::invalid_grid(format!(
                "pixel width must be positive, got {}",
                transform.pixel_width
            )));
        }
        if transform.pixel_height == 0.0 {
            return Err(FloodError::invalid_grid("pixel height must be non-zero"));
        }
        if transform.determinant() == 0.0 {
            return Err(FloodError::invalid_grid("transform is not invertible"));
        }

        Ok(Self {
            crs,
            transform,
            width,
            height,
        })
    }

    /// Total number of cells.
    pub fn len(&self) -> usize {
        self.width * self.height
    }

    /// Never true for a validated grid; provided for API symmetry with `len`.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Pixel size magnitudes `(res_x, res_y)`.
    pub fn resolution(&self) -> (f64, f64) {
        (
            self.transform.pixel_width.abs(),
            self.transform.pixel_height.abs(),
        )
    }

    /// Bounding box of the full grid footprint in its own CRS.
    ///
    /// All four corners go through the transform so rotated grids are
    /// still covered.
    pub fn bbox(&self) -> BoundingBox {
        let w = self.width as f64;
        let h = self.height as f64;
        BoundingBox::from_points([
            self.transform.apply(0.0, 0.0),
            self.transform.apply(w, 0.0),
            self.transform.apply(0.0, h),
            self.transform.apply(w, h),
        ])
    }

    /// World coordinates of a fractional corner-based pixel position.
    #[inline]
    pub fn pixel_to_world(&self, col: f64, row: f64) -> (f64, f64) {
        self.transform.apply(col, row)
    }

    /// True when both grids share CRS, dimensions and transform, so their
    /// cells can be combined index by index.
    pub fn is_aligned_with(&self, other: &GridDescriptor) -> bool {
        self == other
    }

    /// Fractional corner-based pixel position of a world coordinate.
    #[inline]
    pub fn world_to_pixel(&self, x: f64, y: f64) -> Option<(f64, f64)> {
        self.transform.invert_point(x, y)
    }

    /// Copy of this grid with the CRS replaced.
    pub fn with_crs(&self, crs: Crs) -> Self {
        Self {
            crs: Some(crs),
            ..self.clone()
        }
    }

    /// Copy of this grid with `crs` filled in only when none is set.
    pub fn with_default_crs(&self, crs: &Crs) -> Self {
        match self.crs {
            Some(_) => self.clone(),
            None => self.with_crs(crs.clone()),
        }
    }

    /// Grid covering the same origin with pixels `factor` times larger.
    ///
    /// Dimensions round up so partial edge blocks still get a cell.
    pub fn downsampled(&self, factor: usize) -> Self {
        let factor = factor.max(1);
        Self {
            crs: self.crs.clone(),
            transform: self.transform.scaled(factor as f64),
            width: self.width.div_ceil(factor),
            height: self.height.div_ceil(factor),
        }
    }
}
