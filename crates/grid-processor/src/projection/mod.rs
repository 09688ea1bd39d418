//! Resampling and reprojection of tiles between grids.

pub mod interpolation;
pub mod reproject;

pub use interpolation::{average_interpolate, nearest_interpolate};
pub use reproject::{reproject, target_grid_for_crs};
