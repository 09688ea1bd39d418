//! Test data generators for creating synthetic flood tiles.
//!
//! These generators create predictable, verifiable tiles that can be used
//! across the test suite.

use flood_common::{Crs, GeoTransform, GridDescriptor, Tile};

/// North-up geographic grid with its top-left corner at `(west, north)`.
pub fn geographic_grid(
    west: f64,
    north: f64,
    resolution: f64,
    width: usize,
    height: usize,
) -> GridDescriptor {
    GridDescriptor::new(
        Some(Crs::WGS84),
        GeoTransform::north_up(west, north, resolution, -resolution),
        width,
        height,
    )
    .expect("test grid must be valid")
}

/// Tile where every cell holds `value`.
pub fn constant_tile(grid: GridDescriptor, value: f32) -> Tile {
    let data = vec![value; grid.len()];
    Tile::new(data, grid, None).expect("constant tile matches its grid")
}

/// Tile with depth-like values rising from the top-left corner.
///
/// Cell `(col, row)` holds `0.1 + 0.01 * (col + row)` metres, so every cell
/// is valid and values are distinct along each diagonal.
pub fn gradient_tile(grid: GridDescriptor) -> Tile {
    let mut data = Vec::with_capacity(grid.len());
    for row in 0..grid.height {
        for col in 0..grid.width {
            data.push(0.1 + 0.01 * (col + row) as f32);
        }
    }
    Tile::new(data, grid, None).expect("gradient tile matches its grid")
}

/// Tile from explicit rows, top row first.
///
/// # Panics
///
/// If the rows are ragged or do not match the grid shape.
pub fn tile_from_rows(grid: GridDescriptor, rows: &[&[f32]], nodata: Option<f32>) -> Tile {
    assert_eq!(rows.len(), grid.height, "row count must equal grid height");
    for row in rows {
        assert_eq!(row.len(), grid.width, "row length must equal grid width");
    }
    let data: Vec<f32> = rows.iter().flat_map(|r| r.iter().copied()).collect();
    Tile::new(data, grid, nodata).expect("rows match the grid")
}
