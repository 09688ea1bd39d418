//! Pixel-wise maximum accumulator.
//!
//! The merge rule per cell, with `NaN` meaning "no flood":
//!
//! | accumulator | incoming | result       |
//! |-------------|----------|--------------|
//! | NaN         | v        | v            |
//! | a           | v        | max(a, v)    |
//! | a           | NaN      | a            |
//!
//! The rule is commutative and associative, so the merge order of tiles
//! never changes the result.

use flood_common::{GridDescriptor, Tile};

use crate::error::{GridProcessorError, Result};

/// Running maximum over tiles aligned to one grid.
#[derive(Debug, Clone)]
pub struct MaxAccumulator {
    grid: GridDescriptor,
    data: Vec<f32>,
}

impl MaxAccumulator {
    /// An accumulator with every cell invalid.
    pub fn new(grid: GridDescriptor) -> Self {
        Self {
            data: vec![f32::NAN; grid.len()],
            grid,
        }
    }

    pub fn grid(&self) -> &GridDescriptor {
        &self.grid
    }

    /// Merge a tile aligned to this accumulator's grid.
    pub fn merge_tile(&mut self, tile: &Tile) -> Result<()> {
        if !tile.grid().is_aligned_with(&self.grid) {
            return Err(GridProcessorError::crs_mismatch(
                describe(&self.grid),
                describe(tile.grid()),
            ));
        }
        merge_max(&mut self.data, tile.data());
        Ok(())
    }

    /// Merge another accumulator over the same grid.
    ///
    /// Lets partial accumulators built independently be reduced pairwise.
    pub fn merge(mut self, other: MaxAccumulator) -> Result<Self> {
        if !other.grid.is_aligned_with(&self.grid) {
            return Err(GridProcessorError::crs_mismatch(
                describe(&self.grid),
                describe(&other.grid),
            ));
        }
        merge_max(&mut self.data, &other.data);
        Ok(self)
    }

    /// Number of cells holding a value.
    pub fn valid_count(&self) -> usize {
        self.data.iter().filter(|v| !v.is_nan()).count()
    }

    /// Hand the accumulated cells over as a tile.
    pub fn into_tile(self) -> Result<Tile> {
        Ok(Tile::new(self.data, self.grid, None)?)
    }
}

/// Fold `incoming` into `acc` cell by cell with the max rule.
pub fn merge_max(acc: &mut [f32], incoming: &[f32]) {
    debug_assert_eq!(acc.len(), incoming.len());
    for (a, &v) in acc.iter_mut().zip(incoming) {
        if v.is_nan() {
            continue;
        }
        if a.is_nan() || v > *a {
            *a = v;
        }
    }
}

fn describe(grid: &GridDescriptor) -> String {
    let crs = grid
        .crs
        .as_ref()
        .map(|c| c.to_string())
        .unwrap_or_else(|| "<none>".to_string());
    format!("{} {}x{} {:?}", crs, grid.width, grid.height, grid.transform.to_gdal())
}
