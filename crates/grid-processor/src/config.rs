//! Configuration for mosaicking and compositing.

use flood_common::Crs;
use serde::{Deserialize, Serialize};

/// Default per-event size cap (pixels along the longest side).
pub const DEFAULT_MAX_EVENT_DIMENSION: usize = 2000;

/// Default size cap for the global composite grid.
pub const DEFAULT_MAX_GLOBAL_DIMENSION: usize = 2000;

/// CRS assumed for tiles that carry none (Equi7 Europe).
pub const DEFAULT_SOURCE_CRS: Crs = Crs::Epsg(27704);

/// Configuration for per-event mosaicking.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MosaicConfig {
    /// Tiles whose longest side exceeds this are block-averaged first.
    pub max_dimension: usize,

    /// CRS applied to tiles that have none. Never overrides an existing CRS.
    pub default_crs: Crs,
}

impl Default for MosaicConfig {
    fn default() -> Self {
        Self {
            max_dimension: DEFAULT_MAX_EVENT_DIMENSION,
            default_crs: DEFAULT_SOURCE_CRS,
        }
    }
}

impl MosaicConfig {
    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), String> {
        if self.max_dimension == 0 {
            return Err("mosaic max_dimension must be > 0".to_string());
        }
        Ok(())
    }
}

/// Configuration for the global composite.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompositeConfig {
    /// Cap on the longest side of the global grid.
    pub max_dimension: usize,

    /// Every input must already be in exactly this CRS.
    pub target_crs: Crs,
}

impl Default for CompositeConfig {
    fn default() -> Self {
        Self {
            max_dimension: DEFAULT_MAX_GLOBAL_DIMENSION,
            target_crs: Crs::WGS84,
        }
    }
}

impl CompositeConfig {
    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), String> {
        if self.max_dimension == 0 {
            return Err("composite max_dimension must be > 0".to_string());
        }
        Ok(())
    }
}
