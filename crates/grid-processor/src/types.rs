//! Core types for grid processing.

use serde::{Deserialize, Serialize};

/// Resampling method used when reprojecting a tile onto another grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResampleMethod {
    /// Nearest neighbor (preserves exact values, cheapest).
    #[default]
    Nearest,
    /// Area-weighted mean over the destination pixel footprint.
    Average,
}

impl std::fmt::Display for ResampleMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Nearest => write!(f, "nearest"),
            Self::Average => write!(f, "average"),
        }
    }
}
