//! Error types for grid and tile construction.

use thiserror::Error;

/// Result type alias using FloodError.
pub type FloodResult<T> = Result<T, FloodError>;

/// Errors raised when building grid descriptors and tiles.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FloodError {
    #[error("Invalid grid: {0}")]
    InvalidGrid(String),

    #[error("Tile data has {actual} cells but grid expects {expected}")]
    ShapeMismatch { expected: usize, actual: usize },

    #[error("Invalid CRS: {0}")]
    InvalidCrs(String),
}

impl FloodError {
    /// Create an InvalidGrid error.
    pub fn invalid_grid(msg: impl Into<String>) -> Self {
        Self::InvalidGrid(msg.into())
    }
}

impl From<crate::crs::CrsParseError> for FloodError {
    fn from(err: crate::crs::CrsParseError) -> Self {
        FloodError::InvalidCrs(err.to_string())
    }
}
