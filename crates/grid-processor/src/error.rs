//! Error types for grid processing.

use flood_common::FloodError;
use projection::ProjectionError;
use thiserror::Error;

/// Errors that can occur while resampling, mosaicking or compositing.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GridProcessorError {
    /// Two grids that must share a CRS do not, or no transformation between
    /// them could be built.
    #[error("CRS mismatch: expected {expected}, found {found}")]
    CrsMismatch { expected: String, found: String },

    /// A grid has no CRS where one is required.
    #[error("missing CRS: {0}")]
    MissingCrs(String),

    /// An operation that needs at least one tile received none.
    #[error("empty input: {0}")]
    EmptyInput(String),

    /// Configuration error.
    #[error("configuration error: {0}")]
    ConfigError(String),

    /// CRS transformation error.
    #[error("projection error: {0}")]
    Projection(#[from] ProjectionError),

    /// Grid or tile construction error.
    #[error(transparent)]
    Grid(#[from] FloodError),
}

impl GridProcessorError {
    /// Create a CrsMismatch error.
    pub fn crs_mismatch(expected: impl ToString, found: impl ToString) -> Self {
        Self::CrsMismatch {
            expected: expected.to_string(),
            found: found.to_string(),
        }
    }

    /// Create a MissingCrs error.
    pub fn missing_crs(msg: impl Into<String>) -> Self {
        Self::MissingCrs(msg.into())
    }

    /// Create an EmptyInput error.
    pub fn empty_input(msg: impl Into<String>) -> Self {
        Self::EmptyInput(msg.into())
    }

    /// True for the CRS contract violations the global stage treats as fatal.
    pub fn is_crs_error(&self) -> bool {
        matches!(self, Self::CrsMismatch { .. } | Self::MissingCrs(_))
    }
}

/// Result type for grid processor operations.
pub type Result<T> = std::result::Result<T, GridProcessorError>;
