//! Error types for CRS resolution and transformation.

use thiserror::Error;

/// Errors that can occur while resolving or applying a transformation.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProjectionError {
    /// No PROJ definition is known for this CRS.
    #[error("unknown CRS: {0}")]
    UnknownCrs(String),

    /// The PROJ definition could not be parsed.
    #[error("invalid definition for {crs}: {message}")]
    InvalidDefinition { crs: String, message: String },

    /// None of the sampled edge points of a box survived the transformation.
    #[error("bounds could not be transformed from {from} to {to}")]
    EmptyBounds { from: String, to: String },
}

/// Result type for projection operations.
pub type Result<T> = std::result::Result<T, ProjectionError>;
