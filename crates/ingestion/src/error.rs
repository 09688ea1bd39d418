//! Error types for the ingestion crate.

use flood_common::FloodError;
use grid_processor::GridProcessorError;
use projection::ProjectionError;
use thiserror::Error;

/// Errors that can occur while loading, processing or writing events.
#[derive(Error, Debug)]
pub enum IngestionError {
    #[error("Failed to read file: {0}")]
    FileRead(#[from] std::io::Error),

    #[error("GeoTIFF error in {path}: {message}")]
    GeoTiff { path: String, message: String },

    #[error("No region named {names:?} in {path}")]
    RegionNotFound { names: Vec<String>, path: String },

    #[error("Invalid region geometry: {0}")]
    InvalidRegion(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error(transparent)]
    Grid(#[from] GridProcessorError),

    #[error(transparent)]
    Flood(#[from] FloodError),

    #[error(transparent)]
    Projection(#[from] ProjectionError),

    #[error("Event {key} failed: {source}")]
    EventFailed {
        key: String,
        #[source]
        source: Box<IngestionError>,
    },
}

impl IngestionError {
    /// Create a GeoTiff error for `path`.
    pub fn geotiff(path: impl AsRef<std::path::Path>, message: impl ToString) -> Self {
        Self::GeoTiff {
            path: path.as_ref().display().to_string(),
            message: message.to_string(),
        }
    }

    /// Wrap an error with the event it happened in.
    pub fn in_event(self, key: impl Into<String>) -> Self {
        Self::EventFailed {
            key: key.into(),
            source: Box::new(self),
        }
    }

    /// True for CRS contract violations, which abort the composite stage.
    pub fn is_crs_error(&self) -> bool {
        match self {
            Self::Grid(e) => e.is_crs_error(),
            Self::EventFailed { source, .. } => source.is_crs_error(),
            _ => false,
        }
    }
}

/// Result type for ingestion operations.
pub type Result<T> = std::result::Result<T, IngestionError>;
