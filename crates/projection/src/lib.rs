//! Coordinate reference system transformations.
//!
//! Resolves [`flood_common::Crs`] identifiers into PROJ.4 definitions and
//! transforms points and bounding boxes between them using the pure Rust
//! `proj4rs` engine, so no system PROJ/GDAL install is required.

pub mod definitions;
pub mod error;
pub mod transform;

pub use definitions::{is_geographic, proj_definition};
pub use error::{ProjectionError, Result};
pub use transform::{CrsTransformer, TransformerCache};
