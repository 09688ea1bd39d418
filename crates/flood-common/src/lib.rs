//! Common types shared across the flood composite pipeline.
//!
//! Everything in here is a plain value type with no I/O: grid descriptors,
//! bounding boxes, CRS identifiers and the in-memory raster [`Tile`].

pub mod bbox;
pub mod crs;
pub mod error;
pub mod grid;
pub mod tile;

pub use bbox::BoundingBox;
pub use crs::{Crs, CrsParseError};
pub use error::{FloodError, FloodResult};
pub use grid::{GeoTransform, GridDescriptor};
pub use tile::{is_valid_value, Tile};
