//! Raster processing for the flood composite pipeline.
//!
//! This crate holds the numeric core: everything between "a set of tiles
//! was loaded" and "one tile is ready to be written". It does no I/O.
//!
//! # Architecture
//!
//! ```text
//! Event tiles
//!      │
//!      ▼
//! mosaic(tiles)
//!      │
//!      ├─► downsample (shared factor from the first tile)
//!      ├─► reproject onto the first tile's grid (area-weighted average)
//!      └─► normalize validity, pixel-wise max
//!               │
//!               ▼
//!          one tile per event
//!               │
//!               ▼
//! GlobalExtent::scan ─► Compositor::add (nearest) ─► Compositor::finish
//!               │
//!               ▼
//!          one global tile
//! ```
//!
//! # Example
//!
//! ```ignore
//! use grid_processor::{mosaic, MosaicConfig};
//! use projection::TransformerCache;
//!
//! let cache = TransformerCache::new();
//! let merged = mosaic(tiles, &MosaicConfig::default(), &cache)?;
//! ```

pub mod accumulate;
pub mod composite;
pub mod config;
pub mod downsample;
pub mod error;
pub mod mosaic;
pub mod projection;
pub mod types;

// Re-export commonly used types at crate root
pub use accumulate::{merge_max, MaxAccumulator};
pub use composite::{check_crs, composite, Compositor, GlobalExtent};
pub use config::{CompositeConfig, MosaicConfig};
pub use downsample::{downsample, downsample_by_factor, downsample_factor};
pub use error::{GridProcessorError, Result};
pub use mosaic::{mosaic, EventMosaic};
pub use projection::{reproject, target_grid_for_crs};
pub use types::ResampleMethod;
