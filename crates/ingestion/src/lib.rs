//! Flood event ingestion library.
//!
//! Everything in the pipeline that touches the filesystem: discovering
//! source tiles, grouping them into events, GeoTIFF I/O, the region filter
//! and the three batch stages built on `grid-processor`.
//!
//! # Architecture
//!
//! - Event grouping by filename-encoded date range (`events`)
//! - Recursive raster discovery (`scan`)
//! - Single-band GeoTIFF read/write with GeoKeys and GDAL no-data (`geotiff`)
//! - Region polygons from GeoJSON and bounding-box intersection (`region`)
//! - Per-event, filter and composite stages with run reports (`pipeline`)

pub mod config;
pub mod error;
pub mod events;
pub mod geotiff;
pub mod pipeline;
pub mod region;
pub mod report;
pub mod scan;

// Re-exports
pub use config::PipelineConfig;
pub use error::{IngestionError, Result};
pub use events::{group_by_event, DateRangeKey, Event, EventKey, EventKeyStrategy, COMPOSITE_FILE_NAME};
pub use geotiff::{read_grid, read_tile, write_tile, GeoTiffCompression};
pub use pipeline::{filter_events, EventOutcome, FloodPipeline};
pub use region::{intersects, RegionGeometry};
pub use report::StageReport;
pub use scan::{find_rasters, ScanOptions};
