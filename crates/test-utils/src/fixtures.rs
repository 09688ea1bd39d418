//! Common test fixtures for flood composite tests.
//!
//! This module provides tile identifiers, region GeoJSON and directory
//! layouts that represent common scenarios in the pipeline.

use std::path::{Path, PathBuf};

use tempfile::TempDir;

/// Tile identifiers in the flood product naming scheme.
pub mod identifiers {
    pub const EVENT_A_TILE_X: &str = "WD_MERGE_2024-01-01---2024-01-05_duration_x.tif";
    pub const EVENT_A_TILE_Y: &str = "WD_MERGE_2024-01-01---2024-01-05_duration_y.tif";
    pub const EVENT_B_TILE: &str = "WD_MERGE_2023-11-10---2023-11-12_duration_12.tif";

    /// Grouping key shared by the two event A tiles
    pub const EVENT_A_KEY: &str = "2024-01-01__2024-01-05";

    /// Not in the naming scheme; falls back to the file stem
    pub const UNMATCHED: &str = "misc_depth_tile.tif";

    /// Right shape but not a real calendar date
    pub const BAD_DATE: &str = "WD_MERGE_2024-02-30---2024-03-01_duration_1.tif";
}

/// Minimal region GeoJSON with two named square "countries".
///
/// `Westland` covers lon 0..10, lat 40..50; `Eastland` covers lon 20..30,
/// lat 40..50. Both carry `ADMIN` and `NAME` properties.
pub const REGIONS_GEOJSON: &str = r#"{
  "type": "FeatureCollection",
  "features": [
    {
      "type": "Feature",
      "properties": { "ADMIN": "Westland", "NAME": "West" },
      "geometry": {
        "type": "Polygon",
        "coordinates": [[[0, 40], [10, 40], [10, 50], [0, 50], [0, 40]]]
      }
    },
    {
      "type": "Feature",
      "properties": { "ADMIN": "Eastland", "NAME": "East" },
      "geometry": {
        "type": "MultiPolygon",
        "coordinates": [[[[20, 40], [30, 40], [30, 50], [20, 50], [20, 40]]]]
      }
    }
  ]
}"#;

/// Temporary directory tree mirroring the pipeline layout.
///
/// Everything is removed when the value is dropped.
pub struct PipelineDirs {
    root: TempDir,
    pub input: PathBuf,
    pub events: PathBuf,
    pub filtered: PathBuf,
}

impl PipelineDirs {
    /// Create `input/`, `events/` and `filtered/` under a fresh temp dir.
    pub fn new() -> std::io::Result<Self> {
        let root = tempfile::tempdir()?;
        let input = root.path().join("input");
        let events = root.path().join("events");
        let filtered = root.path().join("filtered");
        for dir in [&input, &events, &filtered] {
            std::fs::create_dir_all(dir)?;
        }
        Ok(Self {
            root,
            input,
            events,
            filtered,
        })
    }

    pub fn root(&self) -> &Path {
        self.root.path()
    }
}
