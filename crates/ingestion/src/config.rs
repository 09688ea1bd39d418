//! Pipeline configuration.
//!
//! One explicit struct threaded into every stage. Values come from defaults,
//! then a YAML document, then `FLOOD_*` environment variables, then command
//! line flags (applied by the binary).

use std::path::{Path, PathBuf};

use flood_common::Crs;
use grid_processor::config::{DEFAULT_MAX_EVENT_DIMENSION, DEFAULT_MAX_GLOBAL_DIMENSION, DEFAULT_SOURCE_CRS};
use grid_processor::{CompositeConfig, MosaicConfig};
use serde::{Deserialize, Serialize};

use crate::events::COMPOSITE_FILE_NAME;
use crate::geotiff::GeoTiffCompression;
use crate::region::DEFAULT_NAME_FIELDS;

/// Configuration for all pipeline stages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Root searched recursively for source tiles
    pub input_dir: PathBuf,
    /// Per-event outputs (`flood_<key>.tif`)
    pub events_dir: PathBuf,
    /// Region-filtered copies of the per-event outputs
    pub filtered_dir: PathBuf,
    /// Global composite path; defaults to `flood_ALL_events.tif` in the
    /// composite input directory
    pub composite_path: Option<PathBuf>,

    pub max_event_dimension: usize,
    pub max_global_dimension: usize,

    /// Assumed CRS for tiles without one
    pub default_crs: Crs,
    /// CRS of per-event outputs and of the composite
    pub output_crs: Crs,

    /// Region names to keep; empty disables the filter stage
    pub regions: Vec<String>,
    /// GeoJSON FeatureCollection with the region polygons
    pub region_file: Option<PathBuf>,
    /// Property names tried, in order, as the region name column
    pub region_name_fields: Vec<String>,

    /// Prefix of the date-range naming scheme
    pub event_prefix: String,

    /// Mosaic independent events on the rayon pool
    pub parallel_events: bool,
    pub compression: GeoTiffCompression,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            input_dir: PathBuf::from("data/raw"),
            events_dir: PathBuf::from("data/events_merged"),
            filtered_dir: PathBuf::from("data/events_filtered"),
            composite_path: None,
            max_event_dimension: DEFAULT_MAX_EVENT_DIMENSION,
            max_global_dimension: DEFAULT_MAX_GLOBAL_DIMENSION,
            default_crs: DEFAULT_SOURCE_CRS,
            output_crs: Crs::WGS84,
            regions: Vec::new(),
            region_file: None,
            region_name_fields: DEFAULT_NAME_FIELDS.iter().map(|s| s.to_string()).collect(),
            event_prefix: "WD_MERGE".to_string(),
            parallel_events: true,
            compression: GeoTiffCompression::Lzw,
        }
    }
}

impl PipelineConfig {
    /// Parse a YAML document. Missing keys keep their defaults.
    pub fn from_yaml_str(yaml: &str) -> Result<Self, String> {
        serde_yaml::from_str(yaml).map_err(|e| format!("Failed to parse pipeline config: {}", e))
    }

    /// Override fields from `FLOOD_*` environment variables.
    ///
    /// Unparseable values are ignored and the current value is kept.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("FLOOD_INPUT_DIR") {
            self.input_dir = PathBuf::from(val);
        }
        if let Ok(val) = std::env::var("FLOOD_EVENTS_DIR") {
            self.events_dir = PathBuf::from(val);
        }
        if let Ok(val) = std::env::var("FLOOD_FILTERED_DIR") {
            self.filtered_dir = PathBuf::from(val);
        }
        if let Ok(val) = std::env::var("FLOOD_COMPOSITE_PATH") {
            self.composite_path = Some(PathBuf::from(val));
        }
        if let Ok(val) = std::env::var("FLOOD_MAX_EVENT_DIMENSION") {
            if let Ok(size) = val.parse() {
                self.max_event_dimension = size;
            }
        }
        if let Ok(val) = std::env::var("FLOOD_MAX_GLOBAL_DIMENSION") {
            if let Ok(size) = val.parse() {
                self.max_global_dimension = size;
            }
        }
        if let Ok(val) = std::env::var("FLOOD_DEFAULT_CRS") {
            if let Ok(crs) = Crs::parse(&val) {
                self.default_crs = crs;
            }
        }
        if let Ok(val) = std::env::var("FLOOD_OUTPUT_CRS") {
            if let Ok(crs) = Crs::parse(&val) {
                self.output_crs = crs;
            }
        }
        if let Ok(val) = std::env::var("FLOOD_REGIONS") {
            self.regions = split_list(&val);
        }
        if let Ok(val) = std::env::var("FLOOD_REGION_FILE") {
            self.region_file = Some(PathBuf::from(val));
        }
        if let Ok(val) = std::env::var("FLOOD_REGION_NAME_FIELDS") {
            self.region_name_fields = split_list(&val);
        }
        if let Ok(val) = std::env::var("FLOOD_PARALLEL_EVENTS") {
            self.parallel_events = matches!(val.to_lowercase().as_str(), "1" | "true" | "yes");
        }
        if let Ok(val) = std::env::var("FLOOD_COMPRESSION") {
            self.compression = GeoTiffCompression::from_str(&val);
        }
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), String> {
        if self.max_event_dimension == 0 {
            return Err("max_event_dimension must be > 0".to_string());
        }
        if self.max_global_dimension == 0 {
            return Err("max_global_dimension must be > 0".to_string());
        }
        if self.event_prefix.trim().is_empty() {
            return Err("event_prefix cannot be empty".to_string());
        }
        if self.input_dir.as_os_str().is_empty() || self.events_dir.as_os_str().is_empty() {
            return Err("input_dir and events_dir are required".to_string());
        }
        if !self.regions.is_empty() && self.region_file.is_none() {
            return Err("regions are set but region_file is missing".to_string());
        }
        if self.region_name_fields.iter().any(|f| f.trim().is_empty()) {
            return Err("region_name_fields cannot contain blank names".to_string());
        }
        if self.events_dir == self.filtered_dir && !self.regions.is_empty() {
            return Err("filtered_dir must differ from events_dir".to_string());
        }
        Ok(())
    }

    pub fn mosaic_config(&self) -> MosaicConfig {
        MosaicConfig {
            max_dimension: self.max_event_dimension,
            default_crs: self.default_crs.clone(),
        }
    }

    pub fn composite_config(&self) -> CompositeConfig {
        CompositeConfig {
            max_dimension: self.max_global_dimension,
            target_crs: self.output_crs.clone(),
        }
    }

    /// Whether the region filter stage is configured.
    pub fn filter_enabled(&self) -> bool {
        !self.regions.is_empty()
    }

    /// Directory the composite stage reads from: the filtered events when a
    /// region filter is configured, all events otherwise.
    pub fn composite_input_dir(&self) -> &Path {
        if self.filter_enabled() {
            &self.filtered_dir
        } else {
            &self.events_dir
        }
    }

    pub fn composite_output_path(&self) -> PathBuf {
        self.composite_path
            .clone()
            .unwrap_or_else(|| self.composite_input_dir().join(COMPOSITE_FILE_NAME))
    }
}

fn split_list(val: &str) -> Vec<String> {
    val.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = PipelineConfig::default();
        assert_eq!(config.max_event_dimension, 2000);
        assert_eq!(config.max_global_dimension, 2000);
        assert_eq!(config.default_crs, Crs::Epsg(27704));
        assert_eq!(config.output_crs, Crs::WGS84);
        assert_eq!(config.region_name_fields, vec!["ADMIN", "NAME"]);
        assert_eq!(config.compression, GeoTiffCompression::Lzw);
        assert!(config.parallel_events);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let config = PipelineConfig::from_yaml_str(
            r#"
input_dir: /data/wd
max_global_dimension: 4000
output_crs: "EPSG:3035"
regions: [France, Spain]
region_file: /data/countries.geojson
compression: deflate
"#,
        )
        .unwrap();

        assert_eq!(config.input_dir, PathBuf::from("/data/wd"));
        assert_eq!(config.max_global_dimension, 4000);
        assert_eq!(config.max_event_dimension, 2000);
        assert_eq!(config.output_crs, Crs::Epsg(3035));
        assert_eq!(config.regions, vec!["France", "Spain"]);
        assert_eq!(config.compression, GeoTiffCompression::Deflate);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_bad_crs_rejected_at_parse() {
        assert!(PipelineConfig::from_yaml_str("default_crs: nonsense").is_err());
    }

    #[test]
    fn test_validate_rejects_zero_caps() {
        let config = PipelineConfig {
            max_event_dimension: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = PipelineConfig {
            max_global_dimension: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_regions_require_file() {
        let config = PipelineConfig {
            regions: vec!["Italy".to_string()],
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_composite_paths() {
        let mut config = PipelineConfig::default();
        assert_eq!(
            config.composite_output_path(),
            PathBuf::from("data/events_merged/flood_ALL_events.tif")
        );

        config.regions = vec!["Italy".to_string()];
        config.region_file = Some(PathBuf::from("countries.geojson"));
        assert_eq!(
            config.composite_output_path(),
            PathBuf::from("data/events_filtered/flood_ALL_events.tif")
        );

        config.composite_path = Some(PathBuf::from("/tmp/out.tif"));
        assert_eq!(config.composite_output_path(), PathBuf::from("/tmp/out.tif"));
    }

    #[test]
    fn test_stage_configs() {
        let config = PipelineConfig::default();
        assert_eq!(config.mosaic_config().max_dimension, 2000);
        assert_eq!(config.composite_config().target_crs, Crs::WGS84);
    }

    #[test]
    fn test_split_list() {
        assert_eq!(split_list("France, Spain,,Italy "), vec!["France", "Spain", "Italy"]);
    }
}
