//! Integration tests: the batch stages end to end on temporary directories.

use std::path::{Path, PathBuf};

use flood_common::{Crs, GeoTransform, GridDescriptor, Tile};
use ingestion::{
    filter_events, read_grid, read_tile, write_tile, EventKey, EventKeyStrategy, FloodPipeline,
    GeoTiffCompression, IngestionError, PipelineConfig, RegionGeometry,
};
use projection::TransformerCache;
use test_utils::fixtures::{identifiers, PipelineDirs, REGIONS_GEOJSON};
use test_utils::{constant_tile, geographic_grid};

fn write(dir: &Path, name: &str, tile: &Tile) -> PathBuf {
    let path = dir.join(name);
    write_tile(&path, tile, GeoTiffCompression::Lzw).unwrap();
    path
}

fn config(dirs: &PipelineDirs) -> PipelineConfig {
    PipelineConfig {
        input_dir: dirs.input.clone(),
        events_dir: dirs.events.clone(),
        filtered_dir: dirs.filtered.clone(),
        default_crs: Crs::WGS84,
        parallel_events: false,
        ..Default::default()
    }
}

fn region_file(dirs: &PipelineDirs) -> PathBuf {
    let path = dirs.root().join("regions.geojson");
    std::fs::write(&path, REGIONS_GEOJSON).unwrap();
    path
}

/// Event A (two overlapping tiles in Westland), event B (Eastland) and one
/// tile outside the naming scheme far from both.
fn seed_inputs(dirs: &PipelineDirs) {
    write(
        &dirs.input,
        identifiers::EVENT_A_TILE_X,
        &constant_tile(geographic_grid(2.0, 48.0, 1.0, 4, 4), 1.0),
    );
    write(
        &dirs.input,
        identifiers::EVENT_A_TILE_Y,
        &constant_tile(geographic_grid(4.0, 48.0, 1.0, 4, 4), 3.0),
    );
    let nested = dirs.input.join("2023");
    std::fs::create_dir_all(&nested).unwrap();
    write(
        &nested,
        identifiers::EVENT_B_TILE,
        &constant_tile(geographic_grid(20.0, 45.0, 0.5, 6, 6), 2.0),
    );
    write(
        &dirs.input,
        identifiers::UNMATCHED,
        &constant_tile(geographic_grid(100.0, 2.0, 0.5, 4, 4), 0.5),
    );
}

// ============================================================================
// Per-event stage
// ============================================================================

#[test]
fn test_events_stage_writes_one_raster_per_event() {
    let dirs = PipelineDirs::new().unwrap();
    seed_inputs(&dirs);

    let pipeline = FloodPipeline::new(config(&dirs)).unwrap();
    let report = pipeline.process_events().unwrap();

    assert_eq!(report.processed, 3);
    assert_eq!(report.failed, 0);
    for name in [
        "flood_2024-01-01__2024-01-05.tif",
        "flood_2023-11-10__2023-11-12.tif",
        "flood_misc_depth_tile.tif",
    ] {
        assert!(dirs.events.join(name).is_file(), "{} missing", name);
    }

    // Event A: tile Y lands on the right half of tile X's grid.
    let merged = read_tile(&dirs.events.join("flood_2024-01-01__2024-01-05.tif")).unwrap();
    assert_eq!((merged.width(), merged.height()), (4, 4));
    assert_eq!(merged.crs(), Some(&Crs::WGS84));
    assert_eq!(merged.get(0, 0), Some(1.0));
    assert_eq!(merged.get(1, 3), Some(1.0));
    assert_eq!(merged.get(2, 0), Some(3.0));
    assert_eq!(merged.get(3, 3), Some(3.0));
}

#[test]
fn test_events_stage_resumes() {
    let dirs = PipelineDirs::new().unwrap();
    seed_inputs(&dirs);

    let pipeline = FloodPipeline::new(config(&dirs)).unwrap();
    pipeline.process_events().unwrap();

    let again = pipeline.process_events().unwrap();
    assert_eq!(again.processed, 0);
    assert_eq!(again.skipped_existing, 3);

    let forced = FloodPipeline::new(config(&dirs))
        .unwrap()
        .with_force(true)
        .process_events()
        .unwrap();
    assert_eq!(forced.processed, 3);
}

#[test]
fn test_parallel_events_match_sequential() {
    let sequential = PipelineDirs::new().unwrap();
    seed_inputs(&sequential);
    FloodPipeline::new(config(&sequential))
        .unwrap()
        .process_events()
        .unwrap();

    let parallel = PipelineDirs::new().unwrap();
    seed_inputs(&parallel);
    let report = FloodPipeline::new(PipelineConfig {
        parallel_events: true,
        ..config(&parallel)
    })
    .unwrap()
    .process_events()
    .unwrap();
    assert_eq!(report.processed, 3);

    let name = "flood_2024-01-01__2024-01-05.tif";
    let a = read_tile(&sequential.events.join(name)).unwrap();
    let b = read_tile(&parallel.events.join(name)).unwrap();
    assert_eq!(a.grid(), b.grid());
    test_utils::assert_cells_eq!(a.data(), b.data());
}

#[test]
fn test_failed_event_does_not_stop_batch() {
    let dirs = PipelineDirs::new().unwrap();
    seed_inputs(&dirs);
    std::fs::write(
        dirs.input.join("WD_MERGE_2022-05-01---2022-05-02_duration_1.tif"),
        b"definitely not a tiff",
    )
    .unwrap();

    let report = FloodPipeline::new(config(&dirs))
        .unwrap()
        .process_events()
        .unwrap();

    assert_eq!(report.processed, 3);
    assert_eq!(report.failed, 1);
    assert_eq!(report.failures[0].0, "2022-05-01__2022-05-02");
    assert!(!dirs.events.join("flood_2022-05-01__2022-05-02.tif").exists());
}

/// Groups tiles by the directory they sit in.
struct ParentDirKey;

impl EventKeyStrategy for ParentDirKey {
    fn key_for(&self, identifier: &str) -> EventKey {
        let dir = Path::new(identifier)
            .parent()
            .and_then(|p| p.file_name())
            .and_then(|n| n.to_str())
            .unwrap_or("root");
        EventKey::new(dir)
    }
}

#[test]
fn test_custom_event_key_strategy() {
    let dirs = PipelineDirs::new().unwrap();
    let north = dirs.input.join("north");
    let south = dirs.input.join("south");
    std::fs::create_dir_all(&north).unwrap();
    std::fs::create_dir_all(&south).unwrap();
    // Names that would not group under the date-range scheme
    write(&north, "tile_1.tif", &constant_tile(geographic_grid(2.0, 48.0, 1.0, 2, 2), 1.0));
    write(&north, "tile_2.tif", &constant_tile(geographic_grid(4.0, 48.0, 1.0, 2, 2), 4.0));
    write(&south, "tile_3.tif", &constant_tile(geographic_grid(2.0, 42.0, 1.0, 2, 2), 2.0));

    let report = FloodPipeline::new(config(&dirs))
        .unwrap()
        .with_strategy(Box::new(ParentDirKey))
        .process_events()
        .unwrap();
    assert_eq!(report.processed, 2);
    assert_eq!(report.failed, 0);

    let merged = read_tile(&dirs.events.join("flood_north.tif")).unwrap();
    assert_eq!((merged.width(), merged.height()), (4, 2));
    assert_eq!(merged.get(0, 0), Some(1.0));
    assert_eq!(merged.get(3, 1), Some(4.0));

    let single = read_tile(&dirs.events.join("flood_south.tif")).unwrap();
    assert_eq!(single.value_range(), Some((2.0, 2.0)));
    assert!(!dirs.events.join("flood_tile_1.tif").exists());
}

#[test]
fn test_missing_crs_uses_default() {
    let dirs = PipelineDirs::new().unwrap();
    let mut grid = geographic_grid(5.0, 45.0, 0.5, 4, 4);
    grid.crs = None;
    write(&dirs.input, identifiers::EVENT_B_TILE, &constant_tile(grid, 1.5));

    let report = FloodPipeline::new(config(&dirs))
        .unwrap()
        .process_events()
        .unwrap();
    assert_eq!(report.processed, 1);

    let out = read_tile(&dirs.events.join("flood_2023-11-10__2023-11-12.tif")).unwrap();
    assert_eq!(out.crs(), Some(&Crs::WGS84));
    assert_eq!(out.value_range(), Some((1.5, 1.5)));
}

#[test]
fn test_event_is_warped_to_output_crs() {
    let dirs = PipelineDirs::new().unwrap();
    let grid = GridDescriptor::new(
        Some(Crs::Epsg(3857)),
        GeoTransform::north_up(1_000_000.0, 5_000_000.0, 1000.0, -1000.0),
        20,
        20,
    )
    .unwrap();
    write(&dirs.input, identifiers::EVENT_A_TILE_X, &constant_tile(grid, 2.0));

    FloodPipeline::new(config(&dirs))
        .unwrap()
        .process_events()
        .unwrap();

    let out = read_tile(&dirs.events.join("flood_2024-01-01__2024-01-05.tif")).unwrap();
    assert_eq!(out.crs(), Some(&Crs::WGS84));
    assert!(out.valid_count() > 0);
    assert_eq!(out.value_range(), Some((2.0, 2.0)));
    // Roughly lon 9.0..9.2 once unprojected
    let bbox = out.bbox();
    assert!((bbox.min_x - 8.98).abs() < 0.05, "min_x = {}", bbox.min_x);
}

// ============================================================================
// Region filter
// ============================================================================

#[test]
fn test_filter_keeps_intersecting_events() {
    let dirs = PipelineDirs::new().unwrap();

    // Westland, Eastland, open ocean
    write(&dirs.events, "flood_a.tif", &constant_tile(geographic_grid(2.0, 48.0, 1.0, 4, 4), 1.0));
    write(&dirs.events, "flood_b.tif", &constant_tile(geographic_grid(21.0, 45.0, 1.0, 2, 2), 1.0));
    write(&dirs.events, "flood_c.tif", &constant_tile(geographic_grid(-40.0, 30.0, 1.0, 2, 2), 1.0));
    // Web Mercator footprint inside Westland
    let merc = GridDescriptor::new(
        Some(Crs::Epsg(3857)),
        GeoTransform::north_up(500_000.0, 5_700_000.0, 1000.0, -1000.0),
        100,
        100,
    )
    .unwrap();
    write(&dirs.events, "flood_d.tif", &constant_tile(merc, 1.0));
    // A stale composite inside Westland must not be copied
    write(
        &dirs.events,
        "flood_ALL_events.tif",
        &constant_tile(geographic_grid(1.0, 49.0, 1.0, 2, 2), 1.0),
    );

    let region = RegionGeometry::from_file(&region_file(&dirs), &["Westland"], &[]).unwrap();
    let report = filter_events(&dirs.events, &region, &dirs.filtered, &TransformerCache::new()).unwrap();

    assert_eq!(report.kept, 2);
    assert_eq!(report.discarded, 2);
    assert!(dirs.filtered.join("flood_a.tif").is_file());
    assert!(dirs.filtered.join("flood_d.tif").is_file());
    assert!(!dirs.filtered.join("flood_b.tif").exists());
    assert!(!dirs.filtered.join("flood_ALL_events.tif").exists());

    // Copies are byte-identical
    assert_eq!(
        std::fs::read(dirs.events.join("flood_a.tif")).unwrap(),
        std::fs::read(dirs.filtered.join("flood_a.tif")).unwrap()
    );
}

#[test]
fn test_filter_copy_failure_does_not_stop_scan() {
    let dirs = PipelineDirs::new().unwrap();
    write(&dirs.events, "flood_a.tif", &constant_tile(geographic_grid(2.0, 48.0, 1.0, 2, 2), 1.0));
    write(&dirs.events, "flood_b.tif", &constant_tile(geographic_grid(5.0, 46.0, 1.0, 2, 2), 1.0));
    // A directory in the way of the first copy
    std::fs::create_dir_all(dirs.filtered.join("flood_a.tif")).unwrap();

    let region = RegionGeometry::from_file(&region_file(&dirs), &["Westland"], &[]).unwrap();
    let report = filter_events(&dirs.events, &region, &dirs.filtered, &TransformerCache::new()).unwrap();

    assert_eq!(report.kept, 1);
    assert_eq!(report.failed, 1);
    assert_eq!(report.failures[0].0, "flood_a.tif");
    assert!(dirs.filtered.join("flood_b.tif").is_file());
}

#[test]
fn test_unknown_region_is_an_error() {
    let dirs = PipelineDirs::new().unwrap();
    let err = RegionGeometry::from_file(&region_file(&dirs), &["Atlantis"], &[]).unwrap_err();
    match err {
        IngestionError::RegionNotFound { names, path } => {
            assert_eq!(names, vec!["Atlantis".to_string()]);
            assert!(path.ends_with("regions.geojson"));
        }
        other => panic!("unexpected error: {other}"),
    }
}

// ============================================================================
// Global composite
// ============================================================================

#[test]
fn test_composite_of_disjoint_events() {
    let dirs = PipelineDirs::new().unwrap();
    write(&dirs.events, "flood_a.tif", &constant_tile(geographic_grid(0.0, 10.0, 1.0, 2, 2), 2.0));
    write(&dirs.events, "flood_b.tif", &constant_tile(geographic_grid(6.0, 2.0, 1.0, 2, 2), 7.0));

    let pipeline = FloodPipeline::new(config(&dirs)).unwrap();
    let report = pipeline.composite_events().unwrap();
    assert_eq!(report.processed, 2);

    let out_path = dirs.events.join("flood_ALL_events.tif");
    let out = read_tile(&out_path).unwrap();
    assert_eq!((out.width(), out.height()), (8, 10));
    assert_eq!(out.get(0, 0), Some(2.0));
    assert_eq!(out.get(7, 9), Some(7.0));
    assert!(out.get(4, 4).unwrap().is_nan());

    // Existing output is left alone
    let again = pipeline.composite_events().unwrap();
    assert_eq!(again.skipped_existing, 1);
    assert_eq!(again.processed, 0);

    // Forced: the previous composite is not read back as an input
    let forced = FloodPipeline::new(config(&dirs))
        .unwrap()
        .with_force(true)
        .composite_events()
        .unwrap();
    assert_eq!(forced.processed, 2);
}

#[test]
fn test_composite_is_capped() {
    let dirs = PipelineDirs::new().unwrap();
    write(&dirs.events, "flood_a.tif", &constant_tile(geographic_grid(0.0, 10.0, 0.01, 300, 100), 1.0));
    write(&dirs.events, "flood_b.tif", &constant_tile(geographic_grid(7.0, 10.0, 0.01, 300, 100), 1.0));

    let cfg = PipelineConfig {
        max_global_dimension: 250,
        ..config(&dirs)
    };
    FloodPipeline::new(cfg).unwrap().composite_events().unwrap();

    let grid = read_grid(&dirs.events.join("flood_ALL_events.tif")).unwrap();
    assert_eq!((grid.width, grid.height), (250, 25));
}

#[test]
fn test_composite_crs_mismatch_aborts() {
    let dirs = PipelineDirs::new().unwrap();
    write(&dirs.events, "flood_a.tif", &constant_tile(geographic_grid(0.0, 10.0, 1.0, 2, 2), 2.0));
    let merc = GridDescriptor::new(
        Some(Crs::Epsg(3857)),
        GeoTransform::north_up(0.0, 1000.0, 100.0, -100.0),
        2,
        2,
    )
    .unwrap();
    write(&dirs.events, "flood_b.tif", &constant_tile(merc, 1.0));

    let err = FloodPipeline::new(config(&dirs))
        .unwrap()
        .composite_events()
        .unwrap_err();
    assert!(err.is_crs_error(), "unexpected error: {err}");
    assert!(!dirs.events.join("flood_ALL_events.tif").exists());
}

#[test]
fn test_composite_crs_error_names_file() {
    let dirs = PipelineDirs::new().unwrap();
    let mut grid = geographic_grid(0.0, 10.0, 1.0, 2, 2);
    grid.crs = None;
    write(&dirs.events, "flood_nocrs.tif", &constant_tile(grid, 1.0));

    let err = FloodPipeline::new(config(&dirs))
        .unwrap()
        .composite_events()
        .unwrap_err();
    assert!(err.is_crs_error(), "unexpected error: {err}");
    assert!(err.to_string().contains("flood_nocrs.tif"), "{err}");
}

#[test]
fn test_unreadable_composite_input_is_skipped() {
    let dirs = PipelineDirs::new().unwrap();
    write(&dirs.events, "flood_a.tif", &constant_tile(geographic_grid(0.0, 10.0, 1.0, 2, 2), 2.0));
    std::fs::write(dirs.events.join("flood_b.tif"), b"corrupt").unwrap();
    write(&dirs.events, "flood_c.tif", &constant_tile(geographic_grid(6.0, 2.0, 1.0, 2, 2), 7.0));

    let report = FloodPipeline::new(config(&dirs))
        .unwrap()
        .composite_events()
        .unwrap();
    assert_eq!(report.processed, 2);
    assert_eq!(report.failed, 1);
    assert_eq!(report.failures[0].0, "flood_b.tif");

    let out = read_tile(&dirs.events.join("flood_ALL_events.tif")).unwrap();
    assert_eq!((out.width(), out.height()), (8, 10));
    assert_eq!(out.value_range(), Some((2.0, 7.0)));
}

#[test]
fn test_composite_without_inputs() {
    let dirs = PipelineDirs::new().unwrap();
    let report = FloodPipeline::new(config(&dirs))
        .unwrap()
        .composite_events()
        .unwrap();
    assert_eq!(report.processed, 0);
    assert_eq!(report.failed, 1);
    assert!(report.failures[0].1.contains("empty input"), "{:?}", report.failures);
    assert!(!dirs.events.join("flood_ALL_events.tif").exists());
}

#[test]
fn test_composite_with_only_unreadable_inputs() {
    let dirs = PipelineDirs::new().unwrap();
    std::fs::write(dirs.events.join("flood_a.tif"), b"corrupt").unwrap();

    let report = FloodPipeline::new(config(&dirs))
        .unwrap()
        .composite_events()
        .unwrap();
    assert_eq!(report.processed, 0);
    assert_eq!(report.failed, 2);
    assert!(!dirs.events.join("flood_ALL_events.tif").exists());
}

// ============================================================================
// Full run
// ============================================================================

#[test]
fn test_run_all_with_region_filter() {
    let dirs = PipelineDirs::new().unwrap();
    seed_inputs(&dirs);

    let cfg = PipelineConfig {
        regions: vec!["Westland".to_string()],
        region_file: Some(region_file(&dirs)),
        ..config(&dirs)
    };
    let reports = FloodPipeline::new(cfg).unwrap().run_all().unwrap();

    let stages: Vec<&str> = reports.iter().map(|r| r.stage.as_str()).collect();
    assert_eq!(stages, vec!["events", "filter", "composite"]);
    assert_eq!(reports[0].processed, 3);
    assert_eq!(reports[1].kept, 1);
    assert_eq!(reports[1].discarded, 2);
    assert_eq!(reports[2].processed, 1);

    let composite = read_tile(&dirs.filtered.join("flood_ALL_events.tif")).unwrap();
    assert_eq!((composite.width(), composite.height()), (4, 4));
    assert_eq!(composite.value_range(), Some((1.0, 3.0)));
}

#[test]
fn test_invalid_config_rejected() {
    let dirs = PipelineDirs::new().unwrap();
    let cfg = PipelineConfig {
        max_event_dimension: 0,
        ..config(&dirs)
    };
    assert!(matches!(
        FloodPipeline::new(cfg),
        Err(IngestionError::InvalidConfig(_))
    ));
}
