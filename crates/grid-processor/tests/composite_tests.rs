//! Integration tests: global composite.

use flood_common::{BoundingBox, Crs};
use grid_processor::{composite, CompositeConfig, Compositor, GlobalExtent, GridProcessorError};
use projection::TransformerCache;
use test_utils::{assert_approx_eq, constant_tile, geographic_grid, tile_from_rows};

fn config(max_dimension: usize) -> CompositeConfig {
    CompositeConfig {
        max_dimension,
        target_crs: Crs::WGS84,
    }
}

#[test]
fn test_disjoint_tiles() {
    // A covers lon 0..2, lat 8..10; B covers lon 6..8, lat 0..2.
    let a = constant_tile(geographic_grid(0.0, 10.0, 1.0, 2, 2), 2.0);
    let b = constant_tile(geographic_grid(6.0, 2.0, 1.0, 2, 2), 7.0);

    let out = composite(&[a, b], &config(2000), &TransformerCache::new()).unwrap();

    assert_eq!(out.bbox(), BoundingBox::new(0.0, 0.0, 8.0, 10.0));
    assert_eq!((out.width(), out.height()), (8, 10));

    for row in 0..10 {
        for col in 0..8 {
            let v = out.get(col, row).unwrap();
            if col < 2 && row < 2 {
                assert_eq!(v, 2.0, "cell ({}, {})", col, row);
            } else if (6..8).contains(&col) && row >= 8 {
                assert_eq!(v, 7.0, "cell ({}, {})", col, row);
            } else {
                assert!(v.is_nan(), "cell ({}, {}) should be empty", col, row);
            }
        }
    }
}

#[test]
fn test_overlapping_tiles_take_max() {
    let a = tile_from_rows(
        geographic_grid(0.0, 2.0, 1.0, 2, 2),
        &[&[1.0, 9.0], &[0.0, -3.0]],
        None,
    );
    let b = tile_from_rows(
        geographic_grid(0.0, 2.0, 1.0, 2, 2),
        &[&[4.0, f32::NAN], &[f32::NAN, 2.0]],
        None,
    );

    let out = composite(&[a, b], &config(2000), &TransformerCache::new()).unwrap();
    assert_eq!(out.get(0, 0), Some(4.0));
    assert_eq!(out.get(1, 0), Some(9.0));
    assert!(out.get(0, 1).unwrap().is_nan());
    assert_eq!(out.get(1, 1), Some(2.0));
}

#[test]
fn test_output_is_capped() {
    let a = constant_tile(geographic_grid(0.0, 10.0, 0.01, 300, 100), 1.0);
    let b = constant_tile(geographic_grid(7.0, 10.0, 0.01, 300, 100), 1.0);

    let out = composite(&[a, b], &config(250), &TransformerCache::new()).unwrap();

    // Native 1000 x 100, factor 4 -> 250 x 25
    assert_eq!((out.width(), out.height()), (250, 25));
    assert_approx_eq!(out.grid().transform.pixel_width, 0.04, 1e-9);
    // Gap between the tiles (lon 3..7) stays empty.
    assert!(out.get(125, 10).unwrap().is_nan());
    assert_eq!(out.get(10, 10), Some(1.0));
    assert_eq!(out.get(240, 10), Some(1.0));
}

#[test]
fn test_crs_mismatch_is_fatal() {
    let a = constant_tile(geographic_grid(0.0, 10.0, 1.0, 2, 2), 1.0);
    let grid_b = geographic_grid(0.0, 10.0, 1.0, 2, 2).with_crs(Crs::Epsg(27704));
    let b = constant_tile(grid_b, 1.0);

    let err = composite(&[a, b], &config(2000), &TransformerCache::new()).unwrap_err();
    assert!(matches!(err, GridProcessorError::CrsMismatch { .. }));
}

#[test]
fn test_empty_composite() {
    let err = composite(&[], &config(2000), &TransformerCache::new()).unwrap_err();
    assert!(matches!(err, GridProcessorError::EmptyInput(_)));
}

#[test]
fn test_streaming_matches_in_memory() {
    let cache = TransformerCache::new();
    let tiles = vec![
        constant_tile(geographic_grid(0.0, 4.0, 0.5, 4, 4), 1.0),
        constant_tile(geographic_grid(1.0, 3.0, 0.5, 4, 4), 3.0),
        constant_tile(geographic_grid(3.0, 1.0, 0.5, 2, 2), 2.0),
    ];

    let in_memory = composite(&tiles, &config(2000), &cache).unwrap();

    let grids: Vec<_> = tiles.iter().map(|t| t.grid().clone()).collect();
    let extent = GlobalExtent::scan(&grids, &Crs::WGS84).unwrap();
    let mut compositor = Compositor::new(&extent, 2000).unwrap();
    for tile in tiles.into_iter().rev() {
        compositor.add(&tile, &cache).unwrap();
    }
    assert_eq!(compositor.merged(), 3);
    let streamed = compositor.finish().unwrap();

    assert_eq!(streamed.grid(), in_memory.grid());
    test_utils::assert_cells_eq!(streamed.data(), in_memory.data());
}

#[test]
fn test_zero_cap_is_config_error() {
    let a = constant_tile(geographic_grid(0.0, 10.0, 1.0, 2, 2), 2.0);
    let err = composite(&[a], &config(0), &TransformerCache::new()).unwrap_err();
    assert!(matches!(err, GridProcessorError::ConfigError(_)));
}
