//! Coordinate conversion module
//!
//! Provides conversions between geographic coordinates (longitude/latitude)
//! and slippy-map tile coordinates, plus the zoom selection rule that maps a
//! ground resolution onto the tile pyramid.
//!
//! Tile indexing follows the standard web-map scheme: tile (0, 0) covers the
//! whole world at zoom 0, columns increase eastward and rows increase
//! southward from the top-left corner.

mod types;

pub use types::{LngLatBounds, TileBounds, TileCoord};

use std::f64::consts::PI;

/// Earth radius used by the spherical Web Mercator projection, in metres.
pub const EARTH_RADIUS: f64 = 6_378_137.0;

/// Circumference of the Web Mercator world square, in metres.
pub const EARTH_CIRCUMFERENCE: f64 = 2.0 * PI * EARTH_RADIUS;

/// Latitude limit of the Web Mercator projection.
pub const MAX_LAT: f64 = 85.051_128_779_806_59;

/// Minimum latitude of the Web Mercator projection.
pub const MIN_LAT: f64 = -MAX_LAT;

/// Highest zoom level the tiler will select.
pub const MAX_ZOOM: u8 = 30;

/// Fractional part above which the zoom level is rounded up instead of down.
pub const ZOOM_ROUND_UP_THRESHOLD: f64 = 0.20;

const TILE_EPSILON: f64 = 1e-14;

/// Picks the zoom level whose tile resolution best matches `resolution`.
///
/// `zoom = log2(2πR / (resolution · tile_dim))`, rounded up when the
/// fractional part exceeds 0.20 and truncated otherwise, so near-threshold
/// images land one level sharper instead of visibly blurrier.
///
/// # Arguments
///
/// * `resolution` - Ground size of one source pixel in Web Mercator metres
/// * `tile_dim` - Output tile edge length in pixels
pub fn zoom_for_resolution(resolution: f64, tile_dim: u32) -> u8 {
    let zoom = (EARTH_CIRCUMFERENCE / (resolution * tile_dim as f64)).log2();
    if !zoom.is_finite() {
        return if zoom > 0.0 { MAX_ZOOM } else { 0 };
    }

    let whole = zoom.trunc();
    let rounded = if zoom - whole > ZOOM_ROUND_UP_THRESHOLD {
        whole + 1.0
    } else {
        whole
    };

    rounded.clamp(0.0, MAX_ZOOM as f64) as u8
}

/// Number of tiles along each axis at `zoom`.
#[inline]
pub fn tiles_per_side(zoom: u8) -> u32 {
    1u32 << zoom.min(31)
}

/// Largest valid column or row index at `zoom`.
#[inline]
pub fn max_tile_index(zoom: u8) -> u32 {
    tiles_per_side(zoom) - 1
}

/// Returns the tile containing a longitude/latitude position.
///
/// Positions outside the Web Mercator square (poles, antimeridian overshoot)
/// are clamped to the edge tiles, so the result is always a valid index at
/// `zoom`.
#[inline]
pub fn lng_lat_to_tile(lng: f64, lat: f64, zoom: u8) -> TileCoord {
    let n = tiles_per_side(zoom) as f64;
    let max = max_tile_index(zoom);

    let x = lng / 360.0 + 0.5;
    let sin_lat = (lat * PI / 180.0).sin();
    let y = 0.5 - 0.25 * ((1.0 + sin_lat) / (1.0 - sin_lat)).ln() / PI;

    let index = |v: f64| -> u32 {
        if v.is_nan() || v <= 0.0 {
            0
        } else if v >= 1.0 {
            max
        } else {
            (((v + TILE_EPSILON) * n).floor() as u32).min(max)
        }
    };

    TileCoord {
        col: index(x),
        row: index(y),
        zoom,
    }
}

/// Converts tile coordinates back to the tile's geographic bounds.
#[inline]
pub fn tile_bounds(tile: &TileCoord) -> LngLatBounds {
    let (north, west) = tile_to_lat_lon(tile.col, tile.row, tile.zoom);
    let (south, east) = tile_to_lat_lon(tile.col + 1, tile.row + 1, tile.zoom);
    LngLatBounds {
        west,
        south,
        east,
        north,
    }
}

/// Latitude/longitude of the northwest corner of the tile at `(col, row)`.
#[inline]
fn tile_to_lat_lon(col: u32, row: u32, zoom: u8) -> (f64, f64) {
    let n = tiles_per_side(zoom) as f64;

    let lon = col as f64 / n * 360.0 - 180.0;

    // Inverse Web Mercator for the row edge
    let y = row as f64 / n;
    let lat_rad = (PI * (1.0 - 2.0 * y)).sinh().atan();
    let lat = lat_rad * 180.0 / PI;

    (lat, lon)
}

/// Projects longitude/latitude in degrees onto spherical Web Mercator metres.
///
/// Latitudes are clamped to the projection limit so poles stay finite.
#[inline]
pub fn lng_lat_to_mercator(lng: f64, lat: f64) -> (f64, f64) {
    let lat = lat.clamp(MIN_LAT, MAX_LAT);
    let x = EARTH_RADIUS * lng.to_radians();
    let y = EARTH_RADIUS * (lat.to_radians().tan()).asinh();
    (x, y)
}

/// Inverse of [`lng_lat_to_mercator`].
#[inline]
pub fn mercator_to_lng_lat(x: f64, y: f64) -> (f64, f64) {
    let lng = (x / EARTH_RADIUS).to_degrees();
    let lat = (y / EARTH_RADIUS).sinh().atan().to_degrees();
    (lng, lat)
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f64 = 1e-6;

    /// Resolution producing an exact (unrounded) zoom of `z` for `tile_dim`.
    fn resolution_for(z: f64, tile_dim: u32) -> f64 {
        EARTH_CIRCUMFERENCE / (2f64.powf(z) * tile_dim as f64)
    }

    #[test]
    fn test_zoom_exact_level() {
        assert_eq!(zoom_for_resolution(resolution_for(12.0, 1024), 1024), 12);
    }

    #[test]
    fn test_zoom_fraction_below_threshold_floors() {
        assert_eq!(zoom_for_resolution(resolution_for(12.19, 1024), 1024), 12);
        assert_eq!(zoom_for_resolution(resolution_for(12.199, 256), 256), 12);
    }

    #[test]
    fn test_zoom_fraction_above_threshold_rounds_up() {
        assert_eq!(zoom_for_resolution(resolution_for(12.21, 1024), 1024), 13);
        assert_eq!(zoom_for_resolution(resolution_for(12.201, 256), 256), 13);
        assert_eq!(zoom_for_resolution(resolution_for(12.9, 512), 512), 13);
    }

    #[test]
    fn test_zoom_for_coarse_resolution_is_zero() {
        // A single pixel wider than the world
        assert_eq!(zoom_for_resolution(EARTH_CIRCUMFERENCE * 4.0, 1024), 0);
    }

    #[test]
    fn test_zoom_for_degenerate_resolution_is_clamped() {
        assert_eq!(zoom_for_resolution(0.0, 1024), MAX_ZOOM);
        assert_eq!(zoom_for_resolution(1e-12, 1024), MAX_ZOOM);
    }

    #[test]
    fn test_new_york_city_at_zoom_16() {
        // New York City: 40.7128°N, 74.0060°W
        let tile = lng_lat_to_tile(-74.0060, 40.7128, 16);
        assert_eq!(tile.row, 24640);
        assert_eq!(tile.col, 19295);
        assert_eq!(tile.zoom, 16);
    }

    #[test]
    fn test_zoom_zero_is_single_tile() {
        let tile = lng_lat_to_tile(123.0, -45.0, 0);
        assert_eq!((tile.col, tile.row), (0, 0));
    }

    #[test]
    fn test_poles_and_antimeridian_clamp() {
        let zoom = 5;
        let max = max_tile_index(zoom);

        let north_west = lng_lat_to_tile(-180.0, 90.0, zoom);
        assert_eq!((north_west.col, north_west.row), (0, 0));

        let south_east = lng_lat_to_tile(180.0, -90.0, zoom);
        assert_eq!((south_east.col, south_east.row), (max, max));

        let overshoot = lng_lat_to_tile(190.0, -95.0, zoom);
        assert_eq!((overshoot.col, overshoot.row), (max, max));
    }

    #[test]
    fn test_tile_bounds_world() {
        let bounds = tile_bounds(&TileCoord::new(0, 0, 0));
        assert!((bounds.west + 180.0).abs() < EPS);
        assert!((bounds.east - 180.0).abs() < EPS);
        assert!((bounds.north - MAX_LAT).abs() < EPS);
        assert!((bounds.south + MAX_LAT).abs() < EPS);
    }

    #[test]
    fn test_tile_bounds_contain_source_point() {
        let (lng, lat) = (-0.1278, 51.5074); // London
        for zoom in [0, 5, 10, 15, 18] {
            let tile = lng_lat_to_tile(lng, lat, zoom);
            let bounds = tile_bounds(&tile);
            assert!(
                bounds.west <= lng && lng < bounds.east,
                "zoom {}: lng {} outside [{}, {})",
                zoom,
                lng,
                bounds.west,
                bounds.east
            );
            assert!(
                bounds.south < lat && lat <= bounds.north,
                "zoom {}: lat {} outside ({}, {}]",
                zoom,
                lat,
                bounds.south,
                bounds.north
            );
        }
    }

    #[test]
    fn test_mercator_origin() {
        let (x, y) = lng_lat_to_mercator(0.0, 0.0);
        assert!(x.abs() < EPS);
        assert!(y.abs() < EPS);
    }

    #[test]
    fn test_mercator_world_edge() {
        let (x, y) = lng_lat_to_mercator(180.0, MAX_LAT);
        assert!((x - EARTH_CIRCUMFERENCE / 2.0).abs() < 1e-3);
        assert!((y - EARTH_CIRCUMFERENCE / 2.0).abs() < 1e-3);
    }

    #[test]
    fn test_mercator_roundtrip() {
        for (lng, lat) in [(10.0, 51.5), (-122.4, 37.8), (139.7, 35.7), (0.0, -60.0)] {
            let (x, y) = lng_lat_to_mercator(lng, lat);
            let (lng2, lat2) = mercator_to_lng_lat(x, y);
            assert!((lng - lng2).abs() < EPS, "lng {} != {}", lng, lng2);
            assert!((lat - lat2).abs() < EPS, "lat {} != {}", lat, lat2);
        }
    }

    #[test]
    fn test_mercator_pole_is_finite() {
        let (_, y) = lng_lat_to_mercator(0.0, 90.0);
        assert!(y.is_finite());
    }

    mod properties {
        use super::super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn tile_indices_stay_in_range(
                lng in -400.0f64..400.0,
                lat in -100.0f64..100.0,
                zoom in 0u8..=22,
            ) {
                let tile = lng_lat_to_tile(lng, lat, zoom);
                prop_assert!(tile.col <= max_tile_index(zoom));
                prop_assert!(tile.row <= max_tile_index(zoom));
            }

            #[test]
            fn zoom_is_monotonic_in_resolution(
                resolution in 0.01f64..100_000.0,
                factor in 1.0f64..10.0,
            ) {
                let fine = zoom_for_resolution(resolution, 1024);
                let coarse = zoom_for_resolution(resolution * factor, 1024);
                prop_assert!(coarse <= fine);
            }
        }
    }
}
