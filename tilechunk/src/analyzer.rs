//! Image source analysis.
//!
//! Turns a staged working copy into an [`ImageSource`]: its geographic
//! extent, the zoom level matching its native resolution and the range of
//! tiles it covers at that zoom.

use tracing::debug;

use crate::coord::{lng_lat_to_tile, zoom_for_resolution, LngLatBounds, TileBounds};
use crate::error::{ChunkError, ChunkResult};
use crate::raster::{default_transform, Bounds, Crs, Projector, RasterDataset, RasterError, RasterMeta};
use crate::uri::RasterPath;
use crate::workspace::UriSet;

/// Everything later stages need to know about one input image.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageSource {
    /// Normalized form of the job input.
    pub origin_uri: RasterPath,
    /// Staged working copy the tiles are rendered from.
    pub source_uri: RasterPath,
    /// Extent in source CRS units.
    pub src_bounds: Bounds,
    /// `(rows, cols)`
    pub src_shape: (u32, u32),
    pub src_crs: Crs,
    pub zoom: u8,
    pub ll_bounds: LngLatBounds,
    /// Tiles covered at `zoom`, before clamping to the grid.
    pub tile_bounds: TileBounds,
    pub image_folder: String,
    pub order: usize,
}

/// Opens the working copy of `uri_set` and analyzes it.
///
/// # Errors
///
/// Fails with `Analysis` if the working copy cannot be read, carries no
/// usable georeferencing, or its extent cannot be projected.
pub fn analyze_image(uri_set: &UriSet, tile_dim: u32) -> ChunkResult<ImageSource> {
    let source = uri_set.workspace_source_uri.to_string();
    let dataset =
        RasterDataset::open(&uri_set.workspace_source_uri).map_err(|e| ChunkError::analysis(&source, e))?;
    let image = analyze_meta(dataset.meta(), uri_set, tile_dim).map_err(|e| ChunkError::analysis(&source, e))?;

    debug!(
        source = %source,
        zoom = image.zoom,
        cols = %format!("{}..{}", image.tile_bounds.min_col, image.tile_bounds.max_col),
        rows = %format!("{}..{}", image.tile_bounds.min_row, image.tile_bounds.max_row),
        "Analyzed image"
    );
    Ok(image)
}

/// Derives the [`ImageSource`] for a raster described by `meta`.
pub fn analyze_meta(meta: &RasterMeta, uri_set: &UriSet, tile_dim: u32) -> Result<ImageSource, RasterError> {
    let src_bounds = meta.bounds();

    let ll_bounds = geographic_bounds(meta, &src_bounds)?;
    let resolution = mercator_resolution(meta, &src_bounds)?;
    let zoom = zoom_for_resolution(resolution, tile_dim);
    let tile_bounds = covering_tiles(&ll_bounds, zoom);

    Ok(ImageSource {
        origin_uri: uri_set.source_uri.clone(),
        source_uri: uri_set.workspace_source_uri.clone(),
        src_bounds,
        src_shape: meta.shape(),
        src_crs: meta.crs,
        zoom,
        ll_bounds,
        tile_bounds,
        image_folder: uri_set.image_folder.clone(),
        order: uri_set.order,
    })
}

/// Extent of the suggested EPSG:4326 warp grid.
fn geographic_bounds(meta: &RasterMeta, src_bounds: &Bounds) -> Result<LngLatBounds, RasterError> {
    let projector = Projector::new(meta.crs, Crs::WGS84)?;
    let grid = default_transform(&projector, meta.width, meta.height, src_bounds)?;

    let (west, north) = (grid.transform.c, grid.transform.f);
    let (east, south) = grid.transform.apply(grid.width as f64, grid.height as f64);
    Ok(LngLatBounds {
        west,
        south,
        east,
        north,
    })
}

/// Coarser axis pixel size, in metres, of the suggested EPSG:3857 warp grid.
fn mercator_resolution(meta: &RasterMeta, src_bounds: &Bounds) -> Result<f64, RasterError> {
    let projector = Projector::new(meta.crs, Crs::WEB_MERCATOR)?;
    let grid = default_transform(&projector, meta.width, meta.height, src_bounds)?;
    Ok(grid.transform.a.abs().max(grid.transform.e.abs()))
}

/// Opposite corners are resolved independently; the north-west corner gives
/// the minimum indices.
fn covering_tiles(bounds: &LngLatBounds, zoom: u8) -> TileBounds {
    let min = lng_lat_to_tile(bounds.west, bounds.north, zoom);
    let max = lng_lat_to_tile(bounds.east, bounds.south, zoom);
    TileBounds {
        min_col: min.col,
        min_row: min.row,
        max_col: max.col,
        max_row: max.row,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coord::max_tile_index;
    use crate::raster::{Affine, SampleType};
    use crate::workspace::plan_workspace;

    fn uri_set() -> UriSet {
        plan_workspace(&["/data/scene.tif".to_string()], "/ws")
            .unwrap()
            .remove(0)
    }

    fn geographic(west: f64, south: f64, east: f64, north: f64, width: u32, height: u32) -> RasterMeta {
        RasterMeta {
            width,
            height,
            count: 1,
            sample_type: SampleType::U8,
            crs: Crs::WGS84,
            transform: Affine::from_bounds(west, south, east, north, width, height),
        }
    }

    #[test]
    fn test_small_geographic_scene() {
        // 0.001° pixels at 50°N are ~145 m in Web Mercator
        let meta = geographic(10.0, 50.0, 10.1, 50.1, 100, 100);
        let image = analyze_meta(&meta, &uri_set(), 256).unwrap();

        assert_eq!(image.zoom, 10);
        assert!((image.ll_bounds.west - 10.0).abs() < 1e-9);
        assert!((image.ll_bounds.north - 50.1).abs() < 1e-9);
        assert!((image.ll_bounds.east - 10.1).abs() < 1e-6);
        assert!((image.ll_bounds.south - 50.0).abs() < 1e-6);
        assert_eq!(
            image.tile_bounds,
            TileBounds {
                min_col: 540,
                min_row: 346,
                max_col: 540,
                max_row: 347,
            }
        );
    }

    #[test]
    fn test_record_carries_planning_fields() {
        let plan = uri_set();
        let meta = geographic(10.0, 50.0, 10.1, 50.1, 100, 100);
        let image = analyze_meta(&meta, &plan, 256).unwrap();

        assert_eq!(image.origin_uri, plan.source_uri);
        assert_eq!(image.source_uri, plan.workspace_source_uri);
        assert_eq!(image.image_folder, "/ws/scene");
        assert_eq!(image.order, 0);
        assert_eq!(image.src_shape, (100, 100));
        assert_eq!(image.src_crs, Crs::WGS84);
    }

    #[test]
    fn test_resolution_uses_projected_units() {
        // Same pixel count, ten times finer pixels: zoom must go up by ~3.3
        let coarse = analyze_meta(&geographic(10.0, 50.0, 11.0, 51.0, 100, 100), &uri_set(), 256).unwrap();
        let fine = analyze_meta(&geographic(10.0, 50.0, 10.1, 50.1, 100, 100), &uri_set(), 256).unwrap();
        assert!(fine.zoom >= coarse.zoom + 3);
    }

    #[test]
    fn test_mercator_source() {
        let (x0, y0) = crate::coord::lng_lat_to_mercator(10.0, 50.0);
        let (x1, y1) = crate::coord::lng_lat_to_mercator(10.1, 50.1);
        let meta = RasterMeta {
            crs: Crs::WEB_MERCATOR,
            transform: Affine::from_bounds(x0, y0, x1, y1, 100, 100),
            ..geographic(0.0, 0.0, 1.0, 1.0, 100, 100)
        };
        let image = analyze_meta(&meta, &uri_set(), 256).unwrap();

        assert_eq!(image.zoom, 10);
        assert!((image.ll_bounds.west - 10.0).abs() < 1e-6);
        assert!((image.ll_bounds.north - 50.1).abs() < 1e-6);
    }

    #[test]
    fn test_world_extent_stays_on_grid() {
        let meta = geographic(-180.0, -90.0, 180.0, 90.0, 3600, 1800);
        let image = analyze_meta(&meta, &uri_set(), 256).unwrap();
        let max = max_tile_index(image.zoom);

        assert_eq!((image.tile_bounds.min_col, image.tile_bounds.min_row), (0, 0));
        assert!(image.tile_bounds.max_col <= max);
        assert!(image.tile_bounds.max_row <= max);
    }

    #[test]
    fn test_missing_file_is_analysis_error() {
        let err = analyze_image(&uri_set(), 256).unwrap_err();
        assert_eq!(err.kind(), "AnalysisError");
    }
}
