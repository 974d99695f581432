//! Tile task generation.

use crate::analyzer::ImageSource;
use crate::coord::{lng_lat_to_mercator, max_tile_index, tile_bounds, TileCoord};
use crate::raster::Affine;
use crate::uri::{join, RasterPath};

/// Destination grid of one tile.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TargetMeta {
    /// Pixel to EPSG:3857 mapping.
    pub transform: Affine,
    pub width: u32,
    pub height: u32,
}

/// A single tile to render.
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkTask {
    pub source_uri: RasterPath,
    pub target_meta: TargetMeta,
    /// `{image_folder}/{zoom}/{col}/{row}.tif`
    pub target: String,
    pub tile: TileCoord,
}

/// Emits one task per tile covered by `image`, column-major.
///
/// Indices are clamped to `2^zoom - 1` so extents touching the antimeridian
/// or the poles stay on the grid.
pub fn generate_chunk_tasks(image: &ImageSource, tile_dim: u32) -> Vec<ChunkTask> {
    let zoom = image.zoom;
    let max = max_tile_index(zoom);
    let bounds = &image.tile_bounds;

    let mut tasks = Vec::with_capacity(bounds.tile_count(zoom) as usize);
    for col in bounds.min_col..=bounds.max_col.min(max) {
        for row in bounds.min_row..=bounds.max_row.min(max) {
            let tile = TileCoord::new(col, row, zoom);
            tasks.push(ChunkTask {
                source_uri: image.source_uri.clone(),
                target_meta: target_meta(&tile, tile_dim),
                target: join(&image.image_folder, &format!("{}.tif", tile)),
                tile,
            });
        }
    }
    tasks
}

/// Grid of `tile_dim x tile_dim` pixels spanning `tile` in Web Mercator.
pub fn target_meta(tile: &TileCoord, tile_dim: u32) -> TargetMeta {
    let ll = tile_bounds(tile);
    let (left, bottom) = lng_lat_to_mercator(ll.west, ll.south);
    let (right, top) = lng_lat_to_mercator(ll.east, ll.north);

    TargetMeta {
        transform: Affine::from_bounds(left, bottom, right, top, tile_dim, tile_dim),
        width: tile_dim,
        height: tile_dim,
    }
}
