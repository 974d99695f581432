//! Tile rendering.
//!
//! A [`ChunkTask`] is rendered by warping every band of its working copy
//! onto the tile grid (bilinear, nodata 0). Tiles whose bands all come out
//! zero are skipped without writing anything; everything else is encoded
//! as a Deflate-compressed Web Mercator GeoTIFF and written to the task
//! target.

use tracing::{debug, trace};

use crate::error::{ChunkError, ChunkResult};
use crate::raster::{
    encode_geotiff, CreationOptions, RasterDataset, RasterError, RasterProfile, Resampling, WarpPlan,
};
use crate::storage::{PutOptions, TargetWriter};
use crate::tasks::ChunkTask;

/// Source value treated as missing while warping.
pub const NODATA: f64 = 0.0;

/// What happened to a tile.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderOutcome {
    Written,
    /// Every warped band was zero; no file was produced.
    SkippedEmpty,
}

/// Renders chunk tasks through a [`TargetWriter`].
#[derive(Clone)]
pub struct TileRenderer {
    writer: TargetWriter,
    options: CreationOptions,
}

impl TileRenderer {
    pub fn new(writer: TargetWriter) -> Self {
        Self {
            writer,
            options: CreationOptions::web_mercator_tile(),
        }
    }

    /// Renders one tile.
    ///
    /// # Errors
    ///
    /// Fails with `Render` if the source cannot be read or warped, or the
    /// tile cannot be written. An empty tile is not an error.
    pub fn render(&self, task: &ChunkTask) -> ChunkResult<RenderOutcome> {
        let Some(bytes) = self
            .warp(task)
            .map_err(|e| ChunkError::render(&task.target, e))?
        else {
            trace!(tile = %task.tile, "Skipped empty tile");
            return Ok(RenderOutcome::SkippedEmpty);
        };

        let size = bytes.len();
        self.writer
            .put(&task.target, bytes, &PutOptions::tiff())
            .map_err(|e| ChunkError::render(&task.target, e))?;

        debug!(tile = %task.tile, target = %task.target, bytes = size, "Rendered tile");
        Ok(RenderOutcome::Written)
    }

    /// Encoded tile, or `None` when every warped band is zero.
    fn warp(&self, task: &ChunkTask) -> Result<Option<Vec<u8>>, RasterError> {
        let mut dataset = RasterDataset::open(&task.source_uri)?;
        let meta = dataset.meta().clone();
        let grid = &task.target_meta;

        let profile = RasterProfile::from_meta(&meta)
            .with_creation_options(&self.options)
            .with_grid(grid.transform, grid.width, grid.height);

        let plan = WarpPlan::new(
            &meta,
            &grid.transform,
            profile.crs,
            grid.width,
            grid.height,
            Resampling::Bilinear,
        )?;
        let Some(window) = plan.source_window() else {
            return Ok(None);
        };

        let source = dataset.read_window(window)?;
        let warped: Vec<Vec<f64>> = (0..meta.count as usize)
            .map(|band| {
                plan.reproject_band(&source, band, NODATA)
                    .into_iter()
                    .map(|v| meta.sample_type.quantize(v))
                    .collect()
            })
            .collect();

        if warped.iter().all(|band| band.iter().all(|&v| v == 0.0)) {
            return Ok(None);
        }
        encode_geotiff(&profile, &warped).map(Some)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coord::TileCoord;
    use crate::raster::{Affine, Crs, RasterMeta, SampleType};
    use crate::tasks::target_meta;
    use crate::uri::RasterPath;
    use std::fs;
    use std::path::Path;
    use tiff::decoder::Decoder;
    use tiff::tags::Tag;

    /// 0.1° square at 10°E 50.1°N, zero in the northern half.
    fn write_source(path: &Path, fill: impl Fn(u32) -> f64) {
        let meta = RasterMeta {
            width: 100,
            height: 100,
            count: 1,
            sample_type: SampleType::U8,
            crs: Crs::WGS84,
            transform: Affine::from_bounds(10.0, 50.0, 10.1, 50.1, 100, 100),
        };
        let band: Vec<f64> = (0..100 * 100).map(|i| fill(i / 100)).collect();
        let profile = RasterProfile::from_meta(&meta).with_creation_options(&CreationOptions::working_copy(16));
        fs::write(path, encode_geotiff(&profile, &[band]).unwrap()).unwrap();
    }

    fn task(source: &Path, out: &Path, tile: TileCoord) -> ChunkTask {
        ChunkTask {
            source_uri: RasterPath::Local(source.to_path_buf()),
            target_meta: target_meta(&tile, 256),
            target: out.join(format!("{}.tif", tile)).to_string_lossy().into_owned(),
            tile,
        }
    }

    #[test]
    fn test_renders_covered_tile() {
        let temp = tempfile::tempdir().unwrap();
        let source = temp.path().join("src.tif");
        write_source(&source, |row| if row < 50 { 0.0 } else { 200.0 });

        let task = task(&source, &temp.path().join("out"), TileCoord::new(540, 347, 10));
        let outcome = TileRenderer::new(TargetWriter::local_only()).render(&task).unwrap();
        assert_eq!(outcome, RenderOutcome::Written);

        let bytes = fs::read(&task.target).unwrap();
        let mut decoder = Decoder::new(std::io::Cursor::new(bytes)).unwrap();
        assert_eq!(decoder.dimensions().unwrap(), (256, 256));
        assert_eq!(decoder.get_tag_u32(Tag::Compression).unwrap(), 8);
        assert_eq!(decoder.get_tag_u32(Tag::TileWidth).unwrap(), 256);
    }

    #[test]
    fn test_all_zero_tile_is_skipped() {
        let temp = tempfile::tempdir().unwrap();
        let source = temp.path().join("src.tif");
        write_source(&source, |row| if row < 50 { 0.0 } else { 200.0 });

        // Covers only the zero-valued northern half
        let task = task(&source, &temp.path().join("out"), TileCoord::new(540, 346, 10));
        let outcome = TileRenderer::new(TargetWriter::local_only()).render(&task).unwrap();

        assert_eq!(outcome, RenderOutcome::SkippedEmpty);
        assert!(!Path::new(&task.target).exists());
    }

    #[test]
    fn test_tile_outside_source_is_skipped() {
        let temp = tempfile::tempdir().unwrap();
        let source = temp.path().join("src.tif");
        write_source(&source, |_| 7.0);

        let task = task(&source, &temp.path().join("out"), TileCoord::new(0, 0, 10));
        let outcome = TileRenderer::new(TargetWriter::local_only()).render(&task).unwrap();
        assert_eq!(outcome, RenderOutcome::SkippedEmpty);
    }

    #[test]
    fn test_missing_source_is_render_error() {
        let temp = tempfile::tempdir().unwrap();
        let task = task(
            &temp.path().join("missing.tif"),
            temp.path(),
            TileCoord::new(540, 347, 10),
        );
        let err = TileRenderer::new(TargetWriter::local_only()).render(&task).unwrap_err();
        assert_eq!(err.kind(), "RenderError");
    }
}
