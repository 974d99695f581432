//! Working-copy staging.

use tracing::debug;

use super::UriSet;
use crate::error::{ChunkError, ChunkResult};
use crate::raster::{encode_geotiff_rows, CreationOptions, RasterDataset, RasterError, RasterProfile};
use crate::storage::{PutOptions, TargetWriter};
use crate::uri::RasterPath;

/// Re-encodes sources into tiled, LZW-compressed working copies.
#[derive(Clone)]
pub struct WorkspaceStager {
    writer: TargetWriter,
    options: CreationOptions,
}

impl WorkspaceStager {
    /// Stager writing through `writer` with square blocks of `block_size`.
    pub fn new(writer: TargetWriter, block_size: u32) -> Self {
        Self {
            writer,
            options: CreationOptions::working_copy(block_size),
        }
    }

    /// Copies every band of `uri_set.source_uri` to its workspace target.
    pub fn stage(&self, uri_set: &UriSet) -> ChunkResult<()> {
        let source = uri_set.source_uri.to_string();
        let bytes = self
            .encode(&uri_set.source_uri)
            .map_err(|e| ChunkError::staging(&source, e))?;
        let size = bytes.len();

        self.writer
            .put(&uri_set.workspace_target, bytes, &PutOptions::tiff())
            .map_err(|e| ChunkError::staging(&source, e))?;

        debug!(
            source = %source,
            target = %uri_set.workspace_target,
            bytes = size,
            "Staged working copy"
        );
        Ok(())
    }

    /// Streams the source through the encoder one block row at a time.
    fn encode(&self, path: &RasterPath) -> Result<Vec<u8>, RasterError> {
        let mut dataset = RasterDataset::open(path)?;
        let profile = RasterProfile::from_meta(dataset.meta()).with_creation_options(&self.options);
        encode_geotiff_rows(&profile, |window| Ok(dataset.read_window(window)?.bands))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::raster::{encode_geotiff, Affine, Compression, Crs, RasterMeta, SampleType};
    use crate::workspace::plan_workspace;
    use std::fs;
    use std::io::Cursor;

    fn write_source(path: &std::path::Path) {
        let meta = RasterMeta {
            width: 20,
            height: 10,
            count: 1,
            sample_type: SampleType::U8,
            crs: Crs::WGS84,
            transform: Affine::from_bounds(5.0, 45.0, 5.2, 45.1, 20, 10),
        };
        let band: Vec<f64> = (0..200).map(|i| (i % 250) as f64).collect();
        let bytes = encode_geotiff(&RasterProfile::from_meta(&meta), &[band]).unwrap();
        fs::write(path, bytes).unwrap();
    }

    #[test]
    fn test_stage_writes_tiled_lzw_copy() {
        let temp = tempfile::tempdir().unwrap();
        let source = temp.path().join("scene.tif");
        write_source(&source);
        let workspace = temp.path().join("ws");

        let plan = plan_workspace(
            &[source.to_str().unwrap().to_string()],
            workspace.to_str().unwrap(),
        )
        .unwrap();
        WorkspaceStager::new(TargetWriter::local_only(), 16)
            .stage(&plan[0])
            .unwrap();

        let staged = fs::read(workspace.join("scene-workingcopy.tif")).unwrap();
        let mut dataset = RasterDataset::from_reader(Box::new(Cursor::new(staged)), "staged").unwrap();
        assert_eq!(dataset.meta().crs, Crs::WGS84);
        assert_eq!((dataset.meta().width, dataset.meta().height), (20, 10));

        let expected: Vec<f64> = (0..200).map(|i| (i % 250) as f64).collect();
        assert_eq!(dataset.read_all().unwrap().bands[0], expected);
    }

    #[test]
    fn test_stage_taller_than_one_block_row() {
        let temp = tempfile::tempdir().unwrap();
        let source = temp.path().join("tall.tif");
        let meta = RasterMeta {
            width: 20,
            height: 45,
            count: 3,
            sample_type: SampleType::U8,
            crs: Crs::WGS84,
            transform: Affine::from_bounds(5.0, 45.0, 5.2, 45.45, 20, 45),
        };
        let bands: Vec<Vec<f64>> = (0..3)
            .map(|b| (0..900).map(|i| ((i * 3 + b * 40) % 255) as f64).collect())
            .collect();
        fs::write(&source, encode_geotiff(&RasterProfile::from_meta(&meta), &bands).unwrap()).unwrap();

        let plan = plan_workspace(
            &[source.to_str().unwrap().to_string()],
            temp.path().join("ws").to_str().unwrap(),
        )
        .unwrap();
        let stager = WorkspaceStager::new(TargetWriter::local_only(), 16);
        stager.stage(&plan[0]).unwrap();

        // Three block rows of 16, the last one partial
        let staged = fs::read(temp.path().join("ws").join("tall-workingcopy.tif")).unwrap();
        let whole = RasterProfile::from_meta(&meta).with_creation_options(&stager.options);
        assert_eq!(staged, encode_geotiff(&whole, &bands).unwrap());

        let mut dataset = RasterDataset::from_reader(Box::new(Cursor::new(staged)), "staged").unwrap();
        assert_eq!(dataset.read_all().unwrap().bands, bands);
    }

    #[test]
    fn test_options_are_working_copy_profile() {
        let stager = WorkspaceStager::new(TargetWriter::local_only(), 512);
        assert_eq!(stager.options.encoding.compression, Compression::Lzw);
        assert!(stager.options.encoding.sparse_ok);
        assert_eq!(stager.options.crs, None);
    }

    #[test]
    fn test_missing_source_is_staging_error() {
        let temp = tempfile::tempdir().unwrap();
        let plan = plan_workspace(
            &[temp.path().join("absent.tif").to_str().unwrap().to_string()],
            temp.path().to_str().unwrap(),
        )
        .unwrap();

        let err = WorkspaceStager::new(TargetWriter::local_only(), 512)
            .stage(&plan[0])
            .unwrap_err();
        assert_eq!(err.kind(), "StagingError");
    }
}
