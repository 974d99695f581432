//! Job manifest.
//!
//! The manifest lists, in job input order, where each image's tiles were
//! written and which part of the tile grid they cover:
//!
//! ```json
//! {
//!   "jobId": "job-1",
//!   "target": "s3://tiles/job-1",
//!   "tileSize": 1024,
//!   "input": [{
//!     "sourceUri": "/data/scene.tif",
//!     "extent": {"xmin": 10.0, "ymin": 50.0, "xmax": 10.1, "ymax": 50.1},
//!     "zoom": 10,
//!     "gridBounds": {"colMin": 540, "rowMin": 346, "colMax": 540, "rowMax": 347},
//!     "tiles": "/ws/scene"
//!   }]
//! }
//! ```

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::analyzer::ImageSource;
use crate::error::{ChunkError, ChunkResult};
use crate::storage::{PutOptions, TargetWriter};

/// Geographic extent in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Extent {
    pub xmin: f64,
    pub ymin: f64,
    pub xmax: f64,
    pub ymax: f64,
}

/// Inclusive tile index range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GridBounds {
    pub col_min: u32,
    pub row_min: u32,
    pub col_max: u32,
    pub row_max: u32,
}

/// Manifest entry for one input image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageInfo {
    pub source_uri: String,
    pub extent: Extent,
    pub zoom: u8,
    pub grid_bounds: GridBounds,
    /// Folder holding `{zoom}/{col}/{row}.tif`.
    pub tiles: String,
}

impl From<&ImageSource> for ImageInfo {
    fn from(image: &ImageSource) -> Self {
        let ll = &image.ll_bounds;
        let grid = &image.tile_bounds;
        Self {
            source_uri: image.origin_uri.to_string(),
            extent: Extent {
                xmin: ll.west,
                ymin: ll.south,
                xmax: ll.east,
                ymax: ll.north,
            },
            zoom: image.zoom,
            grid_bounds: GridBounds {
                col_min: grid.min_col,
                row_min: grid.min_row,
                col_max: grid.max_col,
                row_max: grid.max_row,
            },
            tiles: image.image_folder.clone(),
        }
    }
}

/// Result document of a chunk job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobManifest {
    pub job_id: String,
    pub target: String,
    pub tile_size: u32,
    pub input: Vec<ImageInfo>,
}

/// Builds the manifest, listing `images` by ascending `order`.
pub fn build_manifest(job_id: &str, target: &str, tile_size: u32, mut images: Vec<ImageSource>) -> JobManifest {
    images.sort_by_key(|image| image.order);
    JobManifest {
        job_id: job_id.to_string(),
        target: target.to_string(),
        tile_size,
        input: images.iter().map(ImageInfo::from).collect(),
    }
}

/// Serializes `manifest` as JSON and writes it to `output`.
pub fn write_manifest(writer: &TargetWriter, output: &str, manifest: &JobManifest) -> ChunkResult<()> {
    let body = serde_json::to_vec(manifest).map_err(|e| ChunkError::Manifest(e.to_string()))?;
    writer.put(output, body, &PutOptions::json())?;
    info!(output = %output, images = manifest.input.len(), "Wrote manifest");
    Ok(())
}
