//! Raster backend errors.

use thiserror::Error;

/// Errors raised while reading, encoding or warping rasters.
#[derive(Debug, Error)]
pub enum RasterError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TIFF error: {0}")]
    Tiff(String),

    #[error("missing georeferencing: {0}")]
    MissingGeoreference(String),

    #[error("unsupported CRS: {0}")]
    UnsupportedCrs(String),

    #[error("unsupported raster layout: {0}")]
    UnsupportedLayout(String),

    #[error("projection failed: {0}")]
    Projection(String),

    #[error("invalid raster data: {0}")]
    InvalidData(String),
}

impl From<tiff::TiffError> for RasterError {
    fn from(e: tiff::TiffError) -> Self {
        match e {
            tiff::TiffError::IoError(io) => RasterError::Io(io),
            other => RasterError::Tiff(other.to_string()),
        }
    }
}
