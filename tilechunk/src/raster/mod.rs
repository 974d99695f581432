//! Pure-Rust raster backend.
//!
//! Covers what the pipeline needs from a geospatial raster library:
//!
//! - [`RasterDataset`]: GeoTIFF decoding with georeferencing, window reads
//! - [`encode_geotiff`]: tiled GeoTIFF encoding with LZW/Deflate and predictors
//! - [`Crs`], [`Projector`], [`default_transform`]: CRS handling
//! - [`WarpPlan`]: bilinear reprojection onto a destination grid
//! - [`RasterProfile`], [`CreationOptions`]: layered creation settings

mod affine;
mod crs;
mod encoder;
mod error;
mod geokeys;
mod profile;
mod reader;
mod warp;

pub use affine::Affine;
pub use crs::{default_transform, transform_bounds, Crs, DefaultTransform, Projector};
pub use encoder::{encode_geotiff, encode_geotiff_rows};
pub use error::RasterError;
pub use profile::{BlockLayout, Compression, CreationOptions, EncodingOptions, Predictor, RasterProfile};
pub use reader::{RasterDataset, ReadSeek};
pub use warp::{Resampling, WarpPlan};

/// Axis-aligned extent in CRS units.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds {
    pub left: f64,
    pub bottom: f64,
    pub right: f64,
    pub top: f64,
}

impl Bounds {
    pub fn new(left: f64, bottom: f64, right: f64, top: f64) -> Self {
        Self {
            left,
            bottom,
            right,
            top,
        }
    }

    pub fn width(&self) -> f64 {
        self.right - self.left
    }

    pub fn height(&self) -> f64 {
        self.top - self.bottom
    }

    /// Smallest extent containing `self` and `(x, y)`.
    pub fn include(self, x: f64, y: f64) -> Self {
        Self {
            left: self.left.min(x),
            bottom: self.bottom.min(y),
            right: self.right.max(x),
            top: self.top.max(y),
        }
    }

    /// `[left, bottom, right, top]`
    pub fn to_array(&self) -> [f64; 4] {
        [self.left, self.bottom, self.right, self.top]
    }
}

/// Numeric type of raster samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SampleType {
    U8,
    U16,
    U32,
    I8,
    I16,
    I32,
    F32,
    F64,
}

impl SampleType {
    /// Maps TIFF `BitsPerSample` and `SampleFormat` onto a sample type.
    pub fn from_tiff(bits: u16, format: u16) -> Result<Self, RasterError> {
        match (format, bits) {
            (1, 8) => Ok(SampleType::U8),
            (1, 16) => Ok(SampleType::U16),
            (1, 32) => Ok(SampleType::U32),
            (2, 8) => Ok(SampleType::I8),
            (2, 16) => Ok(SampleType::I16),
            (2, 32) => Ok(SampleType::I32),
            (3, 32) => Ok(SampleType::F32),
            (3, 64) => Ok(SampleType::F64),
            _ => Err(RasterError::UnsupportedLayout(format!(
                "{}-bit samples with SampleFormat {}",
                bits, format
            ))),
        }
    }

    pub fn bits(&self) -> u16 {
        self.bytes() as u16 * 8
    }

    pub fn bytes(&self) -> usize {
        match self {
            SampleType::U8 | SampleType::I8 => 1,
            SampleType::U16 | SampleType::I16 => 2,
            SampleType::U32 | SampleType::I32 | SampleType::F32 => 4,
            SampleType::F64 => 8,
        }
    }

    /// TIFF `SampleFormat`: 1 unsigned, 2 signed, 3 IEEE float.
    pub fn sample_format(&self) -> u16 {
        match self {
            SampleType::U8 | SampleType::U16 | SampleType::U32 => 1,
            SampleType::I8 | SampleType::I16 | SampleType::I32 => 2,
            SampleType::F32 | SampleType::F64 => 3,
        }
    }

    pub fn is_float(&self) -> bool {
        matches!(self, SampleType::F32 | SampleType::F64)
    }

    /// Rounds and saturates `value` into the type's range.
    pub fn quantize(&self, value: f64) -> f64 {
        let clamp = |min: f64, max: f64| {
            if value.is_nan() {
                0.0
            } else {
                value.round().clamp(min, max)
            }
        };
        match self {
            SampleType::U8 => clamp(u8::MIN as f64, u8::MAX as f64),
            SampleType::U16 => clamp(u16::MIN as f64, u16::MAX as f64),
            SampleType::U32 => clamp(u32::MIN as f64, u32::MAX as f64),
            SampleType::I8 => clamp(i8::MIN as f64, i8::MAX as f64),
            SampleType::I16 => clamp(i16::MIN as f64, i16::MAX as f64),
            SampleType::I32 => clamp(i32::MIN as f64, i32::MAX as f64),
            SampleType::F32 => value as f32 as f64,
            SampleType::F64 => value,
        }
    }

    /// Appends `value` as a little-endian sample.
    pub(crate) fn write_le(&self, value: f64, out: &mut Vec<u8>) {
        let v = self.quantize(value);
        match self {
            SampleType::U8 => out.push(v as u8),
            SampleType::U16 => out.extend_from_slice(&(v as u16).to_le_bytes()),
            SampleType::U32 => out.extend_from_slice(&(v as u32).to_le_bytes()),
            SampleType::I8 => out.extend_from_slice(&(v as i8).to_le_bytes()),
            SampleType::I16 => out.extend_from_slice(&(v as i16).to_le_bytes()),
            SampleType::I32 => out.extend_from_slice(&(v as i32).to_le_bytes()),
            SampleType::F32 => out.extend_from_slice(&(v as f32).to_le_bytes()),
            SampleType::F64 => out.extend_from_slice(&v.to_le_bytes()),
        }
    }
}

/// Pixel rectangle of a raster.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    pub col_off: u32,
    pub row_off: u32,
    pub width: u32,
    pub height: u32,
}

impl Window {
    pub fn new(col_off: u32, row_off: u32, width: u32, height: u32) -> Self {
        Self {
            col_off,
            row_off,
            width,
            height,
        }
    }

    pub fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }

    /// `true` if absolute pixel `(col, row)` lies inside the window.
    #[inline]
    pub fn contains(&self, col: i64, row: i64) -> bool {
        col >= self.col_off as i64
            && row >= self.row_off as i64
            && col < self.col_off as i64 + self.width as i64
            && row < self.row_off as i64 + self.height as i64
    }
}

/// Shape, type and georeferencing of a raster.
#[derive(Debug, Clone, PartialEq)]
pub struct RasterMeta {
    pub width: u32,
    pub height: u32,
    /// Band count
    pub count: u16,
    pub sample_type: SampleType,
    pub crs: Crs,
    pub transform: Affine,
}

impl RasterMeta {
    /// Extent in CRS units.
    pub fn bounds(&self) -> Bounds {
        let (left, bottom, right, top) = self.transform.bounds(self.width, self.height);
        Bounds::new(left, bottom, right, top)
    }

    /// `(rows, cols)`
    pub fn shape(&self) -> (u32, u32) {
        (self.height, self.width)
    }

    pub fn full_window(&self) -> Window {
        Window::new(0, 0, self.width, self.height)
    }
}

/// Band-separated samples of a window, row-major per band.
#[derive(Debug, Clone, PartialEq)]
pub struct RasterWindow {
    pub window: Window,
    pub bands: Vec<Vec<f64>>,
}

impl RasterWindow {
    /// Sample at absolute pixel `(col, row)` of `band`, if inside the window.
    #[inline]
    pub fn get(&self, band: usize, col: i64, row: i64) -> Option<f64> {
        if !self.window.contains(col, row) {
            return None;
        }
        let c = (col - self.window.col_off as i64) as usize;
        let r = (row - self.window.row_off as i64) as usize;
        self.bands
            .get(band)
            .and_then(|b| b.get(r * self.window.width as usize + c))
            .copied()
    }
}
