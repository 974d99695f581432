//! Raster creation profiles.
//!
//! A [`RasterProfile`] is assembled in layers: the source raster's metadata,
//! then a [`CreationOptions`] set (CRS and encoding), then the destination
//! grid. Later layers override earlier ones.

use super::{Affine, Crs, RasterMeta, SampleType};

/// Block compression.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compression {
    None,
    Lzw,
    Deflate,
}

impl Compression {
    /// TIFF `Compression` tag value.
    pub fn tiff_code(&self) -> u16 {
        match self {
            Compression::None => 1,
            Compression::Lzw => 5,
            Compression::Deflate => 8,
        }
    }
}

/// Differencing applied before compression.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Predictor {
    None,
    /// Integer horizontal differencing (TIFF predictor 2).
    Horizontal,
    /// Byte-plane floating-point differencing (TIFF predictor 3).
    FloatingPoint,
}

impl Predictor {
    /// The predictor usable for `sample_type`: differencing requests pick
    /// predictor 2 for integers and 3 for floats.
    pub fn resolve(self, sample_type: SampleType) -> Predictor {
        match self {
            Predictor::None => Predictor::None,
            Predictor::Horizontal | Predictor::FloatingPoint if sample_type.is_float() => {
                Predictor::FloatingPoint
            }
            Predictor::Horizontal | Predictor::FloatingPoint => Predictor::Horizontal,
        }
    }

    /// TIFF `Predictor` tag value.
    pub fn tiff_code(&self) -> u16 {
        match self {
            Predictor::None => 1,
            Predictor::Horizontal => 2,
            Predictor::FloatingPoint => 3,
        }
    }
}

/// Internal block organisation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockLayout {
    Strips { rows_per_strip: u32 },
    Tiles { width: u32, height: u32 },
}

/// How pixel blocks are laid out and compressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncodingOptions {
    pub compression: Compression,
    pub predictor: Predictor,
    pub layout: BlockLayout,
    /// Omit blocks whose samples are all zero.
    pub sparse_ok: bool,
}

impl Default for EncodingOptions {
    fn default() -> Self {
        Self {
            compression: Compression::None,
            predictor: Predictor::None,
            layout: BlockLayout::Strips { rows_per_strip: 64 },
            sparse_ok: false,
        }
    }
}

/// Creation settings layered over a source profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CreationOptions {
    /// Output CRS, or keep the source CRS.
    pub crs: Option<Crs>,
    pub encoding: EncodingOptions,
}

impl CreationOptions {
    /// Workspace working copy: square tiles of `block_size`, LZW,
    /// horizontal differencing, sparse blocks.
    pub fn working_copy(block_size: u32) -> Self {
        Self {
            crs: None,
            encoding: EncodingOptions {
                compression: Compression::Lzw,
                predictor: Predictor::Horizontal,
                layout: BlockLayout::Tiles {
                    width: block_size,
                    height: block_size,
                },
                sparse_ok: true,
            },
        }
    }

    /// Output tile: Web Mercator, 256px internal tiles, Deflate with
    /// differencing, sparse blocks.
    pub fn web_mercator_tile() -> Self {
        Self {
            crs: Some(Crs::WEB_MERCATOR),
            encoding: EncodingOptions {
                compression: Compression::Deflate,
                predictor: Predictor::Horizontal,
                layout: BlockLayout::Tiles {
                    width: 256,
                    height: 256,
                },
                sparse_ok: true,
            },
        }
    }
}

/// Everything needed to encode a raster.
#[derive(Debug, Clone, PartialEq)]
pub struct RasterProfile {
    pub width: u32,
    pub height: u32,
    pub count: u16,
    pub sample_type: SampleType,
    pub crs: Crs,
    pub transform: Affine,
    pub encoding: EncodingOptions,
}

impl RasterProfile {
    /// Profile matching `meta` with default encoding.
    pub fn from_meta(meta: &RasterMeta) -> Self {
        Self {
            width: meta.width,
            height: meta.height,
            count: meta.count,
            sample_type: meta.sample_type,
            crs: meta.crs,
            transform: meta.transform,
            encoding: EncodingOptions::default(),
        }
    }

    /// Applies CRS and encoding overrides.
    pub fn with_creation_options(mut self, options: &CreationOptions) -> Self {
        if let Some(crs) = options.crs {
            self.crs = crs;
        }
        self.encoding = options.encoding;
        self
    }

    /// Replaces the pixel grid.
    pub fn with_grid(mut self, transform: Affine, width: u32, height: u32) -> Self {
        self.transform = transform;
        self.width = width;
        self.height = height;
        self
    }

    /// Predictor actually written for this sample type.
    pub fn predictor(&self) -> Predictor {
        self.encoding.predictor.resolve(self.sample_type)
    }

    /// Block width and height; strips span the full raster width.
    pub fn block_dims(&self) -> (u32, u32) {
        match self.encoding.layout {
            BlockLayout::Strips { rows_per_strip } => {
                (self.width, rows_per_strip.clamp(1, self.height.max(1)))
            }
            BlockLayout::Tiles { width, height } => (width.max(1), height.max(1)),
        }
    }

    pub fn is_tiled(&self) -> bool {
        matches!(self.encoding.layout, BlockLayout::Tiles { .. })
    }

    pub fn meta(&self) -> RasterMeta {
        RasterMeta {
            width: self.width,
            height: self.height,
            count: self.count,
            sample_type: self.sample_type,
            crs: self.crs,
            transform: self.transform,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source_meta(sample_type: SampleType) -> RasterMeta {
        RasterMeta {
            width: 100,
            height: 80,
            count: 3,
            sample_type,
            crs: Crs::WGS84,
            transform: Affine::from_origin(10.0, 50.0, 0.001, 0.001),
        }
    }

    #[test]
    fn test_layers_apply_in_order() {
        let grid = Affine::from_origin(0.0, 0.0, 152.87, 152.87);
        let profile = RasterProfile::from_meta(&source_meta(SampleType::U8))
            .with_creation_options(&CreationOptions::web_mercator_tile())
            .with_grid(grid, 1024, 1024);

        assert_eq!(profile.crs, Crs::WEB_MERCATOR);
        assert_eq!(profile.count, 3);
        assert_eq!((profile.width, profile.height), (1024, 1024));
        assert_eq!(profile.transform, grid);
        assert_eq!(profile.encoding.compression, Compression::Deflate);
        assert!(profile.encoding.sparse_ok);
    }

    #[test]
    fn test_working_copy_keeps_crs() {
        let profile = RasterProfile::from_meta(&source_meta(SampleType::U16))
            .with_creation_options(&CreationOptions::working_copy(512));
        assert_eq!(profile.crs, Crs::WGS84);
        assert_eq!(profile.block_dims(), (512, 512));
        assert_eq!(profile.predictor(), Predictor::Horizontal);
        assert_eq!(profile.encoding.compression.tiff_code(), 5);
    }

    #[test]
    fn test_float_samples_use_floating_point_predictor() {
        let profile = RasterProfile::from_meta(&source_meta(SampleType::F32))
            .with_creation_options(&CreationOptions::web_mercator_tile());
        assert_eq!(profile.predictor(), Predictor::FloatingPoint);
        assert_eq!(profile.predictor().tiff_code(), 3);
    }

    #[test]
    fn test_strip_rows_clamped_to_height() {
        let mut profile = RasterProfile::from_meta(&source_meta(SampleType::U8));
        profile.height = 10;
        assert_eq!(profile.block_dims(), (100, 10));
        assert!(!profile.is_tiled());
    }
}
