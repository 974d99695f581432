//! GeoTIFF decoding.

use std::fs::File;
use std::io::{self, BufReader, Read, Seek};
use std::sync::Arc;

use tiff::decoder::{Decoder, DecodingResult, Limits};
use tiff::tags::Tag;
use tracing::trace;

use super::geokeys::{GeoKeys, GEO_KEY_DIRECTORY, MODEL_PIXEL_SCALE, MODEL_TIEPOINT, MODEL_TRANSFORMATION};
use super::{Affine, Crs, RasterError, RasterMeta, RasterWindow, SampleType, Window};
use crate::storage::{HttpRangeReader, RangeFetcher, ReqwestRangeFetcher};
use crate::uri::RasterPath;

/// Byte source the decoder can read from.
pub trait ReadSeek: Read + Seek + Send {}

impl<T: Read + Seek + Send> ReadSeek for T {}

/// Block grid of the image data.
#[derive(Debug, Clone)]
struct ChunkLayout {
    width: u32,
    height: u32,
    across: u32,
    byte_counts: Vec<u64>,
}

/// An open GeoTIFF.
pub struct RasterDataset {
    name: String,
    meta: RasterMeta,
    decoder: Decoder<Box<dyn ReadSeek>>,
    layout: ChunkLayout,
}

impl std::fmt::Debug for RasterDataset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RasterDataset")
            .field("name", &self.name)
            .field("layout", &self.layout)
            .finish_non_exhaustive()
    }
}

impl RasterDataset {
    /// Opens a local file, or a remote one through HTTP range requests.
    pub fn open(path: &RasterPath) -> Result<Self, RasterError> {
        match path {
            RasterPath::Local(local) => {
                Self::from_reader(Box::new(BufReader::new(File::open(local)?)), path.to_string())
            }
            RasterPath::Remote(_) => {
                let fetcher = ReqwestRangeFetcher::new().map_err(io::Error::other)?;
                Self::open_with_fetcher(path, Arc::new(fetcher))
            }
        }
    }

    /// Opens `path`, reading remote paths through `fetcher`.
    pub fn open_with_fetcher(path: &RasterPath, fetcher: Arc<dyn RangeFetcher>) -> Result<Self, RasterError> {
        let reader: Box<dyn ReadSeek> = match path {
            RasterPath::Local(local) => Box::new(BufReader::new(File::open(local)?)),
            RasterPath::Remote(url) => {
                Box::new(HttpRangeReader::open(fetcher, url.clone()).map_err(io::Error::other)?)
            }
        };
        Self::from_reader(reader, path.to_string())
    }

    /// Decodes the header and georeferencing of the TIFF read by `reader`.
    pub fn from_reader(reader: Box<dyn ReadSeek>, name: impl Into<String>) -> Result<Self, RasterError> {
        let name = name.into();
        let mut decoder = Decoder::new(reader)?.with_limits(Limits::unlimited());
        let (width, height) = decoder.dimensions()?;

        let count = first_u64(&mut decoder, Tag::SamplesPerPixel)?.unwrap_or(1) as u16;
        let bits = first_u64(&mut decoder, Tag::BitsPerSample)?.unwrap_or(1) as u16;
        let format = first_u64(&mut decoder, Tag::SampleFormat)?.unwrap_or(1) as u16;
        let planar = first_u64(&mut decoder, Tag::PlanarConfiguration)?.unwrap_or(1);
        if planar != 1 && count > 1 {
            return Err(RasterError::UnsupportedLayout(format!(
                "{}: planar (band-separate) sample layout",
                name
            )));
        }
        let sample_type = SampleType::from_tiff(bits, format)?;

        let keys = u64_values(&mut decoder, Tag::Unknown(GEO_KEY_DIRECTORY))?
            .map(|dir| GeoKeys::parse(&dir))
            .unwrap_or_default();
        let epsg = keys.epsg().ok_or_else(|| {
            RasterError::MissingGeoreference(format!("{}: no EPSG code in GeoKey directory", name))
        })?;

        let mut transform = read_transform(&mut decoder, &name)?;
        if keys.pixel_is_point {
            // Tie points name pixel centres; shift to the corner
            transform.c -= (transform.a + transform.b) / 2.0;
            transform.f -= (transform.d + transform.e) / 2.0;
        }

        let layout = read_layout(&mut decoder, width, height)?;

        let meta = RasterMeta {
            width,
            height,
            count,
            sample_type,
            crs: Crs::from_epsg(epsg),
            transform,
        };
        trace!(dataset = %name, ?meta, "Opened raster");

        Ok(Self {
            name,
            meta,
            decoder,
            layout,
        })
    }

    pub fn meta(&self) -> &RasterMeta {
        &self.meta
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Reads every band of the whole raster.
    pub fn read_all(&mut self) -> Result<RasterWindow, RasterError> {
        let window = self.meta.full_window();
        self.read_window(window)
    }

    /// Reads every band of `window`, decoding only the blocks it touches.
    ///
    /// Blocks stored as sparse (zero byte count) read as zeros.
    pub fn read_window(&mut self, window: Window) -> Result<RasterWindow, RasterError> {
        let meta = &self.meta;
        if window.col_off + window.width > meta.width || window.row_off + window.height > meta.height {
            return Err(RasterError::InvalidData(format!(
                "{}: window {:?} outside {}x{} raster",
                self.name, window, meta.width, meta.height
            )));
        }

        let count = meta.count as usize;
        let mut bands = vec![vec![0.0; window.pixel_count()]; count];
        if window.width == 0 || window.height == 0 {
            return Ok(RasterWindow { window, bands });
        }

        let layout = self.layout.clone();
        let first_col = window.col_off / layout.width;
        let last_col = (window.col_off + window.width - 1) / layout.width;
        let first_row = window.row_off / layout.height;
        let last_row = (window.row_off + window.height - 1) / layout.height;

        for chunk_row in first_row..=last_row {
            for chunk_col in first_col..=last_col {
                let index = chunk_row * layout.across + chunk_col;
                if layout.byte_counts.get(index as usize).copied().unwrap_or(0) == 0 {
                    continue;
                }

                let samples = to_f64(self.decoder.read_chunk(index)?)?;

                let x0 = chunk_col * layout.width;
                let y0 = chunk_row * layout.height;
                let data_w = layout.width.min(self.meta.width - x0) as usize;
                let data_h = layout.height.min(self.meta.height - y0) as usize;

                // Edge chunks may come back cropped or padded
                let stride = if samples.len() == data_w * data_h * count {
                    data_w
                } else if samples.len() >= layout.width as usize * data_h * count {
                    layout.width as usize
                } else {
                    return Err(RasterError::InvalidData(format!(
                        "{}: chunk {} holds {} samples",
                        self.name,
                        index,
                        samples.len()
                    )));
                };

                let col_start = window.col_off.max(x0);
                let col_end = (window.col_off + window.width).min(x0 + data_w as u32);
                let row_start = window.row_off.max(y0);
                let row_end = (window.row_off + window.height).min(y0 + data_h as u32);

                for row in row_start..row_end {
                    let src_row = (row - y0) as usize;
                    let dst_row = (row - window.row_off) as usize;
                    for col in col_start..col_end {
                        let src = (src_row * stride + (col - x0) as usize) * count;
                        let dst = dst_row * window.width as usize + (col - window.col_off) as usize;
                        for (band, out) in bands.iter_mut().enumerate() {
                            out[dst] = samples[src + band];
                        }
                    }
                }
            }
        }

        Ok(RasterWindow { window, bands })
    }
}

fn u64_values<R: Read + Seek>(decoder: &mut Decoder<R>, tag: Tag) -> Result<Option<Vec<u64>>, RasterError> {
    Ok(decoder.find_tag(tag)?.map(|v| v.into_u64_vec()).transpose()?)
}

fn f64_values<R: Read + Seek>(decoder: &mut Decoder<R>, tag: Tag) -> Result<Option<Vec<f64>>, RasterError> {
    Ok(decoder.find_tag(tag)?.map(|v| v.into_f64_vec()).transpose()?)
}

fn first_u64<R: Read + Seek>(decoder: &mut Decoder<R>, tag: Tag) -> Result<Option<u64>, RasterError> {
    Ok(u64_values(decoder, tag)?.and_then(|v| v.first().copied()))
}

fn read_transform<R: Read + Seek>(decoder: &mut Decoder<R>, name: &str) -> Result<Affine, RasterError> {
    if let Some(m) = f64_values(decoder, Tag::Unknown(MODEL_TRANSFORMATION))? {
        if m.len() >= 8 {
            return Ok(Affine::new(m[0], m[1], m[3], m[4], m[5], m[7]));
        }
    }

    let scale = f64_values(decoder, Tag::Unknown(MODEL_PIXEL_SCALE))?;
    let tiepoint = f64_values(decoder, Tag::Unknown(MODEL_TIEPOINT))?;
    match (scale, tiepoint) {
        (Some(s), Some(t)) if s.len() >= 2 && t.len() >= 6 => {
            let (i, j, x, y) = (t[0], t[1], t[3], t[4]);
            Ok(Affine::new(s[0], 0.0, x - i * s[0], 0.0, -s[1], y + j * s[1]))
        }
        _ => Err(RasterError::MissingGeoreference(format!(
            "{}: no ModelTransformation or ModelPixelScale/ModelTiepoint tags",
            name
        ))),
    }
}

fn read_layout<R: Read + Seek>(decoder: &mut Decoder<R>, width: u32, height: u32) -> Result<ChunkLayout, RasterError> {
    let tile_width = first_u64(decoder, Tag::TileWidth)?;
    let tile_height = first_u64(decoder, Tag::TileLength)?;

    let (chunk_w, chunk_h, counts_tag) = match (tile_width, tile_height) {
        (Some(w), Some(h)) => (w as u32, h as u32, Tag::TileByteCounts),
        _ => {
            let rows = first_u64(decoder, Tag::RowsPerStrip)?
                .map(|r| (r.min(height as u64)) as u32)
                .unwrap_or(height);
            (width, rows, Tag::StripByteCounts)
        }
    };
    if chunk_w == 0 || chunk_h == 0 {
        return Err(RasterError::UnsupportedLayout("zero-sized blocks".to_string()));
    }

    let byte_counts = u64_values(decoder, counts_tag)?
        .ok_or_else(|| RasterError::UnsupportedLayout("missing block byte counts".to_string()))?;

    Ok(ChunkLayout {
        width: chunk_w,
        height: chunk_h,
        across: width.div_ceil(chunk_w),
        byte_counts,
    })
}

fn to_f64(result: DecodingResult) -> Result<Vec<f64>, RasterError> {
    #[allow(unreachable_patterns)]
    let samples = match result {
        DecodingResult::U8(v) => v.into_iter().map(f64::from).collect(),
        DecodingResult::U16(v) => v.into_iter().map(f64::from).collect(),
        DecodingResult::U32(v) => v.into_iter().map(f64::from).collect(),
        DecodingResult::U64(v) => v.into_iter().map(|s| s as f64).collect(),
        DecodingResult::I8(v) => v.into_iter().map(f64::from).collect(),
        DecodingResult::I16(v) => v.into_iter().map(f64::from).collect(),
        DecodingResult::I32(v) => v.into_iter().map(f64::from).collect(),
        DecodingResult::I64(v) => v.into_iter().map(|s| s as f64).collect(),
        DecodingResult::F32(v) => v.into_iter().map(f64::from).collect(),
        DecodingResult::F64(v) => v,
        _ => {
            return Err(RasterError::UnsupportedLayout(
                "unsupported decoded sample type".to_string(),
            ))
        }
    };
    Ok(samples)
}
