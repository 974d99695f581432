//! In-memory GeoTIFF encoding.
//!
//! Uses the low-level `DirectoryEncoder` of the `tiff` crate so block layout,
//! compression, predictors and sparse blocks are under our control.

use std::io::{Cursor, Write};

use flate2::write::ZlibEncoder;
use tiff::encoder::TiffEncoder;
use tiff::tags::Tag;

use super::geokeys::{self, GEO_KEY_DIRECTORY, MODEL_PIXEL_SCALE, MODEL_TIEPOINT, MODEL_TRANSFORMATION};
use super::{Compression, Predictor, RasterError, RasterProfile, SampleType, Window};

const PHOTOMETRIC_MIN_IS_BLACK: u16 = 1;
const PHOTOMETRIC_RGB: u16 = 2;

/// Encodes band-separated samples as a GeoTIFF.
///
/// Each band holds `width * height` row-major samples, quantized to the
/// profile's sample type.
pub fn encode_geotiff(profile: &RasterProfile, bands: &[Vec<f64>]) -> Result<Vec<u8>, RasterError> {
    let pixels = profile.width as usize * profile.height as usize;
    if profile.count == 0 || bands.len() != profile.count as usize {
        return Err(RasterError::InvalidData(format!(
            "expected {} bands, got {}",
            profile.count,
            bands.len()
        )));
    }
    if let Some(band) = bands.iter().find(|b| b.len() != pixels) {
        return Err(RasterError::InvalidData(format!(
            "band has {} samples, expected {}",
            band.len(),
            pixels
        )));
    }

    let width = profile.width as usize;
    encode_geotiff_rows(profile, |window| {
        let from = window.row_off as usize * width;
        let to = from + window.pixel_count();
        Ok(bands.iter().map(|band| band[from..to].to_vec()).collect())
    })
}

/// Encodes a GeoTIFF whose samples are pulled one block row at a time.
///
/// `read_rows` is called once per block row, top to bottom, with a
/// full-width [`Window`]; it returns one row-major buffer per band. Only a
/// single block row of samples is held at once.
pub fn encode_geotiff_rows<F>(profile: &RasterProfile, mut read_rows: F) -> Result<Vec<u8>, RasterError>
where
    F: FnMut(Window) -> Result<Vec<Vec<f64>>, RasterError>,
{
    if profile.count == 0 {
        return Err(RasterError::InvalidData("expected at least one band".to_string()));
    }

    let mut buf = Cursor::new(Vec::new());
    {
        let mut encoder = TiffEncoder::new(&mut buf)?;
        let mut dir = encoder.image_directory()?;

        let spp = profile.count;
        let sample_type = profile.sample_type;
        let predictor = profile.predictor();

        dir.write_tag(Tag::ImageWidth, profile.width)?;
        dir.write_tag(Tag::ImageLength, profile.height)?;
        dir.write_tag(Tag::BitsPerSample, vec![sample_type.bits(); spp as usize].as_slice())?;
        dir.write_tag(Tag::SampleFormat, vec![sample_type.sample_format(); spp as usize].as_slice())?;
        dir.write_tag(Tag::SamplesPerPixel, spp)?;
        dir.write_tag(Tag::PlanarConfiguration, 1u16)?;
        dir.write_tag(Tag::Compression, profile.encoding.compression.tiff_code())?;
        if predictor != Predictor::None {
            dir.write_tag(Tag::Predictor, predictor.tiff_code())?;
        }

        let rgb = spp >= 3 && matches!(sample_type, SampleType::U8 | SampleType::U16);
        let (photometric, color_samples) = if rgb {
            (PHOTOMETRIC_RGB, 3)
        } else {
            (PHOTOMETRIC_MIN_IS_BLACK, 1)
        };
        dir.write_tag(Tag::PhotometricInterpretation, photometric)?;
        if spp > color_samples {
            let extra = vec![0u16; (spp - color_samples) as usize];
            dir.write_tag(Tag::ExtraSamples, extra.as_slice())?;
        }

        let (block_w, block_h) = profile.block_dims();
        if profile.is_tiled() {
            dir.write_tag(Tag::TileWidth, block_w)?;
            dir.write_tag(Tag::TileLength, block_h)?;
        } else {
            dir.write_tag(Tag::RowsPerStrip, block_h)?;
        }

        let transform = &profile.transform;
        if transform.is_rectilinear() {
            let scale = [transform.a, -transform.e, 0.0];
            let tiepoint = [0.0, 0.0, 0.0, transform.c, transform.f, 0.0];
            dir.write_tag(Tag::Unknown(MODEL_PIXEL_SCALE), scale.as_slice())?;
            dir.write_tag(Tag::Unknown(MODEL_TIEPOINT), tiepoint.as_slice())?;
        } else {
            #[rustfmt::skip]
            let matrix = [
                transform.a, transform.b, 0.0, transform.c,
                transform.d, transform.e, 0.0, transform.f,
                0.0, 0.0, 0.0, 0.0,
                0.0, 0.0, 0.0, 1.0,
            ];
            dir.write_tag(Tag::Unknown(MODEL_TRANSFORMATION), matrix.as_slice())?;
        }
        let keys = geokeys::directory_for(profile.crs);
        dir.write_tag(Tag::Unknown(GEO_KEY_DIRECTORY), keys.as_slice())?;

        let across = profile.width.div_ceil(block_w);
        let down = profile.height.div_ceil(block_h);
        let mut offsets = Vec::with_capacity((across * down) as usize);
        let mut byte_counts = Vec::with_capacity((across * down) as usize);

        for block_row in 0..down {
            let row_off = block_row * block_h;
            let window = Window::new(0, row_off, profile.width, block_h.min(profile.height - row_off));
            let rows = read_rows(window)?;
            if rows.len() != spp as usize || rows.iter().any(|b| b.len() != window.pixel_count()) {
                return Err(RasterError::InvalidData(format!(
                    "block row at {} has wrong sample count",
                    row_off
                )));
            }

            for block_col in 0..across {
                let block = BlockGrid {
                    profile,
                    col_off: block_col * block_w,
                    row_off,
                    block_w,
                    block_h,
                };
                let mut bytes = block.interleave(&rows, window.height as usize);

                if profile.encoding.sparse_ok && bytes.iter().all(|&b| b == 0) {
                    offsets.push(0u32);
                    byte_counts.push(0u32);
                    continue;
                }

                let row_bytes = block.stride() * spp as usize * sample_type.bytes();
                apply_predictor(&mut bytes, row_bytes, sample_type.bytes(), spp as usize, predictor);
                let compressed = compress(bytes, profile.encoding.compression)?;

                let offset = dir.write_data(compressed.as_slice())?;
                offsets.push(to_u32(offset)?);
                byte_counts.push(to_u32(compressed.len() as u64)?);
            }
        }

        if profile.is_tiled() {
            dir.write_tag(Tag::TileOffsets, offsets.as_slice())?;
            dir.write_tag(Tag::TileByteCounts, byte_counts.as_slice())?;
        } else {
            dir.write_tag(Tag::StripOffsets, offsets.as_slice())?;
            dir.write_tag(Tag::StripByteCounts, byte_counts.as_slice())?;
        }
        dir.finish()?;
    }
    Ok(buf.into_inner())
}

/// One block of the output grid.
struct BlockGrid<'a> {
    profile: &'a RasterProfile,
    col_off: u32,
    row_off: u32,
    block_w: u32,
    block_h: u32,
}

impl BlockGrid<'_> {
    /// Samples per block row; tiles are padded to full width, strips are not.
    fn stride(&self) -> usize {
        if self.profile.is_tiled() {
            self.block_w as usize
        } else {
            self.profile.width as usize
        }
    }

    /// Rows stored in the block; the last strip is cut short.
    fn rows(&self) -> usize {
        if self.profile.is_tiled() {
            self.block_h as usize
        } else {
            self.block_h.min(self.profile.height - self.row_off) as usize
        }
    }

    /// Pixel-interleaved little-endian samples, zero padded.
    ///
    /// `rows` holds the block row starting at `row_off`, `valid_rows` tall.
    fn interleave(&self, rows: &[Vec<f64>], valid_rows: usize) -> Vec<u8> {
        let sample_type = self.profile.sample_type;
        let width = self.profile.width as usize;
        let mut out = Vec::with_capacity(self.stride() * self.rows() * rows.len() * sample_type.bytes());

        for r in 0..self.rows() {
            for c in 0..self.stride() {
                let col = self.col_off as usize + c;
                for band in rows {
                    let value = if r < valid_rows && col < width {
                        band[r * width + col]
                    } else {
                        0.0
                    };
                    sample_type.write_le(value, &mut out);
                }
            }
        }
        out
    }
}

fn apply_predictor(data: &mut [u8], row_bytes: usize, sample_bytes: usize, spp: usize, predictor: Predictor) {
    if row_bytes == 0 {
        return;
    }
    for row in data.chunks_mut(row_bytes) {
        match predictor {
            Predictor::None => {}
            Predictor::Horizontal => horizontal_diff(row, sample_bytes, spp),
            Predictor::FloatingPoint => float_diff(row, sample_bytes, spp),
        }
    }
}

/// Subtracts each sample from the same band of the previous pixel, wrapping
/// at the sample width.
fn horizontal_diff(row: &mut [u8], sample_bytes: usize, spp: usize) {
    let mask = if sample_bytes >= 8 {
        u64::MAX
    } else {
        (1u64 << (sample_bytes * 8)) - 1
    };
    let mut samples: Vec<u64> = row
        .chunks_exact(sample_bytes)
        .map(|s| s.iter().rev().fold(0u64, |acc, &b| (acc << 8) | b as u64))
        .collect();
    for i in (spp..samples.len()).rev() {
        samples[i] = samples[i].wrapping_sub(samples[i - spp]) & mask;
    }
    for (chunk, value) in row.chunks_exact_mut(sample_bytes).zip(samples) {
        for (k, byte) in chunk.iter_mut().enumerate() {
            *byte = (value >> (8 * k)) as u8;
        }
    }
}

/// Splits samples into big-endian byte planes, then differences bytes.
fn float_diff(row: &mut [u8], sample_bytes: usize, spp: usize) {
    let count = row.len() / sample_bytes;
    let source = row.to_vec();
    for i in 0..count {
        for byte in 0..sample_bytes {
            row[(sample_bytes - byte - 1) * count + i] = source[sample_bytes * i + byte];
        }
    }
    for i in (spp..row.len()).rev() {
        row[i] = row[i].wrapping_sub(row[i - spp]);
    }
}

fn compress(data: Vec<u8>, compression: Compression) -> Result<Vec<u8>, RasterError> {
    match compression {
        Compression::None => Ok(data),
        Compression::Lzw => weezl::encode::Encoder::with_tiff_size_switch(weezl::BitOrder::Msb, 8)
            .encode(&data)
            .map_err(|e| RasterError::InvalidData(format!("LZW encoding failed: {}", e))),
        Compression::Deflate => {
            let mut encoder = ZlibEncoder::new(Vec::new(), flate2::Compression::default());
            encoder.write_all(&data)?;
            Ok(encoder.finish()?)
        }
    }
}

fn to_u32(value: u64) -> Result<u32, RasterError> {
    u32::try_from(value)
        .map_err(|_| RasterError::UnsupportedLayout("output exceeds 4 GiB classic TIFF limit".to_string()))
}
