//! GeoTIFF tag numbers and GeoKey directory handling.

use super::Crs;

pub(super) const MODEL_PIXEL_SCALE: u16 = 33550;
pub(super) const MODEL_TIEPOINT: u16 = 33922;
pub(super) const MODEL_TRANSFORMATION: u16 = 34264;
pub(super) const GEO_KEY_DIRECTORY: u16 = 34735;

const GT_MODEL_TYPE: u16 = 1024;
const GT_RASTER_TYPE: u16 = 1025;
const GEOGRAPHIC_TYPE: u16 = 2048;
const PROJECTED_CS_TYPE: u16 = 3072;

const MODEL_TYPE_PROJECTED: u16 = 1;
const MODEL_TYPE_GEOGRAPHIC: u16 = 2;
const RASTER_PIXEL_IS_AREA: u16 = 1;
const RASTER_PIXEL_IS_POINT: u16 = 2;

/// User-defined code; the CRS is described by further keys.
const USER_DEFINED: u16 = 32767;

/// Decoded subset of a GeoKey directory.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(super) struct GeoKeys {
    pub projected: Option<u16>,
    pub geographic: Option<u16>,
    pub pixel_is_point: bool,
}

impl GeoKeys {
    /// Parses inline (SHORT) keys of a directory; keys stored in other tags
    /// are ignored.
    pub fn parse(directory: &[u64]) -> Self {
        let mut keys = GeoKeys::default();
        let Some(&count) = directory.get(3) else {
            return keys;
        };
        for entry in directory[4..].chunks_exact(4).take(count as usize) {
            let (id, location, value) = (entry[0], entry[1], entry[3]);
            if location != 0 {
                continue;
            }
            let value = value as u16;
            match id as u16 {
                PROJECTED_CS_TYPE => keys.projected = Some(value),
                GEOGRAPHIC_TYPE => keys.geographic = Some(value),
                GT_RASTER_TYPE => keys.pixel_is_point = value == RASTER_PIXEL_IS_POINT,
                _ => {}
            }
        }
        keys
    }

    /// EPSG code of the raster CRS; projected wins over geographic.
    pub fn epsg(&self) -> Option<u16> {
        self.projected
            .filter(|&code| code != USER_DEFINED && code != 0)
            .or(self.geographic.filter(|&code| code != USER_DEFINED && code != 0))
    }
}

/// GeoKey directory describing `crs` with pixel-is-area raster space.
#[rustfmt::skip]
pub(super) fn directory_for(crs: Crs) -> Vec<u16> {
    let (model_type, crs_key) = if crs.is_geographic() {
        (MODEL_TYPE_GEOGRAPHIC, GEOGRAPHIC_TYPE)
    } else {
        (MODEL_TYPE_PROJECTED, PROJECTED_CS_TYPE)
    };
    vec![
        1, 1, 0, 3, // version, revision, minor, key count
        GT_MODEL_TYPE, 0, 1, model_type,
        GT_RASTER_TYPE, 0, 1, RASTER_PIXEL_IS_AREA,
        crs_key, 0, 1, crs.epsg(),
    ]
}
