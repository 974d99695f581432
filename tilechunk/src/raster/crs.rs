//! Coordinate reference systems and point/extent transforms.
//!
//! EPSG codes resolve to proj strings through `crs-definitions` and are
//! transformed with `proj4rs`. The WGS84 ↔ Web Mercator pair, which every job
//! exercises, uses the closed-form spherical formulas instead.

use std::fmt;

use proj4rs::proj::Proj;

use super::{Affine, Bounds, RasterError};
use crate::coord::{lng_lat_to_mercator, mercator_to_lng_lat};

/// Points added along each edge when transforming an extent.
pub const DENSIFY_POINTS: usize = 21;

/// An EPSG-coded coordinate reference system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Crs(u16);

impl Crs {
    /// Geographic WGS84 longitude/latitude.
    pub const WGS84: Crs = Crs(4326);
    /// Spherical Web Mercator.
    pub const WEB_MERCATOR: Crs = Crs(3857);

    pub const fn from_epsg(code: u16) -> Self {
        Crs(code)
    }

    pub fn epsg(&self) -> u16 {
        self.0
    }

    /// Proj string of the CRS, if the code is known.
    pub fn proj_string(&self) -> Option<&'static str> {
        crs_definitions::from_code(self.0).map(|def| def.proj4)
    }

    /// `true` for longitude/latitude systems.
    pub fn is_geographic(&self) -> bool {
        match self.proj_string() {
            Some(proj) => proj.contains("+proj=longlat"),
            None => (4000..5000).contains(&self.0),
        }
    }
}

impl fmt::Display for Crs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EPSG:{}", self.0)
    }
}

enum Method {
    Identity,
    LngLatToMercator,
    MercatorToLngLat,
    Proj4 {
        src: Box<Proj>,
        dst: Box<Proj>,
        src_geographic: bool,
        dst_geographic: bool,
    },
}

/// Point transformer between two CRSs.
pub struct Projector {
    src: Crs,
    dst: Crs,
    method: Method,
}

impl Projector {
    /// Builds a transformer from `src` to `dst`.
    ///
    /// # Errors
    ///
    /// Fails if either EPSG code is unknown or its proj string is rejected.
    pub fn new(src: Crs, dst: Crs) -> Result<Self, RasterError> {
        let method = if src == dst {
            Method::Identity
        } else if src == Crs::WGS84 && dst == Crs::WEB_MERCATOR {
            Method::LngLatToMercator
        } else if src == Crs::WEB_MERCATOR && dst == Crs::WGS84 {
            Method::MercatorToLngLat
        } else {
            Method::Proj4 {
                src: Box::new(load_proj(src)?),
                dst: Box::new(load_proj(dst)?),
                src_geographic: src.is_geographic(),
                dst_geographic: dst.is_geographic(),
            }
        };
        Ok(Self { src, dst, method })
    }

    pub fn source(&self) -> Crs {
        self.src
    }

    pub fn target(&self) -> Crs {
        self.dst
    }

    /// Transforms a single point. Geographic coordinates are in degrees.
    pub fn transform(&self, x: f64, y: f64) -> Result<(f64, f64), RasterError> {
        match &self.method {
            Method::Identity => Ok((x, y)),
            Method::LngLatToMercator => Ok(lng_lat_to_mercator(x, y)),
            Method::MercatorToLngLat => Ok(mercator_to_lng_lat(x, y)),
            Method::Proj4 {
                src,
                dst,
                src_geographic,
                dst_geographic,
            } => {
                // proj4rs works in radians for geographic systems
                let mut point = if *src_geographic {
                    (x.to_radians(), y.to_radians(), 0.0)
                } else {
                    (x, y, 0.0)
                };
                proj4rs::transform::transform(src, dst, &mut point).map_err(|e| {
                    RasterError::Projection(format!("{} -> {}: {:?}", self.src, self.dst, e))
                })?;
                let out = if *dst_geographic {
                    (point.0.to_degrees(), point.1.to_degrees())
                } else {
                    (point.0, point.1)
                };
                if out.0.is_finite() && out.1.is_finite() {
                    Ok(out)
                } else {
                    Err(RasterError::Projection(format!(
                        "{} -> {}: ({}, {}) has no finite image",
                        self.src, self.dst, x, y
                    )))
                }
            }
        }
    }
}

fn load_proj(crs: Crs) -> Result<Proj, RasterError> {
    let proj = crs
        .proj_string()
        .ok_or_else(|| RasterError::UnsupportedCrs(format!("{} is not a known EPSG code", crs)))?;
    Proj::from_proj_string(proj)
        .map_err(|e| RasterError::UnsupportedCrs(format!("{}: {:?}", crs, e)))
}

/// Points along the edge of `bounds`, `DENSIFY_POINTS` per edge plus corners.
fn edge_samples(bounds: &Bounds) -> Vec<(f64, f64)> {
    let steps = DENSIFY_POINTS + 1;
    let (dx, dy) = (bounds.width(), bounds.height());
    let mut points = Vec::with_capacity(steps * 4);
    for i in 0..steps {
        let t = i as f64 / steps as f64;
        points.push((bounds.left + dx * t, bounds.top));
        points.push((bounds.right, bounds.top - dy * t));
        points.push((bounds.right - dx * t, bounds.bottom));
        points.push((bounds.left, bounds.bottom + dy * t));
    }
    points
}

/// Transforms an extent, sampling each edge so curved edges are enclosed.
///
/// Points without a finite image in the target CRS are skipped.
pub fn transform_bounds(projector: &Projector, bounds: &Bounds) -> Result<Bounds, RasterError> {
    let mut out: Option<Bounds> = None;
    for (x, y) in edge_samples(bounds) {
        if let Ok((tx, ty)) = projector.transform(x, y) {
            out = Some(match out {
                None => Bounds::new(tx, ty, tx, ty),
                Some(b) => b.include(tx, ty),
            });
        }
    }
    out.ok_or_else(|| {
        RasterError::Projection(format!(
            "no point of {:?} maps from {} to {}",
            bounds,
            projector.source(),
            projector.target()
        ))
    })
}

/// Output grid suggested for warping a raster into another CRS.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DefaultTransform {
    pub transform: Affine,
    pub width: u32,
    pub height: u32,
}

/// Suggests a north-up output grid for a `width x height` raster covering
/// `bounds` once reprojected by `projector`.
///
/// The pixel size preserves the diagonal pixel count of the source:
/// `res = diag(extent) / sqrt(width² + height²)`.
pub fn default_transform(
    projector: &Projector,
    width: u32,
    height: u32,
    bounds: &Bounds,
) -> Result<DefaultTransform, RasterError> {
    let extent = transform_bounds(projector, bounds)?;
    let (w_ext, h_ext) = (extent.width(), extent.height());

    let diag_pixels = (width as f64).hypot(height as f64);
    let res = w_ext.hypot(h_ext) / diag_pixels;
    if !res.is_finite() || res <= 0.0 {
        return Err(RasterError::Projection(format!(
            "degenerate extent {:?} in {}",
            extent,
            projector.target()
        )));
    }

    let out_width = ((w_ext / res + 0.5).floor() as u32).max(1);
    let out_height = ((h_ext / res + 0.5).floor() as u32).max(1);

    Ok(DefaultTransform {
        transform: Affine::from_origin(extent.left, extent.top, res, res),
        width: out_width,
        height: out_height,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f64 = 1e-6;

    #[test]
    fn test_display() {
        assert_eq!(Crs::WEB_MERCATOR.to_string(), "EPSG:3857");
    }

    #[test]
    fn test_geographic_detection() {
        assert!(Crs::WGS84.is_geographic());
        assert!(!Crs::WEB_MERCATOR.is_geographic());
        assert!(!Crs::from_epsg(32633).is_geographic());
    }

    #[test]
    fn test_fast_path_mercator() {
        let p = Projector::new(Crs::WGS84, Crs::WEB_MERCATOR).unwrap();
        let (x, y) = p.transform(10.0, 0.0).unwrap();
        assert!((x - 1_113_194.907_932_736).abs() < 1e-3);
        assert!(y.abs() < EPS);

        let back = Projector::new(Crs::WEB_MERCATOR, Crs::WGS84).unwrap();
        let (lng, lat) = back.transform(x, 0.0).unwrap();
        assert!((lng - 10.0).abs() < EPS);
        assert!(lat.abs() < EPS);
    }

    #[test]
    fn test_utm_roundtrip() {
        // UTM zone 33N
        let utm = Crs::from_epsg(32633);
        let forward = Projector::new(Crs::WGS84, utm).unwrap();
        let back = Projector::new(utm, Crs::WGS84).unwrap();

        let (e, n) = forward.transform(15.0, 50.0).unwrap();
        assert!((e - 500_000.0).abs() < 1.0);

        let (lng, lat) = back.transform(e, n).unwrap();
        assert!((lng - 15.0).abs() < EPS);
        assert!((lat - 50.0).abs() < EPS);
    }

    #[test]
    fn test_unknown_code_rejected() {
        assert!(matches!(
            Projector::new(Crs::from_epsg(1), Crs::WGS84),
            Err(RasterError::UnsupportedCrs(_))
        ));
    }

    #[test]
    fn test_transform_bounds_identity() {
        let p = Projector::new(Crs::WGS84, Crs::WGS84).unwrap();
        let b = Bounds::new(10.0, 50.0, 10.1, 50.1);
        let out = transform_bounds(&p, &b).unwrap();
        assert!((out.left - 10.0).abs() < EPS);
        assert!((out.right - 10.1).abs() < EPS);
        assert!((out.bottom - 50.0).abs() < EPS);
        assert!((out.top - 50.1).abs() < EPS);
    }

    #[test]
    fn test_default_transform_identity_keeps_grid() {
        let p = Projector::new(Crs::WGS84, Crs::WGS84).unwrap();
        let b = Bounds::new(10.0, 50.0, 10.1, 50.1);
        let dt = default_transform(&p, 100, 100, &b).unwrap();

        assert_eq!((dt.width, dt.height), (100, 100));
        assert!((dt.transform.a - 0.001).abs() < 1e-12);
        assert!((dt.transform.e + 0.001).abs() < 1e-12);
        assert!((dt.transform.c - 10.0).abs() < 1e-12);
        assert!((dt.transform.f - 50.1).abs() < 1e-12);
    }

    #[test]
    fn test_default_transform_to_mercator() {
        let p = Projector::new(Crs::WGS84, Crs::WEB_MERCATOR).unwrap();
        let b = Bounds::new(10.0, 50.0, 10.1, 50.1);
        let dt = default_transform(&p, 100, 100, &b).unwrap();

        // 0.1° of longitude is ~11.1 km; the square pixel grid stretches
        // northward by 1/cos(lat)
        let (x0, _) = lng_lat_to_mercator(10.0, 50.0);
        assert!((dt.transform.c - x0).abs() < 1e-6);
        assert!(dt.transform.a > 100.0 && dt.transform.a < 200.0);
        assert!(dt.height > dt.width);
    }
}
