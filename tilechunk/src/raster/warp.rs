//! Reprojection onto a destination grid.
//!
//! Each destination pixel centre is mapped back through the destination
//! transform, the CRS transform and the inverse source transform. The
//! resulting source position is sampled from the source window.

use super::{Affine, Crs, Projector, RasterError, RasterMeta, RasterWindow, Window};

/// Resampling kernel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resampling {
    Nearest,
    Bilinear,
}

/// Precomputed source positions for one destination grid.
pub struct WarpPlan {
    width: u32,
    height: u32,
    src_width: u32,
    src_height: u32,
    /// Source pixel-space position of each destination pixel centre, or
    /// `None` where it falls outside the source.
    positions: Vec<Option<(f64, f64)>>,
    window: Option<Window>,
    resampling: Resampling,
}

impl WarpPlan {
    /// Maps a `width x height` grid at `dst_transform` in `dst_crs` onto
    /// the pixel space of `src`.
    pub fn new(
        src: &RasterMeta,
        dst_transform: &Affine,
        dst_crs: Crs,
        width: u32,
        height: u32,
        resampling: Resampling,
    ) -> Result<Self, RasterError> {
        let to_source = Projector::new(dst_crs, src.crs)?;
        let src_inverse = src.transform.invert().ok_or_else(|| {
            RasterError::InvalidData("source transform is not invertible".to_string())
        })?;
        let (src_w, src_h) = (src.width as f64, src.height as f64);

        let mut positions = Vec::with_capacity(width as usize * height as usize);
        let mut extent: Option<(f64, f64, f64, f64)> = None;

        for row in 0..height {
            for col in 0..width {
                let (x, y) = dst_transform.apply(col as f64 + 0.5, row as f64 + 0.5);
                let position = to_source
                    .transform(x, y)
                    .ok()
                    .map(|(sx, sy)| src_inverse.apply(sx, sy))
                    .filter(|&(c, r)| c >= 0.0 && r >= 0.0 && c <= src_w && r <= src_h);

                if let Some((c, r)) = position {
                    extent = Some(match extent {
                        None => (c, r, c, r),
                        Some((c0, r0, c1, r1)) => (c0.min(c), r0.min(r), c1.max(c), r1.max(r)),
                    });
                }
                positions.push(position);
            }
        }

        // Bilinear taps reach floor(p - 0.5) and floor(p + 0.5)
        let window = extent.and_then(|(c0, r0, c1, r1)| {
            let max_col = src.width.checked_sub(1)? as f64;
            let max_row = src.height.checked_sub(1)? as f64;
            let col_min = (c0 - 0.5).floor().clamp(0.0, max_col) as u32;
            let row_min = (r0 - 0.5).floor().clamp(0.0, max_row) as u32;
            let col_max = (c1 + 0.5).floor().clamp(0.0, max_col) as u32;
            let row_max = (r1 + 0.5).floor().clamp(0.0, max_row) as u32;
            Some(Window::new(
                col_min,
                row_min,
                col_max - col_min + 1,
                row_max - row_min + 1,
            ))
        });

        Ok(Self {
            width,
            height,
            src_width: src.width,
            src_height: src.height,
            positions,
            window,
            resampling,
        })
    }

    /// Source pixels the destination depends on; `None` if the grids do not
    /// overlap.
    pub fn source_window(&self) -> Option<Window> {
        self.window
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Warps one band of `source` into a new destination buffer.
    ///
    /// Source samples equal to `nodata` (or NaN) do not contribute; pixels
    /// with no valid contribution are set to `nodata`.
    pub fn reproject_band(&self, source: &RasterWindow, band: usize, nodata: f64) -> Vec<f64> {
        self.positions
            .iter()
            .map(|position| {
                position
                    .and_then(|(c, r)| match self.resampling {
                        Resampling::Nearest => self.nearest(source, band, c, r, nodata),
                        Resampling::Bilinear => self.bilinear(source, band, c, r, nodata),
                    })
                    .unwrap_or(nodata)
            })
            .collect()
    }

    fn valid(&self, source: &RasterWindow, band: usize, col: i64, row: i64, nodata: f64) -> Option<f64> {
        if col < 0 || row < 0 || col >= self.src_width as i64 || row >= self.src_height as i64 {
            return None;
        }
        source
            .get(band, col, row)
            .filter(|v| !v.is_nan() && *v != nodata)
    }

    fn nearest(&self, source: &RasterWindow, band: usize, c: f64, r: f64, nodata: f64) -> Option<f64> {
        self.valid(source, band, c.floor() as i64, r.floor() as i64, nodata)
    }

    fn bilinear(&self, source: &RasterWindow, band: usize, c: f64, r: f64, nodata: f64) -> Option<f64> {
        let fx = c - 0.5;
        let fy = r - 0.5;
        let x0 = fx.floor();
        let y0 = fy.floor();
        let tx = fx - x0;
        let ty = fy - y0;

        let mut acc = 0.0;
        let mut weight_sum = 0.0;
        for (dy, wy) in [(0, 1.0 - ty), (1, ty)] {
            for (dx, wx) in [(0, 1.0 - tx), (1, tx)] {
                let weight = wx * wy;
                if weight <= 0.0 {
                    continue;
                }
                if let Some(v) = self.valid(source, band, x0 as i64 + dx, y0 as i64 + dy, nodata) {
                    acc += weight * v;
                    weight_sum += weight;
                }
            }
        }
        (weight_sum > 0.0).then(|| acc / weight_sum)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::raster::SampleType;

    fn source_meta() -> RasterMeta {
        RasterMeta {
            width: 4,
            height: 4,
            count: 1,
            sample_type: SampleType::U8,
            crs: Crs::WGS84,
            transform: Affine::from_bounds(0.0, 0.0, 4.0, 4.0, 4, 4),
        }
    }

    fn source(values: Vec<f64>) -> RasterWindow {
        RasterWindow {
            window: Window::new(0, 0, 4, 4),
            bands: vec![values],
        }
    }

    #[test]
    fn test_identity_grid_copies_source() {
        let meta = source_meta();
        let values: Vec<f64> = (1..=16).map(f64::from).collect();
        let plan = WarpPlan::new(&meta, &meta.transform, Crs::WGS84, 4, 4, Resampling::Bilinear).unwrap();

        assert_eq!(plan.source_window(), Some(Window::new(0, 0, 4, 4)));
        assert_eq!(plan.reproject_band(&source(values.clone()), 0, 0.0), values);
    }

    #[test]
    fn test_bilinear_interpolates_midpoints() {
        let meta = source_meta();
        // Destination pixel centred on the corner shared by four source pixels
        let dst = Affine::from_origin(0.5, 3.5, 1.0, 1.0);
        let plan = WarpPlan::new(&meta, &dst, Crs::WGS84, 1, 1, Resampling::Bilinear).unwrap();

        let values = vec![
            10.0, 20.0, 0.0, 0.0, //
            30.0, 40.0, 0.0, 0.0, //
            0.0, 0.0, 0.0, 0.0, //
            0.0, 0.0, 0.0, 0.0,
        ];
        let out = plan.reproject_band(&source(values), 0, -1.0);
        assert!((out[0] - 25.0).abs() < 1e-9);
    }

    #[test]
    fn test_nodata_excluded_and_renormalized() {
        let meta = source_meta();
        let dst = Affine::from_origin(0.5, 3.5, 1.0, 1.0);
        let plan = WarpPlan::new(&meta, &dst, Crs::WGS84, 1, 1, Resampling::Bilinear).unwrap();

        let mut values = vec![0.0; 16];
        values[0] = 10.0;
        values[5] = 30.0;
        let out = plan.reproject_band(&source(values), 0, 0.0);
        assert!((out[0] - 20.0).abs() < 1e-9);
    }

    #[test]
    fn test_outside_source_is_nodata() {
        let meta = source_meta();
        let dst = Affine::from_origin(100.0, 100.0, 1.0, 1.0);
        let plan = WarpPlan::new(&meta, &dst, Crs::WGS84, 2, 2, Resampling::Bilinear).unwrap();

        assert_eq!(plan.source_window(), None);
        assert_eq!(plan.reproject_band(&source(vec![5.0; 16]), 0, 0.0), vec![0.0; 4]);
    }

    #[test]
    fn test_window_covers_partial_overlap() {
        let meta = source_meta();
        // 2x2 destination over the lower-right quadrant
        let dst = Affine::from_origin(2.0, 2.0, 1.0, 1.0);
        let plan = WarpPlan::new(&meta, &dst, Crs::WGS84, 2, 2, Resampling::Nearest).unwrap();

        let window = plan.source_window().unwrap();
        assert!(window.col_off <= 2 && window.row_off <= 2);
        assert_eq!(window.col_off + window.width, 4);
        assert_eq!(window.row_off + window.height, 4);

        let values: Vec<f64> = (1..=16).map(f64::from).collect();
        assert_eq!(plan.reproject_band(&source(values), 0, 0.0), vec![11.0, 12.0, 15.0, 16.0]);
    }

    #[test]
    fn test_mercator_destination() {
        let meta = RasterMeta {
            transform: Affine::from_bounds(10.0, 50.0, 10.1, 50.1, 4, 4),
            ..source_meta()
        };
        let (x0, y1) = crate::coord::lng_lat_to_mercator(10.0, 50.1);
        let (x1, y0) = crate::coord::lng_lat_to_mercator(10.1, 50.0);
        let dst = Affine::from_bounds(x0, y0, x1, y1, 8, 8);
        let plan = WarpPlan::new(&meta, &dst, Crs::WEB_MERCATOR, 8, 8, Resampling::Bilinear).unwrap();

        let out = plan.reproject_band(&source(vec![9.0; 16]), 0, 0.0);
        assert!(out.iter().all(|&v| (v - 9.0).abs() < 1e-9));
    }
}
