//! Coordinate value types.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A slippy-map tile address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TileCoord {
    /// Column index, increasing eastward
    pub col: u32,
    /// Row index, increasing southward
    pub row: u32,
    /// Zoom level
    pub zoom: u8,
}

impl TileCoord {
    /// Creates a tile coordinate.
    pub fn new(col: u32, row: u32, zoom: u8) -> Self {
        Self { col, row, zoom }
    }
}

impl fmt::Display for TileCoord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.zoom, self.col, self.row)
    }
}

/// Geographic extent in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LngLatBounds {
    pub west: f64,
    pub south: f64,
    pub east: f64,
    pub north: f64,
}

impl LngLatBounds {
    /// `[west, south, east, north]`
    pub fn to_array(&self) -> [f64; 4] {
        [self.west, self.south, self.east, self.north]
    }
}

/// Inclusive tile index range at a single zoom level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TileBounds {
    pub min_col: u32,
    pub min_row: u32,
    pub max_col: u32,
    pub max_row: u32,
}

impl TileBounds {
    /// `[min_col, min_row, max_col, max_row]`
    pub fn to_array(&self) -> [u32; 4] {
        [self.min_col, self.min_row, self.max_col, self.max_row]
    }

    /// Number of tiles covered once clamped to the valid range at `zoom`.
    pub fn tile_count(&self, zoom: u8) -> u64 {
        let max = super::max_tile_index(zoom);
        let cols = span(self.min_col, self.max_col.min(max));
        let rows = span(self.min_row, self.max_row.min(max));
        cols * rows
    }
}

fn span(min: u32, max: u32) -> u64 {
    if max < min {
        0
    } else {
        (max - min) as u64 + 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tile_coord_display() {
        assert_eq!(TileCoord::new(540, 346, 10).to_string(), "10/540/346");
    }

    #[test]
    fn test_tile_count_single_tile() {
        let bounds = TileBounds {
            min_col: 3,
            min_row: 4,
            max_col: 3,
            max_row: 4,
        };
        assert_eq!(bounds.tile_count(5), 1);
    }

    #[test]
    fn test_tile_count_clamps_to_zoom() {
        let bounds = TileBounds {
            min_col: 2,
            min_row: 0,
            max_col: 9,
            max_row: 9,
        };
        // zoom 2 has indices 0..=3
        assert_eq!(bounds.tile_count(2), 2 * 4);
    }
}
