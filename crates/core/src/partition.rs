//! Tile layout for partitioned stills.
//!
//! A still is split into a `count x count` grid. Tile `index` lives at
//! column `index % count` and row `index / count`, row 0 being the top of
//! the frame. Each tile is rendered on its own with the camera zoomed in by
//! `count` and shifted onto the tile centre, at the tile's pixel size, so
//! the client can paste the tiles back together.

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Upper bound on grid size; 16 x 16 = 256 tiles is already far beyond
/// what a small farm can usefully schedule.
pub const MAX_PART_COUNT: u32 = 16;

/// Camera window applied while rendering one tile.
///
/// `zoom` scales the focal length; shifts are measured in tile widths
/// (resp. heights) from the frame centre, positive to the right and up.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CameraWindow {
    pub zoom: u32,
    pub shift_x: f64,
    pub shift_y: f64,
}

impl Default for CameraWindow {
    fn default() -> Self {
        Self {
            zoom: 1,
            shift_x: 0.0,
            shift_y: 0.0,
        }
    }
}

/// Pixel rectangle of a tile inside the full frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PixelRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// One validated tile of a `count x count` grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Tile {
    index: u32,
    count: u32,
}

impl Tile {
    /// Validate `index` against a grid of `count x count` tiles.
    pub fn new(index: u32, count: u32) -> Result<Self, CoreError> {
        if count == 0 || count > MAX_PART_COUNT {
            return Err(CoreError::Validation(format!(
                "Part count must be between 1 and {MAX_PART_COUNT}, got {count}"
            )));
        }
        let tiles = count * count;
        if index >= tiles {
            return Err(CoreError::Validation(format!(
                "Part index {index} out of range for {tiles} parts"
            )));
        }
        Ok(Self { index, count })
    }

    pub fn index(&self) -> u32 {
        self.index
    }

    pub fn count(&self) -> u32 {
        self.count
    }

    pub fn column(&self) -> u32 {
        self.index % self.count
    }

    pub fn row(&self) -> u32 {
        self.index / self.count
    }

    /// Where this tile lands in a `width x height` frame.
    ///
    /// Edges are computed from the grid lines so that tiles of an
    /// uneven frame still cover it exactly.
    pub fn pixel_rect(&self, width: u32, height: u32) -> PixelRect {
        let edge = |extent: u32, cell: u32| -> u32 {
            (u64::from(extent) * u64::from(cell) / u64::from(self.count)) as u32
        };
        let x0 = edge(width, self.column());
        let x1 = edge(width, self.column() + 1);
        let y0 = edge(height, self.row());
        let y1 = edge(height, self.row() + 1);
        PixelRect {
            x: x0,
            y: y0,
            width: x1 - x0,
            height: y1 - y0,
        }
    }

    /// Camera zoom and shift that frame exactly this tile.
    pub fn camera_window(&self) -> CameraWindow {
        let n = f64::from(self.count);
        CameraWindow {
            zoom: self.count,
            shift_x: f64::from(self.column()) + 0.5 - n / 2.0,
            shift_y: n / 2.0 - f64::from(self.row()) - 0.5,
        }
    }
}

/// All tiles of a `count x count` grid in index order.
pub fn tiles(count: u32) -> Result<Vec<Tile>, CoreError> {
    Tile::new(0, count)?;
    Ok((0..count * count).map(|index| Tile { index, count }).collect())
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    #[test]
    fn two_by_two_has_four_valid_indices() {
        for index in 0..4 {
            assert!(Tile::new(index, 2).is_ok());
        }
        assert!(Tile::new(4, 2).is_err());
    }

    #[test]
    fn zero_or_oversized_count_rejected() {
        assert!(Tile::new(0, 0).is_err());
        assert!(Tile::new(0, MAX_PART_COUNT + 1).is_err());
    }

    #[test]
    fn quadrants_are_distinct_and_cover_the_frame() {
        let (width, height) = (1920, 1080);
        let rects: Vec<PixelRect> = tiles(2)
            .unwrap()
            .iter()
            .map(|t| t.pixel_rect(width, height))
            .collect();

        let origins: HashSet<(u32, u32)> = rects.iter().map(|r| (r.x, r.y)).collect();
        assert_eq!(origins.len(), 4);

        for r in &rects {
            assert_eq!((r.width, r.height), (width / 2, height / 2));
        }

        // Top row widths and left column heights reassemble the frame.
        assert_eq!(rects[0].width + rects[1].width, width);
        assert_eq!(rects[0].height + rects[2].height, height);

        let area: u64 = rects.iter().map(|r| u64::from(r.width) * u64::from(r.height)).sum();
        assert_eq!(area, u64::from(width) * u64::from(height));
    }

    #[test]
    fn quadrants_do_not_overlap() {
        let rects: Vec<PixelRect> = tiles(2)
            .unwrap()
            .iter()
            .map(|t| t.pixel_rect(800, 600))
            .collect();
        for (i, a) in rects.iter().enumerate() {
            for b in rects.iter().skip(i + 1) {
                let disjoint_x = a.x + a.width <= b.x || b.x + b.width <= a.x;
                let disjoint_y = a.y + a.height <= b.y || b.y + b.height <= a.y;
                assert!(disjoint_x || disjoint_y, "{a:?} overlaps {b:?}");
            }
        }
    }

    #[test]
    fn uneven_frame_is_still_covered() {
        let rects: Vec<PixelRect> = tiles(3)
            .unwrap()
            .iter()
            .map(|t| t.pixel_rect(1001, 767))
            .collect();
        let top_row: u32 = rects[..3].iter().map(|r| r.width).sum();
        let left_col: u32 = rects.iter().step_by(3).map(|r| r.height).sum();
        assert_eq!(top_row, 1001);
        assert_eq!(left_col, 767);
    }

    #[test]
    fn layout_is_row_major_from_top_left() {
        let tile = Tile::new(1, 2).unwrap();
        assert_eq!((tile.column(), tile.row()), (1, 0));
        let rect = tile.pixel_rect(100, 100);
        assert_eq!((rect.x, rect.y), (50, 0));
    }

    #[test]
    fn camera_window_centres_on_tile() {
        let top_left = Tile::new(0, 2).unwrap().camera_window();
        assert_eq!(top_left.zoom, 2);
        assert_eq!((top_left.shift_x, top_left.shift_y), (-0.5, 0.5));

        let bottom_right = Tile::new(3, 2).unwrap().camera_window();
        assert_eq!((bottom_right.shift_x, bottom_right.shift_y), (0.5, -0.5));

        let single = Tile::new(0, 1).unwrap().camera_window();
        assert_eq!(single, CameraWindow::default());
    }
}
