//! Grid mapping: bounding box + orientation -> 64 square anchors.
//!
//! The corner markers sit slightly inside the drawn board, so the marker
//! distance spans 7.6 squares rather than 8 and every anchor is shifted by a
//! fixed inset. Both constants are empirical and live in [`GridParams`].

use serde::{Deserialize, Serialize};

use crate::error::{Result, VisionError};
use crate::square::Square;

/// Which side of the board is drawn at the bottom of the screen.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Orientation {
    /// White at the bottom.
    #[default]
    Normal,
    /// Black at the bottom.
    Flipped,
}

/// Screen positions of the two corner markers.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BoundingBox {
    pub top_left: (f64, f64),
    pub bottom_right: (f64, f64),
}

impl BoundingBox {
    pub fn new(top_left: (f64, f64), bottom_right: (f64, f64)) -> Self {
        Self {
            top_left,
            bottom_right,
        }
    }

    pub fn height(&self) -> f64 {
        (self.bottom_right.1 - self.top_left.1).abs()
    }

    fn invalid(&self, reason: &'static str) -> VisionError {
        VisionError::InvalidBoard {
            top_left: self.top_left,
            bottom_right: self.bottom_right,
            reason,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GridParams {
    /// Offset from the top-left marker to the a8 (or h1) anchor, in pixels.
    pub inset: (f64, f64),
    /// Marker distance expressed in squares.
    pub unit_divisor: f64,
}

impl Default for GridParams {
    fn default() -> Self {
        Self {
            inset: (10.0, 7.0),
            unit_divisor: 7.6,
        }
    }
}

/// Square anchors for one calibrated board.
#[derive(Clone, Debug, PartialEq)]
pub struct Grid {
    pub bounds: BoundingBox,
    pub orientation: Orientation,
    pub unit: f64,
    anchors: [(f64, f64); 64],
}

impl Grid {
    /// Maps a bounding box to square anchors, failing with
    /// [`VisionError::InvalidBoard`] when the box cannot describe a board.
    pub fn map(bounds: BoundingBox, orientation: Orientation, params: &GridParams) -> Result<Grid> {
        let (x1, y1) = bounds.top_left;
        let (x2, y2) = bounds.bottom_right;
        if x1 < 0.0 || y1 < 0.0 || x2 < 0.0 || y2 < 0.0 {
            return Err(bounds.invalid("negative coordinate"));
        }
        if x2 <= x1 || y2 <= y1 {
            return Err(bounds.invalid("bottom-right marker is not below and right of top-left"));
        }

        let unit = bounds.height() / params.unit_divisor;
        if unit < 1.0 {
            return Err(bounds.invalid("square size below one pixel"));
        }

        let origin = (x1 + params.inset.0, y1 + params.inset.1);
        let mut anchors = [(0.0, 0.0); 64];
        for square in Square::all() {
            let (col, row) = screen_cell(square, orientation);
            anchors[square.index()] = (
                origin.0 + col as f64 * unit,
                origin.1 + row as f64 * unit,
            );
        }

        Ok(Grid {
            bounds,
            orientation,
            unit,
            anchors,
        })
    }

    /// Top-left pixel of the square's sample.
    pub fn anchor(&self, square: Square) -> (f64, f64) {
        self.anchors[square.index()]
    }

    /// Pointer target for the square.
    pub fn center(&self, square: Square) -> (f64, f64) {
        let (x, y) = self.anchor(square);
        (x + self.unit / 2.0, y + self.unit / 2.0)
    }
}

/// Column/row of a square as drawn on screen, counted from the top-left.
fn screen_cell(square: Square, orientation: Orientation) -> (u8, u8) {
    match orientation {
        Orientation::Normal => (square.file(), 7 - square.rank()),
        Orientation::Flipped => (7 - square.file(), square.rank()),
    }
}
