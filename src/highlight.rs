//! Last-move highlight scoring.
//! Chess sites tint the origin and destination squares of the previous move.
//! Counting tinted pixels under a piece gives a rough "this piece just moved"
//! signal; it never affects what piece a square holds.

use image::RgbaImage;
use serde::{Deserialize, Serialize};

/// Highlight tints used by common board themes.
pub const DEFAULT_HIGHLIGHT_COLORS: [[u8; 3]; 4] = [
    [246, 246, 145],
    [190, 202, 95],
    [222, 228, 96],
    [250, 250, 126],
];

/// Largest possible RGB distance, `sqrt(3) * 255`.
const MAX_DISTANCE: f64 = 441.672_955_930_063_7;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HighlightScorer {
    pub colors: Vec<[u8; 3]>,
    /// Fraction of [`MAX_DISTANCE`] a pixel may deviate from a reference color.
    pub tolerance: f64,
}

impl Default for HighlightScorer {
    fn default() -> Self {
        Self {
            colors: DEFAULT_HIGHLIGHT_COLORS.to_vec(),
            tolerance: 0.03,
        }
    }
}

impl HighlightScorer {
    /// Sum over reference colors of the pixels within tolerance of that color.
    pub fn score(&self, sample: &RgbaImage) -> u32 {
        let limit = self.tolerance * MAX_DISTANCE;
        let limit_sq = limit * limit;
        self.colors
            .iter()
            .map(|reference| {
                sample
                    .pixels()
                    .filter(|pixel| distance_sq(&pixel.0, reference) <= limit_sq)
                    .count() as u32
            })
            .sum()
    }
}

fn distance_sq(pixel: &[u8; 4], reference: &[u8; 3]) -> f64 {
    (0..3)
        .map(|i| {
            let d = f64::from(pixel[i]) - f64::from(reference[i]);
            d * d
        })
        .sum()
}
