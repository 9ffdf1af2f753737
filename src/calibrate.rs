//! Calibration module.
//! Finds the board on screen by matching pairs of corner-marker templates
//! (top-left and bottom-right edge of the board, one pair per theme and
//! orientation). Candidates are tried in the order kept by a
//! `CalibrationHistory`; the pair that works is moved to the front so the next
//! calibration usually succeeds on the first try.
//! Templates live in `<assets>/markers/edge-top-left[-flipped][-N].png`.

use std::fs;
use std::path::Path;

use anyhow::Context;
use image::GrayImage;
use serde::{Deserialize, Serialize};

use crate::capture::Frame;
use crate::catalog::load_template;
use crate::error::{Result, VisionError};
use crate::grid::{BoundingBox, Grid, GridParams, Orientation};
use crate::matcher::{Match, TemplateMatcher};
use crate::square::Square;

/// Number of marker themes shipped per orientation.
const MARKER_THEMES: usize = 6;

/// A pair of corner templates plus the orientation they imply.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarkerCandidate {
    pub top_left: String,
    pub bottom_right: String,
    pub orientation: Orientation,
}

/// Default marker pairs: six normal themes followed by six flipped ones.
pub fn default_candidates() -> Vec<MarkerCandidate> {
    [Orientation::Normal, Orientation::Flipped]
        .into_iter()
        .flat_map(|orientation| {
            (1..=MARKER_THEMES).map(move |theme| {
                let mut suffix = String::new();
                if orientation == Orientation::Flipped {
                    suffix.push_str("-flipped");
                }
                if theme > 1 {
                    suffix.push_str(&format!("-{theme}"));
                }
                MarkerCandidate {
                    top_left: format!("edge-top-left{suffix}.png"),
                    bottom_right: format!("edge-bottom-right{suffix}.png"),
                    orientation,
                }
            })
        })
        .collect()
}

struct LoadedMarker {
    candidate: MarkerCandidate,
    top_left: GrayImage,
    bottom_right: GrayImage,
}

/// Marker candidates with their templates in memory.
pub struct MarkerSet {
    markers: Vec<LoadedMarker>,
}

impl MarkerSet {
    pub fn new(markers: Vec<(MarkerCandidate, GrayImage, GrayImage)>) -> Self {
        Self {
            markers: markers
                .into_iter()
                .map(|(candidate, top_left, bottom_right)| LoadedMarker {
                    candidate,
                    top_left,
                    bottom_right,
                })
                .collect(),
        }
    }

    /// Loads every default candidate whose two templates exist in `dir`.
    pub fn load(dir: &Path) -> Result<Self> {
        let mut markers = Vec::new();
        for candidate in default_candidates() {
            let top_left = load_template(&dir.join(&candidate.top_left));
            let bottom_right = load_template(&dir.join(&candidate.bottom_right));
            match (top_left, bottom_right) {
                (Ok(top_left), Ok(bottom_right)) => markers.push(LoadedMarker {
                    candidate,
                    top_left,
                    bottom_right,
                }),
                (Err(VisionError::MissingTemplate(path)), _) | (_, Err(VisionError::MissingTemplate(path))) => {
                    log::debug!("Skipping marker set without {}", path.display());
                }
                (Err(e), _) | (_, Err(e)) => return Err(e),
            }
        }
        if markers.is_empty() {
            return Err(VisionError::EmptyCatalog(dir.to_path_buf()));
        }
        Ok(Self { markers })
    }

    pub fn len(&self) -> usize {
        self.markers.len()
    }

    pub fn candidate(&self, index: usize) -> Option<&MarkerCandidate> {
        self.markers.get(index).map(|m| &m.candidate)
    }
}

/// Priority order of marker candidates, most recently successful first.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalibrationHistory {
    order: Vec<usize>,
}

impl CalibrationHistory {
    /// Candidates in their declared order.
    pub fn new(candidates: usize) -> Self {
        Self {
            order: (0..candidates).collect(),
        }
    }

    pub fn order(&self) -> &[usize] {
        &self.order
    }

    /// Moves the candidate at `rank` to the front. Candidates ranked before it
    /// shift back by one; the rest keep their places.
    pub fn promote(&mut self, rank: usize) {
        if rank < self.order.len() {
            self.order[..=rank].rotate_right(1);
        }
    }

    /// Returns this history if it orders exactly `candidates` entries, otherwise
    /// a fresh one. Guards against a persisted history from another marker set.
    pub fn fit(self, candidates: usize) -> Self {
        let mut seen = vec![false; candidates];
        let valid = self.order.len() == candidates
            && self
                .order
                .iter()
                .all(|&i| i < candidates && !std::mem::replace(&mut seen[i], true));
        if valid { self } else { Self::new(candidates) }
    }

    pub fn load(path: &Path) -> anyhow::Result<Option<Self>> {
        if !path.exists() {
            return Ok(None);
        }
        let raw = fs::read_to_string(path)
            .with_context(|| format!("Failed to read calibration history {}", path.display()))?;
        let history = serde_json::from_str(&raw)
            .with_context(|| format!("Malformed calibration history {}", path.display()))?;
        Ok(Some(history))
    }

    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        let raw = serde_json::to_string_pretty(self)?;
        fs::write(path, raw)
            .with_context(|| format!("Failed to write calibration history {}", path.display()))
    }
}

/// Result of a successful calibration.
#[derive(Clone, Debug)]
pub struct Calibration {
    pub grid: Grid,
    /// Index of the winning candidate in the marker set.
    pub candidate: usize,
}

pub struct Calibrator {
    pub markers: MarkerSet,
    pub confidence: f32,
    pub params: GridParams,
}

impl Calibrator {
    pub fn new(markers: MarkerSet, confidence: f32, params: GridParams) -> Self {
        Self {
            markers,
            confidence,
            params,
        }
    }

    /// Locates the board in `frame`, trying candidates in `history` order.
    /// Returns the calibration and the history with the winner promoted.
    pub fn calibrate(
        &self,
        frame: &Frame,
        matcher: &dyn TemplateMatcher,
        history: CalibrationHistory,
    ) -> Result<(Calibration, CalibrationHistory)> {
        let mut history = history.fit(self.markers.len());
        let screen = frame.grayscale();

        let order = history.order().to_vec();
        for (rank, &index) in order.iter().enumerate() {
            let marker = &self.markers.markers[index];
            let orientation = marker.candidate.orientation;
            log::debug!("Trying marker set {} - {:?}", index + 1, orientation);

            let Some(top_left) = self.locate(&screen, &marker.top_left, matcher)? else {
                continue;
            };
            let Some(bottom_right) = self.locate(&screen, &marker.bottom_right, matcher)? else {
                continue;
            };

            let bounds = BoundingBox::new(
                frame.to_screen(top_left.x, top_left.y),
                frame.to_screen(bottom_right.x, bottom_right.y),
            );
            match self.validated_grid(frame, bounds, orientation) {
                Ok(grid) => {
                    log::info!("Used marker set {} - {:?}", index + 1, orientation);
                    history.promote(rank);
                    return Ok((Calibration { grid, candidate: index }, history));
                }
                Err(e @ VisionError::InvalidBoard { .. }) => {
                    log::debug!("Marker set {} rejected: {}", index + 1, e);
                }
                Err(e) => return Err(e),
            }
        }

        Err(VisionError::NoBoardFound { tried: order.len() })
    }

    fn locate(
        &self,
        screen: &GrayImage,
        template: &GrayImage,
        matcher: &dyn TemplateMatcher,
    ) -> Result<Option<Match>> {
        match matcher.find(screen, template, self.confidence) {
            Err(VisionError::TemplateSize { .. }) => Ok(None),
            other => other,
        }
    }

    fn validated_grid(&self, frame: &Frame, bounds: BoundingBox, orientation: Orientation) -> Result<Grid> {
        let grid = Grid::map(bounds, orientation, &self.params)?;
        // Per square: each crop rounds its own position and size.
        let inside = Square::all().all(|square| {
            let (x, y) = grid.anchor(square);
            frame.contains(x, y, grid.unit, grid.unit)
        });
        if !inside {
            return Err(VisionError::InvalidBoard {
                top_left: bounds.top_left,
                bottom_right: bounds.bottom_right,
                reason: "board extends past the captured screen",
            });
        }
        Ok(grid)
    }
}
