//! Board recognition: calibrated frame -> `Board`.
//! Every square is cropped from the same frame, classified against the piece
//! catalog and, when occupied, scored for last-move highlight. Squares are
//! independent of each other, so the scan can run on rayon's pool; the board is
//! only assembled after all 64 positions are final.
//! Debug: with a cache dir configured, each square sample is written to
//! `<cache_dir>/<square>.png`, overwritten on every cycle.

use std::fs;
use std::path::Path;
use std::time::Instant;

use image::imageops;
use rayon::prelude::*;

use crate::board::{Board, Position};
use crate::capture::Frame;
use crate::catalog::PieceCatalog;
use crate::error::{Result, VisionError};
use crate::grid::Grid;
use crate::highlight::HighlightScorer;
use crate::matcher::TemplateMatcher;
use crate::square::Square;

/// How the 64 squares are scanned.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ScanMode {
    /// One square after another on the calling thread.
    Sequential,
    /// Squares spread over the rayon thread pool.
    #[default]
    Parallel,
}

impl std::fmt::Display for ScanMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ScanMode::Sequential => write!(f, "sequential"),
            ScanMode::Parallel => write!(f, "parallel (rayon)"),
        }
    }
}

pub struct Recognizer<'a> {
    pub catalog: &'a PieceCatalog,
    pub matcher: &'a dyn TemplateMatcher,
    pub scorer: &'a HighlightScorer,
    pub piece_confidence: f32,
    pub mode: ScanMode,
    pub cache_dir: Option<&'a Path>,
}

impl Recognizer<'_> {
    /// Classifies all squares of `grid` in `frame`.
    pub fn recognize(&self, frame: &Frame, grid: &Grid) -> Result<Board> {
        let start = Instant::now();
        if let Some(dir) = self.cache_dir {
            fs::create_dir_all(dir)?;
        }

        let squares: Vec<Square> = Square::all().collect();
        let positions = match self.mode {
            ScanMode::Sequential => squares
                .iter()
                .map(|&square| self.evaluate_square(frame, grid, square))
                .collect::<Result<Vec<_>>>()?,
            ScanMode::Parallel => squares
                .par_iter()
                .map(|&square| self.evaluate_square(frame, grid, square))
                .collect::<Result<Vec<_>>>()?,
        };

        let board = Board::assemble(grid.clone(), positions);
        log::debug!("Recognition ({}) latency: {:?}", self.mode, start.elapsed());
        Ok(board)
    }

    fn evaluate_square(&self, frame: &Frame, grid: &Grid, square: Square) -> Result<Position> {
        let anchor = grid.anchor(square);
        let sample = frame.region(anchor.0, anchor.1, grid.unit, grid.unit)?;

        if let Some(dir) = self.cache_dir {
            let path = dir.join(format!("{square}.png"));
            sample
                .save(&path)
                .map_err(|source| VisionError::Image { path, source })?;
        }

        let gray = imageops::grayscale(&sample);
        let piece = self
            .catalog
            .classify(&gray, self.matcher, self.piece_confidence)?;
        let highlight = match piece {
            Some(_) => self.scorer.score(&sample),
            None => 0,
        };

        Ok(Position {
            square,
            anchor,
            size: grid.unit,
            piece,
            sample,
            highlight,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::CatalogEntry;
    use crate::grid::{BoundingBox, GridParams, Orientation};
    use crate::matcher::Match;
    use crate::piece::{Color, Piece, PieceKind};
    use image::{GrayImage, Luma, Rgba, RgbaImage};

    /// Matches when the sample's top-left pixel equals the template's.
    struct CornerKeyMatcher;

    impl TemplateMatcher for CornerKeyMatcher {
        fn find(&self, region: &GrayImage, template: &GrayImage, _: f32) -> Result<Option<Match>> {
            let sample = i16::from(region.get_pixel(0, 0).0[0]);
            let key = i16::from(template.get_pixel(0, 0).0[0]);
            Ok(((sample - key).abs() <= 1).then_some(Match {
                x: 0,
                y: 0,
                confidence: 1.0,
            }))
        }
    }

    const WHITE_PAWN: u8 = 40;
    const BLACK_PAWN: u8 = 60;

    fn catalog() -> PieceCatalog {
        let entry = |kind, color, key| CatalogEntry {
            piece: Piece::new(kind, color),
            name: format!("key-{key}"),
            template: GrayImage::from_pixel(1, 1, Luma([key])),
        };
        PieceCatalog::new(vec![
            entry(PieceKind::Pawn, Color::White, WHITE_PAWN),
            entry(PieceKind::Pawn, Color::Black, BLACK_PAWN),
        ])
    }

    fn grid(orientation: Orientation) -> Grid {
        // Unit of exactly 20 pixels, a8 anchor at (20, 17) when not flipped.
        Grid::map(
            BoundingBox::new((10.0, 10.0), (162.0, 162.0)),
            orientation,
            &GridParams::default(),
        )
        .unwrap()
    }

    fn paint(image: &mut RgbaImage, grid: &Grid, label: &str, key: u8, tint: Option<[u8; 3]>) {
        let (x0, y0) = grid.anchor(label.parse().unwrap());
        let (x0, y0) = (x0 as u32, y0 as u32);
        if let Some([r, g, b]) = tint {
            for y in y0 + 10..y0 + 20 {
                for x in x0..x0 + 20 {
                    image.put_pixel(x, y, Rgba([r, g, b, 255]));
                }
            }
        }
        image.put_pixel(x0, y0, Rgba([key, key, key, 255]));
    }

    fn frame(grid: &Grid) -> Frame {
        let mut image = RgbaImage::from_pixel(200, 200, Rgba([20, 20, 20, 255]));
        paint(&mut image, grid, "e2", WHITE_PAWN, None);
        paint(&mut image, grid, "e4", WHITE_PAWN, Some([246, 246, 145]));
        paint(&mut image, grid, "e7", BLACK_PAWN, None);
        // Highlighted origin square of the last move holds no piece.
        paint(&mut image, grid, "e3", 20, Some([246, 246, 145]));
        Frame::new(image, (0, 0))
    }

    fn recognizer<'a>(catalog: &'a PieceCatalog, scorer: &'a HighlightScorer, mode: ScanMode) -> Recognizer<'a> {
        Recognizer {
            catalog,
            matcher: &CornerKeyMatcher,
            scorer,
            piece_confidence: 0.8,
            mode,
            cache_dir: None,
        }
    }

    #[test]
    fn test_scan_mode_display() {
        assert_eq!(format!("{}", ScanMode::Sequential), "sequential");
        assert_eq!(format!("{}", ScanMode::Parallel), "parallel (rayon)");
    }

    #[test]
    fn test_scan_mode_default() {
        assert_eq!(ScanMode::default(), ScanMode::Parallel);
    }

    #[test]
    fn test_recognizes_pieces_and_side_to_move() {
        let (catalog, scorer) = (catalog(), HighlightScorer::default());
        let grid = grid(Orientation::Normal);
        let board = recognizer(&catalog, &scorer, ScanMode::Sequential)
            .recognize(&frame(&grid), &grid)
            .unwrap();

        assert_eq!(board.to_fen(), "8/4p3/8/8/4P3/8/4P3/8 b -");
        let e4 = board.position("e4".parse().unwrap());
        assert_eq!(e4.highlight, 200);
        assert_eq!(e4.sample.dimensions(), (20, 20));
        assert_eq!(board.position("e3".parse().unwrap()).highlight, 0);
        assert_eq!(board.state().last_move().map(|m| m.square.label()), Some("e4".to_string()));
    }

    #[test]
    fn test_parallel_scan_matches_sequential() {
        let (catalog, scorer) = (catalog(), HighlightScorer::default());
        let grid = grid(Orientation::Flipped);
        let frame = frame(&grid);

        let sequential = recognizer(&catalog, &scorer, ScanMode::Sequential)
            .recognize(&frame, &grid)
            .unwrap();
        let parallel = recognizer(&catalog, &scorer, ScanMode::Parallel)
            .recognize(&frame, &grid)
            .unwrap();
        assert_eq!(sequential.state(), parallel.state());
        assert_eq!(parallel.to_fen(), "8/4p3/8/8/4P3/8/4P3/8 b -");
    }

    #[test]
    fn test_writes_square_cache() {
        let (catalog, scorer) = (catalog(), HighlightScorer::default());
        let grid = grid(Orientation::Normal);
        let dir = tempfile::tempdir().unwrap();
        let cache = dir.path().join("cache");

        let mut recognizer = recognizer(&catalog, &scorer, ScanMode::Parallel);
        recognizer.cache_dir = Some(cache.as_path());
        recognizer.recognize(&frame(&grid), &grid).unwrap();

        assert_eq!(fs::read_dir(&cache).unwrap().count(), 64);
        let e4 = image::open(cache.join("e4.png")).unwrap().to_rgba8();
        assert_eq!(e4.get_pixel(0, 19), &Rgba([246, 246, 145, 255]));
    }

    #[test]
    fn test_square_outside_frame_fails() {
        let (catalog, scorer) = (catalog(), HighlightScorer::default());
        let grid = grid(Orientation::Normal);
        let small = Frame::new(RgbaImage::new(100, 100), (0, 0));
        let err = recognizer(&catalog, &scorer, ScanMode::Sequential)
            .recognize(&small, &grid)
            .unwrap_err();
        assert!(matches!(err, VisionError::OutOfFrame { .. }));
    }
}
