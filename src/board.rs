//! Board state reconstructed from one screen evaluation.
//!
//! A `Board` is built once per evaluation cycle from 64 classified
//! [`Position`]s and is never updated afterwards; the next cycle builds a new
//! one. Side-to-move, last move and castling rights are *heuristics* over that
//! single snapshot: there is no move history behind them.

use std::fmt;

use image::RgbaImage;
use serde::Serialize;

use crate::fen;
use crate::grid::{Grid, Orientation};
use crate::piece::{Color, Piece, PieceKind};
use crate::square::Square;

/// One square as seen on screen.
#[derive(Clone, Debug)]
pub struct Position {
    pub square: Square,
    /// Top-left pixel of the sample, in screen coordinates.
    pub anchor: (f64, f64),
    pub size: f64,
    pub piece: Option<Piece>,
    pub sample: RgbaImage,
    /// Pixels resembling a last-move highlight. Only scored for occupied squares.
    pub highlight: u32,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CastlingRights {
    pub white_kingside: bool,
    pub white_queenside: bool,
    pub black_kingside: bool,
    pub black_queenside: bool,
}

impl CastlingRights {
    /// Presence-based guess: a right is assumed whenever king and rook stand on
    /// their home squares. Rights lost earlier in the game are not detected.
    pub fn from_placement(placement: &[Option<Piece>; 64]) -> Self {
        let holds = |label: (u8, u8), kind: PieceKind, color: Color| {
            Square::new(label.0, label.1)
                .and_then(|sq| placement[sq.index()])
                .is_some_and(|p| p == Piece::new(kind, color))
        };
        let white_king = holds((4, 0), PieceKind::King, Color::White);
        let black_king = holds((4, 7), PieceKind::King, Color::Black);
        Self {
            white_kingside: white_king && holds((7, 0), PieceKind::Rook, Color::White),
            white_queenside: white_king && holds((0, 0), PieceKind::Rook, Color::White),
            black_kingside: black_king && holds((7, 7), PieceKind::Rook, Color::Black),
            black_queenside: black_king && holds((0, 7), PieceKind::Rook, Color::Black),
        }
    }

    pub fn any(&self) -> bool {
        self.white_kingside || self.white_queenside || self.black_kingside || self.black_queenside
    }
}

/// The piece presumed to have moved last and where it stands now.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LastMove {
    pub piece: Piece,
    pub square: Square,
}

impl fmt::Display for LastMove {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} to {}", self.piece, self.square)
    }
}

/// Symbolic 8x8 snapshot with its derived flags.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BoardState {
    placement: [Option<Piece>; 64],
    side_to_move: Color,
    last_move: Option<LastMove>,
    castling: CastlingRights,
}

impl BoardState {
    /// Derives the flags from a placement and per-square highlight counts.
    ///
    /// The occupied square with the most highlight pixels is taken as the last
    /// move, and the other color is to move. Without any highlighted piece
    /// white is to move. Ties go to the first square of [`highlight_scan`].
    pub fn new(
        placement: [Option<Piece>; 64],
        highlights: &[u32; 64],
        orientation: Orientation,
    ) -> Self {
        let mut last_move = None;
        let mut best = 0;
        for square in highlight_scan(orientation) {
            let Some(piece) = placement[square.index()] else {
                continue;
            };
            let count = highlights[square.index()];
            if count > best {
                best = count;
                last_move = Some(LastMove { piece, square });
            }
        }

        let side_to_move = last_move.map_or(Color::White, |m| m.piece.color.other());
        Self {
            castling: CastlingRights::from_placement(&placement),
            placement,
            side_to_move,
            last_move,
        }
    }

    pub fn from_placement(placement: [Option<Piece>; 64]) -> Self {
        Self::new(placement, &[0; 64], Orientation::Normal)
    }

    /// Standard initial array, white to move.
    pub fn starting_position() -> Self {
        Self::from_placement(starting_placement())
    }

    pub fn piece_at(&self, square: Square) -> Option<Piece> {
        self.placement[square.index()]
    }

    pub fn placement(&self) -> &[Option<Piece>; 64] {
        &self.placement
    }

    pub fn side_to_move(&self) -> Color {
        self.side_to_move
    }

    pub fn last_move(&self) -> Option<LastMove> {
        self.last_move
    }

    pub fn castling(&self) -> CastlingRights {
        self.castling
    }

    pub fn to_fen(&self) -> String {
        fen::encode(self)
    }

    /// Differences from the standard starting position, in reading order.
    pub fn starting_position_mismatches(&self) -> Vec<Mismatch> {
        let expected = starting_placement();
        Square::reading_order()
            .filter_map(|square| {
                let want = expected[square.index()];
                let got = self.placement[square.index()];
                match (want, got) {
                    (Some(expected), None) => Some(Mismatch::Missing { square, expected }),
                    (None, Some(found)) => Some(Mismatch::Unexpected { square, found }),
                    (Some(expected), Some(found)) if expected != found => Some(Mismatch::Wrong {
                        square,
                        expected,
                        found,
                    }),
                    _ => None,
                }
            })
            .collect()
    }
}

/// Column-major walk over the board as drawn: screen columns left to right,
/// each from the top square down. Normal boards go a8, a7, .., a1, b8, ..;
/// flipped boards go h1, h2, .., h8, g1, ...
pub fn highlight_scan(orientation: Orientation) -> impl Iterator<Item = Square> {
    let flipped = orientation == Orientation::Flipped;
    (0..8u8).flat_map(move |col| {
        (0..8u8).filter_map(move |row| {
            let (file, rank) = if flipped { (7 - col, row) } else { (col, 7 - row) };
            Square::new(file, rank)
        })
    })
}

fn starting_placement() -> [Option<Piece>; 64] {
    use PieceKind::*;
    const BACK_RANK: [PieceKind; 8] = [Rook, Knight, Bishop, Queen, King, Bishop, Knight, Rook];

    let mut placement = [None; 64];
    for (file, &kind) in BACK_RANK.iter().enumerate() {
        let file = file as u8;
        let put = |rank: u8, piece: Piece, placement: &mut [Option<Piece>; 64]| {
            if let Some(sq) = Square::new(file, rank) {
                placement[sq.index()] = Some(piece);
            }
        };
        put(0, Piece::new(kind, Color::White), &mut placement);
        put(1, Piece::new(Pawn, Color::White), &mut placement);
        put(6, Piece::new(Pawn, Color::Black), &mut placement);
        put(7, Piece::new(kind, Color::Black), &mut placement);
    }
    placement
}

/// A square that disagrees with the starting position.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Mismatch {
    Missing { square: Square, expected: Piece },
    Wrong { square: Square, expected: Piece, found: Piece },
    Unexpected { square: Square, found: Piece },
}

impl fmt::Display for Mismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mismatch::Missing { square, expected } => {
                write!(f, "could not locate {} at {}", expected, square)
            }
            Mismatch::Wrong {
                square,
                expected,
                found,
            } => write!(f, "found {} at {}, expected {}", found, square, expected),
            Mismatch::Unexpected { square, found } => {
                write!(f, "unexpected piece {} found at {}", found, square)
            }
        }
    }
}

/// JSON view of an occupied square.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct PieceReport {
    pub piece: PieceKind,
    pub color: Color,
    pub square: String,
    /// Top-left of the square sample.
    pub screen: (f64, f64),
    /// Side of the square sample in pixels.
    pub size: f64,
}

/// A recognized board: geometry, per-square evidence and derived state.
#[derive(Clone, Debug)]
pub struct Board {
    grid: Grid,
    positions: Vec<Position>,
    state: BoardState,
}

impl Board {
    /// Aggregates 64 classified positions. Must only be called once every
    /// position is final.
    pub fn assemble(grid: Grid, mut positions: Vec<Position>) -> Self {
        positions.sort_by_key(|p| p.square);
        debug_assert_eq!(positions.len(), 64, "one position per square");
        debug_assert!(positions.iter().enumerate().all(|(i, p)| p.square.index() == i));

        let mut placement = [None; 64];
        let mut highlights = [0; 64];
        for position in &positions {
            placement[position.square.index()] = position.piece;
            highlights[position.square.index()] = position.highlight;
        }

        Self {
            state: BoardState::new(placement, &highlights, grid.orientation),
            grid,
            positions,
        }
    }

    pub fn position(&self, square: Square) -> &Position {
        &self.positions[square.index()]
    }

    pub fn state(&self) -> &BoardState {
        &self.state
    }

    pub fn grid(&self) -> &Grid {
        &self.grid
    }

    pub fn orientation(&self) -> Orientation {
        self.grid.orientation
    }

    pub fn unit(&self) -> f64 {
        self.grid.unit
    }

    pub fn to_fen(&self) -> String {
        self.state.to_fen()
    }

    pub fn piece_report(&self) -> Vec<PieceReport> {
        Square::reading_order()
            .filter_map(|square| {
                let position = self.position(square);
                position.piece.map(|piece| PieceReport {
                    piece: piece.kind,
                    color: piece.color,
                    square: square.label(),
                    screen: position.anchor,
                    size: position.size,
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::{BoundingBox, GridParams};

    fn sq(label: &str) -> Square {
        label.parse().unwrap()
    }

    fn place(pieces: &[(&str, PieceKind, Color)]) -> [Option<Piece>; 64] {
        let mut placement = [None; 64];
        for &(label, kind, color) in pieces {
            placement[sq(label).index()] = Some(Piece::new(kind, color));
        }
        placement
    }

    #[test]
    fn test_no_highlight_defaults_to_white() {
        let state = BoardState::starting_position();
        assert_eq!(state.side_to_move(), Color::White);
        assert_eq!(state.last_move(), None);
    }

    #[test]
    fn test_most_highlighted_piece_is_last_move() {
        let placement = place(&[
            ("e4", PieceKind::Pawn, Color::White),
            ("e5", PieceKind::Pawn, Color::Black),
        ]);
        let mut highlights = [0; 64];
        highlights[sq("e4").index()] = 40;
        highlights[sq("e5").index()] = 250;
        // Highlight on an empty square is ignored.
        highlights[sq("a3").index()] = 900;

        let state = BoardState::new(placement, &highlights, Orientation::Normal);
        assert_eq!(
            state.last_move(),
            Some(LastMove {
                piece: Piece::new(PieceKind::Pawn, Color::Black),
                square: sq("e5"),
            })
        );
        assert_eq!(state.side_to_move(), Color::White);
    }

    #[test]
    fn test_highlight_tie_goes_to_first_file_scanned() {
        let placement = place(&[
            ("c3", PieceKind::Knight, Color::White),
            ("f6", PieceKind::Knight, Color::Black),
        ]);
        let mut highlights = [0; 64];
        highlights[sq("c3").index()] = 77;
        highlights[sq("f6").index()] = 77;

        let state = BoardState::new(placement, &highlights, Orientation::Normal);
        assert_eq!(state.last_move().map(|m| m.square), Some(sq("c3")));
        assert_eq!(state.side_to_move(), Color::Black);

        // Flipped boards are scanned from the h-file.
        let flipped = BoardState::new(placement, &highlights, Orientation::Flipped);
        assert_eq!(flipped.last_move().map(|m| m.square), Some(sq("f6")));
        assert_eq!(flipped.side_to_move(), Color::White);
    }

    #[test]
    fn test_highlight_tie_within_a_file() {
        let placement = place(&[
            ("d2", PieceKind::Pawn, Color::White),
            ("d7", PieceKind::Pawn, Color::Black),
        ]);
        let mut highlights = [0; 64];
        highlights[sq("d2").index()] = 30;
        highlights[sq("d7").index()] = 30;

        let normal = BoardState::new(placement, &highlights, Orientation::Normal);
        assert_eq!(normal.last_move().map(|m| m.square), Some(sq("d7")));
        let flipped = BoardState::new(placement, &highlights, Orientation::Flipped);
        assert_eq!(flipped.last_move().map(|m| m.square), Some(sq("d2")));
    }

    #[test]
    fn test_highlight_scan_order() {
        let normal: Vec<String> = highlight_scan(Orientation::Normal).map(Square::label).collect();
        assert_eq!(normal.len(), 64);
        assert_eq!(&normal[..3], ["a8", "a7", "a6"]);
        assert_eq!(normal[8], "b8");
        assert_eq!(normal[63], "h1");

        let flipped: Vec<String> = highlight_scan(Orientation::Flipped).map(Square::label).collect();
        assert_eq!(&flipped[..3], ["h1", "h2", "h3"]);
        assert_eq!(flipped[8], "g1");
        assert_eq!(flipped[63], "a8");
    }

    #[test]
    fn test_white_last_move_means_black_to_move() {
        let placement = place(&[("d4", PieceKind::Pawn, Color::White)]);
        let mut highlights = [0; 64];
        highlights[sq("d4").index()] = 5;
        assert_eq!(
            BoardState::new(placement, &highlights, Orientation::Normal).side_to_move(),
            Color::Black
        );
    }

    #[test]
    fn test_castling_requires_king_and_rook_on_home_squares() {
        let full = place(&[
            ("e1", PieceKind::King, Color::White),
            ("a1", PieceKind::Rook, Color::White),
            ("h1", PieceKind::Rook, Color::White),
            ("e8", PieceKind::King, Color::Black),
            ("a8", PieceKind::Rook, Color::Black),
            ("h8", PieceKind::Rook, Color::Black),
        ]);
        let rights = CastlingRights::from_placement(&full);
        assert!(rights.white_kingside && rights.white_queenside);
        assert!(rights.black_kingside && rights.black_queenside);

        let mut no_h1 = full;
        no_h1[sq("h1").index()] = None;
        let rights = CastlingRights::from_placement(&no_h1);
        assert!(!rights.white_kingside && rights.white_queenside);

        let mut queen_on_a8 = full;
        queen_on_a8[sq("a8").index()] = Some(Piece::new(PieceKind::Queen, Color::Black));
        let rights = CastlingRights::from_placement(&queen_on_a8);
        assert!(rights.black_kingside && !rights.black_queenside);

        let mut no_kings = full;
        no_kings[sq("e1").index()] = None;
        no_kings[sq("e8").index()] = None;
        assert!(!CastlingRights::from_placement(&no_kings).any());
    }

    #[test]
    fn test_castling_ignores_wrong_color() {
        let placement = place(&[
            ("e1", PieceKind::King, Color::White),
            ("h1", PieceKind::Rook, Color::Black),
        ]);
        assert!(!CastlingRights::from_placement(&placement).white_kingside);
    }

    #[test]
    fn test_starting_position_mismatches() {
        assert!(BoardState::starting_position().starting_position_mismatches().is_empty());

        let mut placement = *BoardState::starting_position().placement();
        placement[sq("e2").index()] = None;
        placement[sq("e4").index()] = Some(Piece::new(PieceKind::Pawn, Color::White));
        placement[sq("d8").index()] = Some(Piece::new(PieceKind::King, Color::Black));

        let mismatches = BoardState::from_placement(placement).starting_position_mismatches();
        assert_eq!(
            mismatches,
            vec![
                Mismatch::Wrong {
                    square: sq("d8"),
                    expected: Piece::new(PieceKind::Queen, Color::Black),
                    found: Piece::new(PieceKind::King, Color::Black),
                },
                Mismatch::Unexpected {
                    square: sq("e4"),
                    found: Piece::new(PieceKind::Pawn, Color::White),
                },
                Mismatch::Missing {
                    square: sq("e2"),
                    expected: Piece::new(PieceKind::Pawn, Color::White),
                },
            ]
        );
        assert_eq!(
            mismatches[2].to_string(),
            "could not locate pawn (white) at e2"
        );
    }

    #[test]
    fn test_assemble_orders_positions_and_reports_pieces() {
        let grid = Grid::map(
            BoundingBox::new((0.0, 0.0), (76.0, 76.0)),
            Orientation::Normal,
            &GridParams::default(),
        )
        .unwrap();
        let mut positions: Vec<Position> = Square::all()
            .map(|square| Position {
                square,
                anchor: grid.anchor(square),
                size: grid.unit,
                piece: None,
                sample: RgbaImage::new(1, 1),
                highlight: 0,
            })
            .collect();
        positions[sq("g1").index()].piece = Some(Piece::new(PieceKind::Knight, Color::White));
        positions.reverse();

        let board = Board::assemble(grid, positions);
        assert_eq!(board.position(sq("a1")).square, sq("a1"));
        assert_eq!(board.position(sq("g1")).piece.map(|p| p.kind), Some(PieceKind::Knight));

        let report = board.piece_report();
        assert_eq!(report.len(), 1);
        assert_eq!(report[0].square, "g1");
        assert_eq!(report[0].screen, board.grid().anchor(sq("g1")));
        assert_eq!(report[0].size, board.unit());
        assert_eq!(board.to_fen(), "8/8/8/8/8/8/8/6N1 w -");
    }
}
