//! Simplified FEN output: `<placement> <w|b> <castling>`.
//! En-passant target and move counters are never emitted; use [`full_fen`] when a
//! consumer needs all six fields.

use crate::board::BoardState;
use crate::piece::Color;
use crate::square::Square;

pub fn encode(state: &BoardState) -> String {
    let mut fen = String::with_capacity(90);
    for rank in (0..8u8).rev() {
        let mut empty = 0;
        for file in 0..8u8 {
            let piece = Square::new(file, rank).and_then(|sq| state.piece_at(sq));
            match piece {
                Some(piece) => {
                    if empty > 0 {
                        fen.push(char::from(b'0' + empty));
                        empty = 0;
                    }
                    fen.push(piece.fen_char());
                }
                None => empty += 1,
            }
        }
        if empty > 0 {
            fen.push(char::from(b'0' + empty));
        }
        if rank > 0 {
            fen.push('/');
        }
    }

    fen.push_str(match state.side_to_move() {
        Color::White => " w ",
        Color::Black => " b ",
    });

    let castling = state.castling();
    if castling.any() {
        for (allowed, letter) in [
            (castling.white_kingside, 'K'),
            (castling.white_queenside, 'Q'),
            (castling.black_kingside, 'k'),
            (castling.black_queenside, 'q'),
        ] {
            if allowed {
                fen.push(letter);
            }
        }
    } else {
        fen.push('-');
    }
    fen
}

/// Pads a fragment with a neutral en-passant field and move counters.
pub fn full_fen(fragment: &str) -> String {
    format!("{} - 0 1", fragment)
}
