//! Board squares addressed by label ("a1".."h8") or dense index 0..64.

use std::fmt;
use std::str::FromStr;

use anyhow::bail;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Square(u8);

impl Square {
    /// `file` and `rank` are 0-based: a = 0, rank 1 = 0.
    pub fn new(file: u8, rank: u8) -> Option<Self> {
        (file < 8 && rank < 8).then_some(Square(rank * 8 + file))
    }

    pub fn index(self) -> usize {
        self.0 as usize
    }

    pub fn file(self) -> u8 {
        self.0 % 8
    }

    pub fn rank(self) -> u8 {
        self.0 / 8
    }

    /// All 64 squares, a1 first.
    pub fn all() -> impl Iterator<Item = Square> {
        (0..64u8).map(Square)
    }

    /// Reading order of a diagram: rank 8 down to rank 1, files a to h.
    pub fn reading_order() -> impl Iterator<Item = Square> {
        (0..8u8)
            .rev()
            .flat_map(|rank| (0..8u8).map(move |file| Square(rank * 8 + file)))
    }

    pub fn label(self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Square {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", (b'a' + self.file()) as char, (b'1' + self.rank()) as char)
    }
}

impl FromStr for Square {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        let bytes = s.as_bytes();
        if bytes.len() != 2 {
            bail!("square label must be two characters, got '{}'", s);
        }
        let file = bytes[0].wrapping_sub(b'a');
        let rank = bytes[1].wrapping_sub(b'1');
        match Square::new(file, rank) {
            Some(square) => Ok(square),
            None => bail!("'{}' is not a square label", s),
        }
    }
}
