//! Engine module.
//! Talks UCI to an external engine process (Stockfish or any UCI engine) to pick
//! moves for the recognized position, and uses shakmaty to tell whether that
//! position is already over.
//! The recognized FEN has no en-passant or move counters; it is padded with
//! `- 0 1` before it is handed to the engine.

use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use shakmaty::fen::Fen;
use shakmaty::{CastlingMode, Chess, Position};

use crate::fen::full_fen;
use crate::piece::{Color, PieceKind};
use crate::square::Square;

/// A move in coordinate notation, e.g. `e2e4` or `e7e8q`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EngineMove {
    pub from: Square,
    pub to: Square,
    pub promotion: Option<PieceKind>,
}

impl FromStr for EngineMove {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        if !s.is_ascii() || !(4..=5).contains(&s.len()) {
            bail!("'{}' is not a coordinate move", s);
        }
        let from = s[0..2].parse()?;
        let to = s[2..4].parse()?;
        let promotion = match s.as_bytes().get(4) {
            None => None,
            Some(b'q') => Some(PieceKind::Queen),
            Some(b'r') => Some(PieceKind::Rook),
            Some(b'b') => Some(PieceKind::Bishop),
            Some(b'n') => Some(PieceKind::Knight),
            Some(_) => bail!("'{}' has an invalid promotion piece", s),
        };
        Ok(Self { from, to, promotion })
    }
}

impl std::fmt::Display for EngineMove {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}{}", self.from, self.to)?;
        match self.promotion {
            Some(PieceKind::Queen) => write!(f, "q"),
            Some(PieceKind::Rook) => write!(f, "r"),
            Some(PieceKind::Bishop) => write!(f, "b"),
            Some(PieceKind::Knight) => write!(f, "n"),
            _ => Ok(()),
        }
    }
}

/// Picks a move for a position given as a FEN fragment.
pub trait MoveDecider {
    /// `None` when the engine has no move to offer.
    fn decide(&mut self, fen: &str, movetime: Duration) -> Result<Option<EngineMove>>;
}

/// UCI engine running as a child process.
pub struct UciEngine {
    child: Child,
    stdin: BufWriter<ChildStdin>,
    stdout: BufReader<ChildStdout>,
    name: String,
}

impl UciEngine {
    /// Starts the engine and completes the `uci` / `isready` handshake.
    pub fn spawn(program: &Path, args: &[String]) -> Result<Self> {
        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .with_context(|| {
                format!(
                    "Failed to start engine '{}'. Make sure it is installed and in PATH",
                    program.display()
                )
            })?;

        let stdin = BufWriter::new(child.stdin.take().context("Failed to get engine stdin")?);
        let stdout = BufReader::new(child.stdout.take().context("Failed to get engine stdout")?);

        let mut engine = Self {
            child,
            stdin,
            stdout,
            name: program.display().to_string(),
        };

        engine.send("uci")?;
        for line in engine.read_until("uciok")? {
            if let Some(name) = line.strip_prefix("id name ") {
                engine.name = name.trim().to_string();
            }
        }
        engine.send("isready")?;
        engine.read_until("readyok")?;

        log::info!("Engine ready: {}", engine.name);
        Ok(engine)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn send(&mut self, command: &str) -> Result<()> {
        log::trace!("engine <- {}", command);
        writeln!(self.stdin, "{command}").context("Failed to write to engine")?;
        self.stdin.flush().context("Failed to flush engine stdin")?;
        Ok(())
    }

    /// Reads lines up to and including the first one starting with `token`.
    fn read_until(&mut self, token: &str) -> Result<Vec<String>> {
        let mut lines = Vec::new();
        loop {
            let mut line = String::new();
            let read = self
                .stdout
                .read_line(&mut line)
                .context("Failed to read from engine")?;
            if read == 0 {
                bail!("Engine '{}' exited while waiting for '{}'", self.name, token);
            }
            let line = line.trim().to_string();
            log::trace!("engine -> {}", line);
            let done = line.starts_with(token);
            lines.push(line);
            if done {
                return Ok(lines);
            }
        }
    }
}

impl MoveDecider for UciEngine {
    fn decide(&mut self, fen: &str, movetime: Duration) -> Result<Option<EngineMove>> {
        self.send(&format!("position fen {}", full_fen(fen)))?;
        self.send(&format!("go movetime {}", movetime.as_millis()))?;

        let lines = self.read_until("bestmove")?;
        let best = lines
            .last()
            .and_then(|line| line.split_whitespace().nth(1))
            .context("Engine sent an empty bestmove")?;
        if best == "(none)" || best == "0000" {
            return Ok(None);
        }
        best.parse::<EngineMove>()
            .map(Some)
            .with_context(|| format!("Engine returned unparseable move '{}'", best))
    }
}

impl Drop for UciEngine {
    fn drop(&mut self) {
        let _ = self.send("quit");
        let _ = self.child.wait();
    }
}

/// Whether a recognized position is still being played.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Outcome {
    Ongoing,
    Checkmate { winner: Color },
    Stalemate,
}

impl Outcome {
    pub fn is_over(self) -> bool {
        self != Outcome::Ongoing
    }
}

/// Game state of a FEN fragment, or `None` if it is not a legal position
/// (typically a misread piece or a wrongly guessed side to move).
pub fn outcome(fen: &str) -> Option<Outcome> {
    let setup: Fen = full_fen(fen).parse().ok()?;
    let position: Chess = setup.into_position(CastlingMode::Standard).ok()?;
    if position.is_checkmate() {
        let winner = match position.turn() {
            shakmaty::Color::White => Color::Black,
            shakmaty::Color::Black => Color::White,
        };
        Some(Outcome::Checkmate { winner })
    } else if position.is_stalemate() {
        Some(Outcome::Stalemate)
    } else {
        Some(Outcome::Ongoing)
    }
}
