//! Game loop: capture -> calibrate -> recognize -> decide -> act.
//! Each cycle works on one fresh frame and one fresh `Board`; the only state
//! carried between cycles is the calibration history, which is written back to
//! the configured history file whenever its order changes.

use std::path::PathBuf;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};

use crate::actuate::{Pointer, play_move};
use crate::board::Board;
use crate::calibrate::{CalibrationHistory, Calibrator};
use crate::capture::{Frame, Screen};
use crate::engine::{EngineMove, MoveDecider, Outcome, outcome};
use crate::ocr::Recognizer;

/// Calibration and recognition of a single frame.
pub struct Perception<'a> {
    pub calibrator: &'a Calibrator,
    pub recognizer: Recognizer<'a>,
}

impl Perception<'_> {
    /// Locates the board in `frame` and reads it. Marker templates go through
    /// the recognizer's matcher too.
    pub fn perceive(&self, frame: &Frame, history: CalibrationHistory) -> Result<(Board, CalibrationHistory)> {
        let (calibration, history) = self
            .calibrator
            .calibrate(frame, self.recognizer.matcher, history)
            .context("Failed to locate the board on screen")?;
        if let Some(marker) = self.calibrator.markers.candidate(calibration.candidate) {
            log::debug!("Board located with {}", marker.top_left);
        }
        let board = self
            .recognizer
            .recognize(frame, &calibration.grid)
            .context("Failed to recognize board squares")?;
        Ok((board, history))
    }
}

/// What one cycle of the loop did.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Turn {
    Played(EngineMove),
    /// Checkmate or stalemate on screen.
    Over(Outcome),
    /// The engine had nothing to play.
    NoMove,
    /// The recognized position is not a legal one; the next frame may be.
    Unreadable,
}

pub struct Game<'a> {
    perception: Perception<'a>,
    history: CalibrationHistory,
    history_file: Option<PathBuf>,
    movetime: Duration,
    move_delay: Duration,
}

impl<'a> Game<'a> {
    /// Starts from the persisted history when `history_file` holds one.
    pub fn new(
        perception: Perception<'a>,
        history_file: Option<PathBuf>,
        movetime: Duration,
        move_delay: Duration,
    ) -> Result<Self> {
        let candidates = perception.calibrator.markers.len();
        let history = match history_file.as_deref() {
            Some(path) => CalibrationHistory::load(path)?
                .map(|h| h.fit(candidates))
                .unwrap_or_else(|| CalibrationHistory::new(candidates)),
            None => CalibrationHistory::new(candidates),
        };
        Ok(Self {
            perception,
            history,
            history_file,
            movetime,
            move_delay,
        })
    }

    pub fn history(&self) -> &CalibrationHistory {
        &self.history
    }

    /// Captures and reads one frame, keeping the updated calibration history.
    pub fn observe(&mut self, screen: &dyn Screen) -> Result<Board> {
        let frame = screen.capture().context("Failed to capture screen")?;
        let (width, height) = frame.image().dimensions();
        log::debug!("Frame {}x{} at {:?}", width, height, frame.origin());
        let (board, history) = self.perception.perceive(&frame, self.history.clone())?;
        self.remember(history)?;
        Ok(board)
    }

    /// Runs a single cycle on a fresh frame.
    pub fn turn(
        &mut self,
        screen: &dyn Screen,
        decider: &mut dyn MoveDecider,
        pointer: &mut dyn Pointer,
    ) -> Result<Turn> {
        let start = Instant::now();
        let board = self.observe(screen)?;

        let state = board.state();
        match state.last_move() {
            Some(last) => log::info!("Last move: {}", last),
            None => log::info!("Last move: unknown"),
        }
        let fen = board.to_fen();
        log::info!("Board state [{}]: {}", state.side_to_move().name(), fen);

        match outcome(&fen) {
            None => {
                log::warn!("Recognized position is not legal, skipping this frame");
                return Ok(Turn::Unreadable);
            }
            Some(result) if result.is_over() => {
                log::info!("Game over: {:?}", result);
                return Ok(Turn::Over(result));
            }
            Some(_) => {}
        }

        let Some(mv) = decider.decide(&fen, self.movetime)? else {
            log::info!("Engine has no move for {}", fen);
            return Ok(Turn::NoMove);
        };
        match state.piece_at(mv.from) {
            Some(piece) => log::info!("Moving: {} to {}", piece, mv.to),
            None => log::warn!("Engine moves from empty square {}", mv.from),
        }
        play_move(board.grid(), mv, pointer).context("Failed to play move")?;
        log::debug!("Cycle latency: {:?}", start.elapsed());
        Ok(Turn::Played(mv))
    }

    /// Plays until the game ends or the engine gives up.
    pub fn run(
        &mut self,
        screen: &dyn Screen,
        decider: &mut dyn MoveDecider,
        pointer: &mut dyn Pointer,
    ) -> Result<Turn> {
        loop {
            match self.turn(screen, decider, pointer)? {
                Turn::Played(_) | Turn::Unreadable => thread::sleep(self.move_delay),
                finished => return Ok(finished),
            }
        }
    }

    fn remember(&mut self, history: CalibrationHistory) -> Result<()> {
        if history == self.history {
            return Ok(());
        }
        if let Some(path) = &self.history_file {
            history.save(path)?;
        }
        self.history = history;
        Ok(())
    }
}
