//! Actuation: turns an engine move into pointer input on the recognized board.
//! Square centers come from the calibrated grid in capture pixels; pointers
//! convert them to their own coordinate space.
//! Permissions note: on macOS the terminal needs Accessibility access
//! (System Settings > Privacy & Security > Accessibility) for synthetic input.

use anyhow::Result;

use crate::engine::EngineMove;
use crate::grid::Grid;

pub trait Pointer {
    fn move_to(&mut self, x: f64, y: f64) -> Result<()>;
    fn click(&mut self) -> Result<()>;
    fn drag_to(&mut self, x: f64, y: f64) -> Result<()>;
}

/// Picks up the piece on `mv.from` and drops it on `mv.to`.
/// Sites accept either click-click or drag, so both are sent.
pub fn play_move(grid: &Grid, mv: EngineMove, pointer: &mut dyn Pointer) -> Result<()> {
    let (fx, fy) = grid.center(mv.from);
    let (tx, ty) = grid.center(mv.to);
    log::debug!("Playing {} from ({:.0}, {:.0}) to ({:.0}, {:.0})", mv, fx, fy, tx, ty);

    pointer.move_to(fx, fy)?;
    pointer.click()?;
    pointer.drag_to(tx, ty)?;
    pointer.click()?;
    Ok(())
}

#[cfg(feature = "desktop")]
pub use desktop::RdevPointer;

#[cfg(feature = "desktop")]
mod desktop {
    use std::thread;
    use std::time::Duration;

    use anyhow::{Result, anyhow};
    use rdev::{Button, EventType, simulate};

    use super::Pointer;

    /// OS-level pointer driven through `rdev::simulate`.
    pub struct RdevPointer {
        /// Capture pixels per pointer unit.
        scale: f64,
        delay: Duration,
    }

    impl RdevPointer {
        pub fn new(scale: f64) -> Self {
            Self {
                scale,
                // Some platforms drop events sent back to back.
                delay: Duration::from_millis(20),
            }
        }

        fn send(&self, event: EventType) -> Result<()> {
            simulate(&event).map_err(|e| anyhow!("Failed to simulate {:?}: {:?}", event, e))?;
            thread::sleep(self.delay);
            Ok(())
        }
    }

    impl Pointer for RdevPointer {
        fn move_to(&mut self, x: f64, y: f64) -> Result<()> {
            self.send(EventType::MouseMove {
                x: x / self.scale,
                y: y / self.scale,
            })
        }

        fn click(&mut self) -> Result<()> {
            self.send(EventType::ButtonPress(Button::Left))?;
            self.send(EventType::ButtonRelease(Button::Left))
        }

        fn drag_to(&mut self, x: f64, y: f64) -> Result<()> {
            self.send(EventType::ButtonPress(Button::Left))?;
            self.move_to(x, y)?;
            self.send(EventType::ButtonRelease(Button::Left))
        }
    }
}
