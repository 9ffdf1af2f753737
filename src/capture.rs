//! Screen capture module
//! A `Screen` yields a `Frame`: one RGBA snapshot plus the screen position of its
//! top-left pixel. Every square sample of an evaluation cycle is cropped from the
//! same frame, so a board is never read half before and half after a move.
//! Uses `xcap` for live screenshots of the primary display (`desktop` feature).
//! Debug: set env var `DEBUG_CAPTURE=1` to save each frame to `screenshots/debug_frame.png`.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{Context, Result, bail};
use image::{GrayImage, RgbaImage, imageops};

use crate::error::VisionError;

/// Source of screen frames.
pub trait Screen {
    fn capture(&self) -> Result<Frame>;
}

/// A captured screen image anchored at `origin` in screen coordinates.
#[derive(Clone, Debug)]
pub struct Frame {
    image: RgbaImage,
    origin: (i32, i32),
}

impl Frame {
    pub fn new(image: RgbaImage, origin: (i32, i32)) -> Self {
        Self { image, origin }
    }

    pub fn image(&self) -> &RgbaImage {
        &self.image
    }

    pub fn origin(&self) -> (i32, i32) {
        self.origin
    }

    pub fn grayscale(&self) -> GrayImage {
        imageops::grayscale(&self.image)
    }

    /// Converts a location inside the frame image to screen coordinates.
    pub fn to_screen(&self, x: u32, y: u32) -> (f64, f64) {
        (
            f64::from(self.origin.0) + f64::from(x),
            f64::from(self.origin.1) + f64::from(y),
        )
    }

    /// Crops the screen rectangle at `(x, y)` with the given size.
    /// Coordinates are rounded to whole pixels.
    pub fn region(&self, x: f64, y: f64, width: f64, height: f64) -> Result<RgbaImage, VisionError> {
        let (lx, ly, w, h) = self.local_rect(x, y, width, height)?;
        Ok(imageops::crop_imm(&self.image, lx, ly, w, h).to_image())
    }

    pub fn contains(&self, x: f64, y: f64, width: f64, height: f64) -> bool {
        self.local_rect(x, y, width, height).is_ok()
    }

    fn local_rect(&self, x: f64, y: f64, width: f64, height: f64) -> Result<(u32, u32, u32, u32), VisionError> {
        let lx = (x - f64::from(self.origin.0)).round() as i64;
        let ly = (y - f64::from(self.origin.1)).round() as i64;
        let w = width.round().max(1.0) as u32;
        let h = height.round().max(1.0) as u32;
        let out_of_frame = VisionError::OutOfFrame {
            x: lx,
            y: ly,
            width: w,
            height: h,
        };
        if lx < 0 || ly < 0 {
            return Err(out_of_frame);
        }
        if lx + i64::from(w) > i64::from(self.image.width())
            || ly + i64::from(h) > i64::from(self.image.height())
        {
            return Err(out_of_frame);
        }
        Ok((lx as u32, ly as u32, w, h))
    }
}

/// Replays a saved screenshot, for offline recognition and debugging.
pub struct ImageFileScreen {
    path: PathBuf,
}

impl ImageFileScreen {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl Screen for ImageFileScreen {
    fn capture(&self) -> Result<Frame> {
        let image = image::open(&self.path)
            .with_context(|| format!("Failed to open screenshot: {}", self.path.display()))?
            .to_rgba8();
        if image.dimensions() == (0, 0) {
            bail!("Screenshot {} is empty", self.path.display());
        }
        Ok(Frame::new(image, (0, 0)))
    }
}

/// Live capture of the primary monitor.
/// Permissions note: On macOS, grant "Screen & System Audio Recording" permission to the terminal in System Settings > Privacy & Security.
#[cfg(feature = "desktop")]
pub struct MonitorScreen;

#[cfg(feature = "desktop")]
impl Screen for MonitorScreen {
    fn capture(&self) -> Result<Frame> {
        let start = Instant::now();

        let monitors = xcap::Monitor::all().context("Failed to enumerate monitors")?;
        let primary_monitor = monitors.first().cloned().context("No monitors found")?;

        let screenshot = primary_monitor
            .capture_image()
            .context("Failed to capture image. On macOS, ensure the terminal has Screen Recording permission in System Settings > Privacy & Security > Screen & System Audio Recording")?;

        if screenshot.dimensions() == (0, 0) {
            bail!("Captured empty screenshot - possible permission issue or no display");
        }

        let origin = (
            primary_monitor.x().context("Failed to read monitor position")?,
            primary_monitor.y().context("Failed to read monitor position")?,
        );
        let frame = Frame::new(screenshot, origin);
        save_debug_frame(&frame)?;

        log::debug!("Capture latency: {:?}", start.elapsed());
        Ok(frame)
    }
}

/// Writes the frame to `screenshots/debug_frame.png` when `DEBUG_CAPTURE` is set.
pub fn save_debug_frame(frame: &Frame) -> Result<()> {
    if env::var_os("DEBUG_CAPTURE").is_none() {
        return Ok(());
    }
    let dir = Path::new("screenshots");
    fs::create_dir_all(dir).context("Failed to create screenshots/ debug directory")?;
    let start = Instant::now();
    frame
        .image()
        .save(dir.join("debug_frame.png"))
        .context("Failed to save debug frame to screenshots/")?;
    log::debug!("Debug frame written in {:?}", start.elapsed());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    fn frame() -> Frame {
        let image = RgbaImage::from_fn(40, 30, |x, y| Rgba([x as u8, y as u8, 0, 255]));
        Frame::new(image, (100, 50))
    }

    #[test]
    fn test_region_uses_screen_coordinates() {
        let region = frame().region(110.0, 60.0, 5.0, 4.0).unwrap();
        assert_eq!(region.dimensions(), (5, 4));
        assert_eq!(region.get_pixel(0, 0), &Rgba([10, 10, 0, 255]));
    }

    #[test]
    fn test_region_outside_frame_is_rejected() {
        let f = frame();
        assert!(matches!(
            f.region(95.0, 60.0, 5.0, 5.0),
            Err(VisionError::OutOfFrame { .. })
        ));
        assert!(f.region(130.0, 60.0, 20.0, 5.0).is_err());
        assert!(f.contains(100.0, 50.0, 40.0, 30.0));
        assert!(!f.contains(100.0, 50.0, 41.0, 30.0));
    }

    #[test]
    fn test_to_screen_adds_origin() {
        assert_eq!(frame().to_screen(3, 4), (103.0, 54.0));
    }

    #[test]
    fn test_image_file_screen_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("shot.png");
        frame().image().save(&path).unwrap();

        let captured = ImageFileScreen::new(&path).capture().unwrap();
        assert_eq!(captured.image().dimensions(), (40, 30));
        assert_eq!(captured.origin(), (0, 0));
    }

    #[test]
    fn test_image_file_screen_missing_file() {
        assert!(ImageFileScreen::new("does/not/exist.png").capture().is_err());
    }

    #[test]
    #[cfg(feature = "desktop")]
    #[ignore = "requires graphical display and screen recording permissions"]
    fn test_capture_dimensions() {
        let frame = MonitorScreen.capture().expect("capture failed");
        let (w, h) = frame.image().dimensions();
        assert!(w > 0 && h > 0, "captured image has invalid dimensions {}x{}", w, h);
    }
}
