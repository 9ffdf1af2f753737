//! Error taxonomy for board perception.
//! "Template not found" is never an error here: matchers return `Ok(None)` for it.
//! Everything that is not part of normal per-square scanning lands in `VisionError`.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum VisionError {
    /// Board geometry failed validation. Calibration treats this as recoverable
    /// and moves on to the next marker candidate.
    #[error(
        "invalid board at ({:.1},{:.1})-({:.1},{:.1}): {reason}. Try increasing/decreasing the size of the board on screen",
        .top_left.0, .top_left.1, .bottom_right.0, .bottom_right.1
    )]
    InvalidBoard {
        top_left: (f64, f64),
        bottom_right: (f64, f64),
        reason: &'static str,
    },

    #[error("no board found on screen after trying {tried} marker candidates")]
    NoBoardFound { tried: usize },

    /// The sample is smaller than the template, so the two cannot be compared.
    #[error("template {template_w}x{template_h} does not fit in region {region_w}x{region_h}")]
    TemplateSize {
        template_w: u32,
        template_h: u32,
        region_w: u32,
        region_h: u32,
    },

    #[error("region ({x},{y}) {width}x{height} lies outside the captured frame")]
    OutOfFrame {
        x: i64,
        y: i64,
        width: u32,
        height: u32,
    },

    #[error("template {0} is missing")]
    MissingTemplate(PathBuf),

    #[error("piece catalog in {0} has no usable templates")]
    EmptyCatalog(PathBuf),

    #[error("failed to read or write image {path}")]
    Image {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T, E = VisionError> = std::result::Result<T, E>;
