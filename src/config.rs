//! Config module.
//! Manages I/O for board_config.json (asset paths, thresholds, grid constants, engine).
//! Uses serde for JSON serialization; every field has a default, so a partial
//! file or no file at all is fine.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};

use crate::grid::GridParams;
use crate::highlight::HighlightScorer;
use crate::ocr::ScanMode;

pub const DEFAULT_CONFIG_PATH: &str = "board_config.json";

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Holds `markers/` and `pieces/` template directories.
    pub assets_dir: PathBuf,
    /// Per-square debug samples; `null` disables them.
    pub cache_dir: Option<PathBuf>,
    /// Persisted marker priority; `null` keeps it in memory only.
    pub history_file: Option<PathBuf>,
    pub marker_confidence: f32,
    pub piece_confidence: f32,
    pub highlight: HighlightScorer,
    pub grid: GridParams,
    /// Capture pixels per pointer unit (2.0 on most HiDPI displays).
    pub display_scale: f64,
    pub parallel: bool,
    pub engine: EngineConfig,
    /// Pause after each played move.
    pub move_delay_ms: u64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub path: PathBuf,
    pub args: Vec<String>,
    pub movetime_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            assets_dir: PathBuf::from("assets"),
            cache_dir: Some(PathBuf::from("cache")),
            history_file: Some(PathBuf::from("calibration_history.json")),
            marker_confidence: 0.98,
            piece_confidence: 0.8,
            highlight: HighlightScorer::default(),
            grid: GridParams::default(),
            display_scale: 1.0,
            parallel: true,
            engine: EngineConfig::default(),
            move_delay_ms: 3000,
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("stockfish"),
            args: Vec::new(),
            movetime_ms: 2000,
        }
    }
}

impl Config {
    /// Loads `path`, falling back to defaults when the file does not exist.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if !path.exists() {
            log::debug!("No config at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        let raw = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        let config: Config = serde_json::from_str(&raw)
            .with_context(|| format!("Failed to parse config {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let raw = serde_json::to_string_pretty(self).context("Failed to serialize config")?;
        fs::write(path, raw).with_context(|| format!("Failed to write config {}", path.display()))
    }

    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("marker_confidence", self.marker_confidence),
            ("piece_confidence", self.piece_confidence),
        ] {
            if !(0.0..=1.0).contains(&value) {
                bail!("{} must be within 0..=1, got {}", name, value);
            }
        }
        if !(0.0..=1.0).contains(&self.highlight.tolerance) {
            bail!("highlight tolerance must be within 0..=1, got {}", self.highlight.tolerance);
        }
        if self.grid.unit_divisor <= 0.0 {
            bail!("grid unit_divisor must be positive, got {}", self.grid.unit_divisor);
        }
        if self.display_scale <= 0.0 {
            bail!("display_scale must be positive, got {}", self.display_scale);
        }
        Ok(())
    }

    pub fn markers_dir(&self) -> PathBuf {
        self.assets_dir.join("markers")
    }

    pub fn pieces_dir(&self) -> PathBuf {
        self.assets_dir.join("pieces")
    }

    pub fn scan_mode(&self) -> ScanMode {
        if self.parallel {
            ScanMode::Parallel
        } else {
            ScanMode::Sequential
        }
    }
}
