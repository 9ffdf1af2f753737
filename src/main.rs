mod actuate;
mod board;
mod calibrate;
mod capture;
mod catalog;
mod config;
mod engine;
mod error;
mod fen;
mod game;
mod grid;
mod highlight;
mod matcher;
mod ocr;
mod piece;
mod square;

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::{Arg, ArgAction, ArgMatches, Command, value_parser};

use crate::calibrate::{Calibrator, MarkerSet};
use crate::capture::{ImageFileScreen, Screen};
use crate::catalog::PieceCatalog;
use crate::config::{Config, DEFAULT_CONFIG_PATH};
use crate::game::{Game, Perception};
use crate::matcher::NccMatcher;
use crate::ocr::Recognizer;

fn cli() -> Command {
    Command::new("board-pilot")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Reads a chessboard from the screen and plays engine moves on it")
        .subcommand_required(true)
        .arg(
            Arg::new("config")
                .long("config")
                .value_name("FILE")
                .help("Path to the JSON config")
                .default_value(DEFAULT_CONFIG_PATH)
                .value_parser(value_parser!(PathBuf))
                .global(true),
        )
        .arg(
            Arg::new("assets")
                .long("assets")
                .value_name("DIR")
                .help("Template directory holding markers/ and pieces/ (overrides config)")
                .value_parser(value_parser!(PathBuf))
                .global(true),
        )
        .arg(
            Arg::new("image")
                .long("image")
                .value_name("PNG")
                .help("Read the board from a saved screenshot instead of the screen")
                .value_parser(value_parser!(PathBuf))
                .global(true),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .help("Debug logging (RUST_LOG takes precedence)")
                .action(ArgAction::SetTrue)
                .global(true),
        )
        .arg(
            Arg::new("write-config")
                .long("write-config")
                .help("Write the effective config back to --config before running")
                .action(ArgAction::SetTrue)
                .global(true),
        )
        .subcommand(Command::new("fen").about("Print the FEN of the board on screen"))
        .subcommand(
            Command::new("scan")
                .about("List every recognized piece with its square and screen position")
                .arg(
                    Arg::new("json")
                        .long("json")
                        .help("Print the report as JSON")
                        .action(ArgAction::SetTrue),
                ),
        )
        .subcommand(
            Command::new("check").about("Compare the board on screen with the starting position"),
        )
        .subcommand(Command::new("play").about("Play engine moves until the game ends"))
}

fn main() -> Result<()> {
    let matches = cli().get_matches();

    let level = if matches.get_flag("verbose") { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    let config = load_config(&matches)?;
    log::debug!("Effective config: {:?}", config);

    let markers = MarkerSet::load(&config.markers_dir())
        .with_context(|| format!("Failed to load marker templates from {}", config.markers_dir().display()))?;
    let catalog = PieceCatalog::load(&config.pieces_dir())
        .with_context(|| format!("Failed to load piece templates from {}", config.pieces_dir().display()))?;
    log::info!(
        "Loaded {} marker sets and {} piece templates",
        markers.len(),
        catalog.len()
    );

    let calibrator = Calibrator::new(markers, config.marker_confidence, config.grid);
    let perception = Perception {
        calibrator: &calibrator,
        recognizer: Recognizer {
            catalog: &catalog,
            matcher: &NccMatcher,
            scorer: &config.highlight,
            piece_confidence: config.piece_confidence,
            mode: config.scan_mode(),
            cache_dir: config.cache_dir.as_deref(),
        },
    };
    let mut game = Game::new(
        perception,
        config.history_file.clone(),
        Duration::from_millis(config.engine.movetime_ms),
        Duration::from_millis(config.move_delay_ms),
    )?;
    let screen = open_screen(matches.get_one::<PathBuf>("image"))?;

    match matches.subcommand() {
        Some(("fen", _)) => {
            let board = game.observe(screen.as_ref())?;
            println!("{}", board.to_fen());
        }
        Some(("scan", args)) => {
            let board = game.observe(screen.as_ref())?;
            let report = board.piece_report();
            if args.get_flag("json") {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                println!(
                    "Board at ({:.0}, {:.0}), {:?}, {:.1}px squares",
                    board.grid().bounds.top_left.0,
                    board.grid().bounds.top_left.1,
                    board.orientation(),
                    board.unit()
                );
                for entry in &report {
                    println!(
                        "{:>3} {} {} at ({:.0}, {:.0}) size {:.1}",
                        entry.square,
                        entry.color.name(),
                        entry.piece.name(),
                        entry.screen.0,
                        entry.screen.1,
                        entry.size
                    );
                }
            }
        }
        Some(("check", _)) => {
            let board = game.observe(screen.as_ref())?;
            let mismatches = board.state().starting_position_mismatches();
            for mismatch in &mismatches {
                log::error!("{}", mismatch);
            }
            if !mismatches.is_empty() {
                bail!("{} squares differ from the starting position", mismatches.len());
            }
            println!("Starting position recognized on all 64 squares");
        }
        Some(("play", _)) => play(&mut game, screen.as_ref(), &config)?,
        _ => unreachable!("subcommand_required"),
    }
    Ok(())
}

/// Config file plus CLI overrides; `--write-config` saves the result.
fn load_config(matches: &ArgMatches) -> Result<Config> {
    let path = matches
        .get_one::<PathBuf>("config")
        .map(PathBuf::as_path)
        .unwrap_or(Path::new(DEFAULT_CONFIG_PATH));
    let mut config = Config::load_or_default(path)?;
    if let Some(assets) = matches.get_one::<PathBuf>("assets") {
        config.assets_dir = assets.clone();
    }
    if matches.get_flag("write-config") {
        config.save(path)?;
        log::info!("Config written to {}", path.display());
    }
    Ok(config)
}

fn open_screen(image: Option<&PathBuf>) -> Result<Box<dyn Screen>> {
    if let Some(path) = image {
        log::info!("Reading frames from {}", path.display());
        return Ok(Box::new(ImageFileScreen::new(path)));
    }
    #[cfg(feature = "desktop")]
    {
        Ok(Box::new(capture::MonitorScreen))
    }
    #[cfg(not(feature = "desktop"))]
    {
        bail!("Built without the `desktop` feature; pass --image to read a screenshot")
    }
}

#[cfg(feature = "desktop")]
fn play(game: &mut Game<'_>, screen: &dyn Screen, config: &Config) -> Result<()> {
    let mut engine = engine::UciEngine::spawn(&config.engine.path, &config.engine.args)?;
    let mut pointer = actuate::RdevPointer::new(config.display_scale);
    println!("Playing with {}. Press Ctrl+C to stop.", engine.name());

    let last = game.run(screen, &mut engine, &mut pointer)?;
    println!("Stopped: {:?}", last);
    Ok(())
}

#[cfg(not(feature = "desktop"))]
fn play(_: &mut Game<'_>, _: &dyn Screen, _: &Config) -> Result<()> {
    bail!("`play` needs the `desktop` feature for pointer input")
}
