use crate::error::{CliError, Result};
use std::fs::File;
use std::path::PathBuf;
use std::sync::Mutex;
use tracing_subscriber::{
    filter::{LevelFilter, Targets},
    fmt,
    prelude::*,
};

/// Target prefix shared by the library and the binary.
const PIPELINE_TARGET: &str = "hipfold";

/// Maps the `-v` count and `-q` flag to the terminal level.
pub fn level_filter(verbosity: u8, quiet: bool) -> LevelFilter {
    if quiet {
        return LevelFilter::OFF;
    }
    match verbosity {
        0 => LevelFilter::WARN,
        1 => LevelFilter::INFO,
        2 => LevelFilter::DEBUG,
        _ => LevelFilter::TRACE,
    }
}

/// Levels for the terminal and the optional log file.
///
/// The file records pipeline events at `DEBUG` or finer regardless of `-q`,
/// so per-phase diagnostics of a quiet run can still be inspected.
#[derive(Debug, Clone, PartialEq)]
pub struct LogSettings {
    pub terminal: LevelFilter,
    pub file: Option<(PathBuf, LevelFilter)>,
}

impl LogSettings {
    pub fn new(verbosity: u8, quiet: bool, log_file: Option<PathBuf>) -> Self {
        let terminal = level_filter(verbosity, quiet);
        let file_level = level_filter(verbosity, false).max(LevelFilter::DEBUG);
        Self {
            terminal,
            file: log_file.map(|path| (path, file_level)),
        }
    }
}

/// Pipeline events pass at `level`; other crates only at `WARN` or coarser.
fn pipeline_targets(level: LevelFilter) -> Targets {
    Targets::new()
        .with_target(PIPELINE_TARGET, level)
        .with_default(level.min(LevelFilter::WARN))
}

pub fn setup_logging(settings: &LogSettings) -> Result<()> {
    let terminal_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_ansi(true)
        .with_target(false)
        .compact()
        .with_filter(pipeline_targets(settings.terminal));

    let file_layer = match &settings.file {
        Some((path, level)) => {
            let file = File::create(path).map_err(CliError::Io)?;
            Some(
                fmt::layer()
                    .with_writer(Mutex::new(file))
                    .with_ansi(false)
                    .with_target(true)
                    .with_filter(pipeline_targets(*level)),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(terminal_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| CliError::Other(anyhow::anyhow!("Failed to install the logger: {}", e)))
}
