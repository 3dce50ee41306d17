//! `tracklib` command-line tool

mod commands;
mod import;
mod logging;
mod settings;

use clap::Parser;
use settings::Settings;
use std::process::ExitCode;

/// Error types for the command-line tool
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    #[error(transparent)]
    Track(#[from] tracklib::TrackError),

    #[error(transparent)]
    Rwgps(#[from] tracklib_rwgps::RwgpsError),

    #[error("GPX parse error: {0}")]
    GpxParse(#[from] gpx::errors::GpxError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, CliError>;

fn main() -> ExitCode {
    logging::setup_logging();
    let settings = Settings::parse();

    let stdout = std::io::stdout();
    match commands::run(settings.command, &mut stdout.lock()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{e}");
            ExitCode::FAILURE
        }
    }
}
