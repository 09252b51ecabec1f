//! Error types for the command-line front end.

use image_harvest::HarvestError;

/// All errors the CLI can surface before or around a pipeline run.
#[derive(thiserror::Error, Debug)]
pub enum CliError {
    #[error("Harvest error: {0}")]
    Harvest(#[from] HarvestError),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type CliResult<T> = Result<T, CliError>;
