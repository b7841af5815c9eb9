//! CLI error types.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, CliError>;

#[derive(Error, Debug)]
pub enum CliError {
    #[error(transparent)]
    Spout(#[from] spout::SpoutError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to format message: {0}")]
    Format(#[from] serde_json::Error),

    #[error("no API key provided")]
    MissingApiKey,
}
