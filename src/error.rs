//! Error types for the rebalancing bot

use thiserror::Error;

pub type Result<T> = std::result::Result<T, BotError>;

/// Top-level error type. Numerical failures inside the optimizer have their
/// own module-local types and are handled there via documented fallbacks;
/// only caller contract violations and boundary failures surface here.
#[derive(Error, Debug)]
pub enum BotError {
    #[error("configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed data file: {0}")]
    DataFile(#[from] serde_json::Error),

    #[error("no price history for {0}")]
    SeriesNotFound(String),

    #[error("no market snapshot for {0}")]
    SnapshotNotFound(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),
}
