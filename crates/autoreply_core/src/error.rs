use std::io;
use std::time::Duration;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid chunking: overlap {overlap} must be smaller than chunk size {chunk_size}")]
    Overlap { chunk_size: usize, overlap: usize },

    #[error("Invalid chunking: chunk size must be > 0")]
    ZeroChunkSize,

    #[error("Invalid threshold: {0}")]
    Threshold(f32),

    #[error("Invalid duration '{value}': {reason}")]
    Duration { value: String, reason: String },

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Config parse error: {0}")]
    Toml(#[from] toml::de::Error),
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("Invalid argument: {0}")]
    InvalidArg(String),

    #[error("Store lock poisoned")]
    Poisoned,
}

/// Reasons a message could not be scored. Carried by
/// [`MatchOutcome::Unavailable`](crate::model::MatchOutcome::Unavailable) so
/// callers can tell a degraded backend apart from a plain miss.
#[derive(Error, Debug)]
pub enum MatchError {
    #[error("Embedding provider unavailable: {0}")]
    Provider(String),

    #[error("Embedding timed out after {0:?}")]
    Timeout(Duration),

    #[error("QA store unavailable: {0}")]
    Store(#[from] StoreError),
}

pub type Result<T> = std::result::Result<T, StoreError>;
