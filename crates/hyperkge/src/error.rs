use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur in hyperkge.
#[derive(Error, Debug)]
pub enum Error {
    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    /// JSON serialization error.
    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),
    /// CSV writer error.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    /// Candle tensor error.
    #[error("tensor error: {0}")]
    Tensor(#[from] candle_core::Error),
    /// A split file is absent from the dataset directory.
    #[error("missing data file {path}; please be sure that the file is located in {dir}")]
    DataFileMissing { dir: PathBuf, path: PathBuf },
    /// A split file line is not `head relation tail`.
    #[error("malformed triple at {path}:{line}")]
    MalformedLine { path: PathBuf, line: usize },
    /// Model name outside the supported set.
    #[error("{0} is not a valid model name")]
    UnknownModelName(String),
    /// Entity not present in the index.
    #[error("Entity not found: {0}")]
    UnknownEntity(String),
    /// Relation not present in the index.
    #[error("Relation not found: {0}")]
    UnknownRelation(String),
    /// Forward and reverse rank lists of a relation differ in length.
    #[error(
        "vocabulary mismatch for relation {relation}: {forward} tail rankings vs {reverse} head rankings"
    )]
    VocabularyMismatch {
        relation: String,
        forward: usize,
        reverse: usize,
    },
    /// A relation has no `_reverse` counterpart in the evaluated ranks.
    #[error("relation {0} has no reverse counterpart in the evaluation ranks")]
    MissingReverseRelation(String),
    /// Persisted settings disagree with the re-derived dataset.
    #[error("settings mismatch on {field}: stored {stored}, derived {derived}")]
    SettingsMismatch {
        field: &'static str,
        stored: usize,
        derived: usize,
    },
    /// Invalid configuration.
    #[error("invalid config: {0}")]
    InvalidConfig(String),
}

/// Result type alias for hyperkge.
pub type Result<T> = std::result::Result<T, Error>;
