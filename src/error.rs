//! Error types for the binning engine

use thiserror::Error;

/// Fatal errors. Any of these aborts the run before output is written.
#[derive(Debug, Error)]
pub enum BinError {
    #[error("Missing required input column: {0}")]
    MissingColumn(String),

    #[error("Invalid binning interval: {0}")]
    InvalidInterval(String),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A single undecodable input record. Never fatal: the record is skipped and
/// surfaced in the run report's skip diagnostics.
#[derive(Debug, Clone, Error)]
#[error("row {row} ({dataset}): {reason}")]
pub struct MalformedRecord {
    /// 1-based line in the input file (header is line 1)
    pub row: usize,
    /// Dataset the record claimed to belong to
    pub dataset: String,
    /// What failed to decode
    pub reason: String,
}
