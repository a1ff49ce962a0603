use std::path::PathBuf;
use thiserror::Error;

/// Failures reading a CSV export.
#[derive(Debug, Error)]
pub enum FileError {
    #[error("{} does not exist", .0.display())]
    NotFound(PathBuf),

    #[error("{} has no header row", .0.display())]
    MissingHeader(PathBuf),

    #[error("Failed to read CSV: {0}")]
    Read(#[from] csv::Error),

    #[error("CSV files are read by offset, got {0}")]
    UnsupportedCursor(String),
}
