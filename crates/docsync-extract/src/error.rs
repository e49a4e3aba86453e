use std::path::PathBuf;
use thiserror::Error;

/// Extraction failures.
///
/// Only `TooLarge`, `NotFound`, `NotAFile` and `Io` are returned from
/// [`crate::TextExtractor::extract`]; `Parse` is produced by the format readers
/// and converted into placeholder text by the registry.
#[derive(Error, Debug)]
pub enum ExtractError {
    #[error("file too large: {size} bytes (max {max})")]
    TooLarge { size: u64, max: u64 },

    #[error("file not found: {0}")]
    NotFound(PathBuf),

    #[error("not a regular file: {0}")]
    NotAFile(PathBuf),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("parse error: {0}")]
    Parse(String),
}

impl ExtractError {
    pub(crate) fn parse(e: impl std::fmt::Display) -> Self {
        Self::Parse(e.to_string())
    }
}
