//! Error types for the sync engine and its index backend.

use docsync_embeddings::EmbedError;
use docsync_extract::ExtractError;
use thiserror::Error;

/// Failures of the downstream index (embedding or vector storage).
#[derive(Error, Debug)]
pub enum IndexError {
    #[error("embedding failed: {0}")]
    Embed(#[from] EmbedError),

    #[error("vector index error: {0:#}")]
    Store(anyhow::Error),
}

/// Per-path synchronization failures.
///
/// Everything except `Storage` is contained to the path being processed: the
/// record is left untouched so a later event retries. `Storage` means the
/// record store itself is unusable and the engine can no longer track state.
#[derive(Error, Debug)]
pub enum SyncError {
    #[error("record store unavailable: {0:#}")]
    Storage(anyhow::Error),

    #[error("text extraction failed for {path}: {source}")]
    Extraction {
        path: String,
        #[source]
        source: ExtractError,
    },

    #[error("index backend failed for {path}: {source}")]
    Backend {
        path: String,
        #[source]
        source: IndexError,
    },

    #[error("cannot read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

impl SyncError {
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Storage(_))
    }
}
