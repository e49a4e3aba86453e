//! Shared setup for CLI commands

use anyhow::{Context, Result};
use docsync_embeddings::create_embedding_model;
use docsync_extract::TextExtractor;
use docsync_index::{Exclusions, LocalIndexClient, RecordStore, SyncEngine, VectorIndex};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

use crate::config::SyncConfig;

/// Resolve the watch root to an absolute, canonical directory path.
///
/// Record keys are canonical paths, so the root has to be canonical too or
/// prefix queries would miss.
pub fn resolve_root(path: &Path) -> Result<PathBuf> {
    let root = path
        .canonicalize()
        .with_context(|| format!("Cannot access {:?}", path))?;
    if !root.is_dir() {
        anyhow::bail!("Not a directory: {:?}", root);
    }
    Ok(root)
}

/// Absolute form of a user-supplied file path. Canonical when the file
/// exists; otherwise its parent is canonicalized so deleted files still map
/// to the key they were recorded under.
pub fn resolve_file(path: &Path) -> Result<PathBuf> {
    if let Ok(canonical) = path.canonicalize() {
        return Ok(canonical);
    }
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()?.join(path)
    };
    match (absolute.parent(), absolute.file_name()) {
        (Some(parent), Some(name)) => match parent.canonicalize() {
            Ok(parent) => Ok(parent.join(name)),
            Err(_) => Ok(absolute),
        },
        _ => Ok(absolute),
    }
}

/// Fail early with a hint when a read-only command runs before any sync.
pub fn require_existing(config: &SyncConfig) -> Result<()> {
    if !config.records_path().exists() {
        anyhow::bail!(
            "Database not found: {:?}. Run 'docsync scan' first.",
            config.records_path()
        );
    }
    Ok(())
}

/// Every long-lived handle a syncing command needs.
pub struct Handles {
    pub records: Arc<RecordStore>,
    pub client: Arc<LocalIndexClient>,
    pub engine: Arc<SyncEngine>,
}

pub fn open_handles(config: &SyncConfig) -> Result<Handles> {
    let model = create_embedding_model(Some(config.embedding.clone()))
        .context("Failed to initialize embedding model")?;
    let dimension = model.dimension();
    info!("Embedding model initialized (dim={})", dimension);

    let records = Arc::new(RecordStore::open(&config.records_path())?);
    let vectors = Arc::new(VectorIndex::open(&config.vectors_path(), dimension)?);
    let client = Arc::new(LocalIndexClient::new(model, vectors));

    let extractor = TextExtractor::new().with_max_file_size(config.max_file_size);
    let exclusions = Exclusions::new(&config.root).with_data_dir(&config.data_dir);
    let engine = Arc::new(SyncEngine::new(
        records.clone(),
        client.clone(),
        Arc::new(extractor),
        exclusions,
    ));

    Ok(Handles {
        records,
        client,
        engine,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_root_canonicalizes() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("a");
        std::fs::create_dir(&nested).unwrap();

        let root = resolve_root(&nested.join("..").join("a")).unwrap();
        assert_eq!(root, nested.canonicalize().unwrap());
    }

    #[test]
    fn test_resolve_root_rejects_files() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("f.txt");
        std::fs::write(&file, "x").unwrap();
        assert!(resolve_root(&file).is_err());
        assert!(resolve_root(&dir.path().join("missing")).is_err());
    }

    #[test]
    fn test_resolve_file_missing_keeps_canonical_parent() {
        let dir = tempfile::tempdir().unwrap();
        let gone = dir.path().join("gone.txt");
        assert_eq!(
            resolve_file(&gone).unwrap(),
            dir.path().canonicalize().unwrap().join("gone.txt")
        );
    }
}
