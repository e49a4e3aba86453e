//! Show sync statistics

use anyhow::Result;
use docsync_index::{RecordStore, VectorIndex};
use std::path::Path;

use super::common::{require_existing, resolve_root};
use crate::config::{ConfigArgs, SyncConfig};

pub fn stats(path: &Path, args: &ConfigArgs) -> Result<()> {
    let root = resolve_root(path)?;
    let config = SyncConfig::resolve(&root, args)?;
    require_existing(&config)?;

    let records = RecordStore::open(&config.records_path())?;
    let vectors = VectorIndex::open(&config.vectors_path(), config.embedding.dimension)?;

    println!("docsync statistics");
    println!("==================");
    println!("Root: {:?}", config.root);
    println!("Record database: {:?}", records.db_path());
    println!("Vector database: {:?}", vectors.db_path());
    println!();
    println!("  Tracked files: {}", records.count()?);
    println!("  Indexed documents: {}", vectors.count()?);
    println!("  Embedding dimension: {}", vectors.dimension());

    Ok(())
}
