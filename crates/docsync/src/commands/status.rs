//! Show what is recorded and indexed for one path

use anyhow::Result;
use docsync_index::{RecordStore, VectorIndex, hash_file};
use std::path::Path;

use super::common::{require_existing, resolve_file, resolve_root};
use crate::config::{ConfigArgs, SyncConfig};

pub fn status(file: &Path, path: &Path, args: &ConfigArgs) -> Result<()> {
    let root = resolve_root(path)?;
    let config = SyncConfig::resolve(&root, args)?;
    require_existing(&config)?;

    let target = resolve_file(file)?;
    let key = target.to_string_lossy();
    let records = RecordStore::open(&config.records_path())?;
    let vectors = VectorIndex::open(&config.vectors_path(), config.embedding.dimension)?;

    println!("Path: {}", key);

    match records.get(&key)? {
        Some(record) => {
            println!("  Recorded hash: {}", record.content_hash);
            println!("  Recorded mtime: {:.3}", record.last_modified);

            let state = match hash_file(&target) {
                Ok(current) if current.as_str() == record.content_hash => "up to date",
                Ok(_) => "changed since last sync",
                Err(_) => "missing on disk",
            };
            println!("  State: {}", state);
        }
        None => println!("  Not tracked"),
    }

    match vectors.get(&key)? {
        Some(doc) => {
            println!("  Indexed: yes (at {})", doc.indexed_at);
            if let Some(format) = doc.metadata.get("format") {
                println!("  Format: {}", format);
            }
            println!("  Text length: {} chars", doc.content.chars().count());
        }
        None => println!("  Indexed: no"),
    }

    Ok(())
}
