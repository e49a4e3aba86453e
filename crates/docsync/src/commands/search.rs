//! Nearest-document lookup (for checking what the index holds)

use anyhow::Result;
use std::path::Path;

use super::common::{open_handles, require_existing, resolve_root};
use crate::config::{ConfigArgs, SyncConfig};

const SNIPPET_CHARS: usize = 100;

pub fn search(query: &str, limit: usize, path: &Path, args: &ConfigArgs) -> Result<()> {
    let root = resolve_root(path)?;
    let config = SyncConfig::resolve(&root, args)?;
    require_existing(&config)?;

    let handles = open_handles(&config)?;
    let hits = handles.client.search(query, limit)?;

    println!("Search results for '{}'", query);
    println!("Found {} results\n", hits.len());

    for hit in &hits {
        println!("{} (distance: {:.4})", hit.path, hit.distance);
        let snippet: String = hit
            .content
            .chars()
            .take(SNIPPET_CHARS)
            .map(|c| if c.is_whitespace() { ' ' } else { c })
            .collect();
        println!("   {}", snippet.trim());
        println!();
    }

    Ok(())
}
