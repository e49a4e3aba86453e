//! One reconciliation pass over the tree

use anyhow::Result;
use docsync_index::ScanReport;
use std::path::Path;
use std::time::Instant;
use tracing::info;

use super::common::{open_handles, resolve_root};
use crate::config::{ConfigArgs, SyncConfig};

pub fn scan(path: &Path, json: bool, args: &ConfigArgs) -> Result<()> {
    let root = resolve_root(path)?;
    let config = SyncConfig::resolve(&root, args)?;

    info!("Scanning: {:?}", config.root);
    info!("Data directory: {:?}", config.data_dir);

    let start = Instant::now();
    let handles = open_handles(&config)?;
    let report = handles.engine.reconcile()?;
    let elapsed = start.elapsed();

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report, handles.records.count()?);
        println!("  Time: {:.2}s", elapsed.as_secs_f64());
    }

    Ok(())
}

fn print_report(report: &ScanReport, tracked: usize) {
    println!("Scan complete");
    println!("=============");
    println!("  Files scanned: {}", report.scanned);
    println!("  Indexed: {}", report.indexed);
    println!("  Unchanged: {}", report.unchanged);
    println!("  Removed: {}", report.removed);
    println!("  Skipped: {}", report.skipped);
    println!("  Errors: {}", report.errors);
    println!("  Tracked files: {}", tracked);
}
