//! Runtime configuration: command-line flags over environment over defaults.

use anyhow::{Context, Result};
use clap::Args;
use docsync_embeddings::EmbeddingConfig;
use docsync_extract::MAX_FILE_SIZE;
use std::path::{Path, PathBuf};
use std::str::FromStr;

pub const DEFAULT_DATA_DIR: &str = ".docsync";
pub const RECORDS_DB: &str = "records.db";
pub const VECTORS_DB: &str = "vectors.db";
pub const DEFAULT_WORKERS: usize = 4;
pub const DEFAULT_QUEUE_CAPACITY: usize = 1024;

/// Flags shared by every command that opens the stores.
#[derive(Args, Debug, Clone, Default)]
pub struct ConfigArgs {
    /// Directory holding the record and vector databases (default: <root>/.docsync)
    #[arg(long)]
    pub data_dir: Option<PathBuf>,

    /// Number of concurrent sync workers
    #[arg(long)]
    pub workers: Option<usize>,

    /// Capacity of the event queue between watcher and workers
    #[arg(long)]
    pub queue_capacity: Option<usize>,

    /// Files larger than this many bytes are not indexed
    #[arg(long)]
    pub max_file_size: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct SyncConfig {
    pub root: PathBuf,
    pub data_dir: PathBuf,
    pub workers: usize,
    pub queue_capacity: usize,
    pub max_file_size: u64,
    pub embedding: EmbeddingConfig,
}

impl SyncConfig {
    pub fn resolve(root: &Path, args: &ConfigArgs) -> Result<Self> {
        let mut config = Self::from_lookup(root, args, |key| std::env::var(key).ok())?;
        config.embedding = EmbeddingConfig::from_env();
        Ok(config)
    }

    fn from_lookup<F>(root: &Path, args: &ConfigArgs, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let data_dir = match args.data_dir.clone() {
            Some(dir) => dir,
            None => lookup("DOCSYNC_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| root.join(DEFAULT_DATA_DIR)),
        };
        let data_dir = if data_dir.is_absolute() {
            data_dir
        } else {
            root.join(data_dir)
        };

        let workers = match args.workers {
            Some(n) => n,
            None => parse_var(&lookup, "DOCSYNC_WORKERS")?.unwrap_or(DEFAULT_WORKERS),
        };
        let queue_capacity = match args.queue_capacity {
            Some(n) => n,
            None => parse_var(&lookup, "DOCSYNC_QUEUE_CAPACITY")?
                .unwrap_or(DEFAULT_QUEUE_CAPACITY),
        };
        let max_file_size = match args.max_file_size {
            Some(n) => n,
            None => parse_var(&lookup, "DOCSYNC_MAX_FILE_SIZE")?.unwrap_or(MAX_FILE_SIZE),
        };

        if workers == 0 {
            anyhow::bail!("At least one worker is required");
        }
        if queue_capacity == 0 {
            anyhow::bail!("Queue capacity must be positive");
        }

        Ok(Self {
            root: root.to_path_buf(),
            data_dir,
            workers,
            queue_capacity,
            max_file_size,
            embedding: EmbeddingConfig::default(),
        })
    }

    pub fn records_path(&self) -> PathBuf {
        self.data_dir.join(RECORDS_DB)
    }

    pub fn vectors_path(&self) -> PathBuf {
        self.data_dir.join(VECTORS_DB)
    }
}

fn parse_var<T, F>(lookup: &F, key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .map(|raw| {
            raw.trim()
                .parse::<T>()
                .with_context(|| format!("Invalid value for {}: {:?}", key, raw))
        })
        .transpose()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = SyncConfig::from_lookup(Path::new("/docs"), &ConfigArgs::default(), env(&[]))
            .unwrap();
        assert_eq!(config.data_dir, PathBuf::from("/docs/.docsync"));
        assert_eq!(config.workers, DEFAULT_WORKERS);
        assert_eq!(config.queue_capacity, DEFAULT_QUEUE_CAPACITY);
        assert_eq!(config.max_file_size, 50 * 1024 * 1024);
        assert_eq!(config.records_path(), PathBuf::from("/docs/.docsync/records.db"));
        assert_eq!(config.vectors_path(), PathBuf::from("/docs/.docsync/vectors.db"));
    }

    #[test]
    fn test_env_overrides_defaults() {
        let lookup = env(&[
            ("DOCSYNC_DATA_DIR", "/var/lib/docsync"),
            ("DOCSYNC_WORKERS", "8"),
            ("DOCSYNC_MAX_FILE_SIZE", " 1024 "),
        ]);
        let config =
            SyncConfig::from_lookup(Path::new("/docs"), &ConfigArgs::default(), lookup).unwrap();
        assert_eq!(config.data_dir, PathBuf::from("/var/lib/docsync"));
        assert_eq!(config.workers, 8);
        assert_eq!(config.max_file_size, 1024);
    }

    #[test]
    fn test_flags_override_env() {
        let args = ConfigArgs {
            data_dir: Some(PathBuf::from("state")),
            workers: Some(2),
            queue_capacity: Some(16),
            max_file_size: None,
        };
        let lookup = env(&[("DOCSYNC_WORKERS", "8"), ("DOCSYNC_DATA_DIR", "/elsewhere")]);
        let config = SyncConfig::from_lookup(Path::new("/docs"), &args, lookup).unwrap();
        // Relative data dirs are taken relative to the root
        assert_eq!(config.data_dir, PathBuf::from("/docs/state"));
        assert_eq!(config.workers, 2);
        assert_eq!(config.queue_capacity, 16);
    }

    #[test]
    fn test_invalid_env_value() {
        let err = SyncConfig::from_lookup(
            Path::new("/docs"),
            &ConfigArgs::default(),
            env(&[("DOCSYNC_WORKERS", "many")]),
        )
        .unwrap_err();
        assert!(err.to_string().contains("DOCSYNC_WORKERS"));
    }

    #[test]
    fn test_zero_workers_rejected() {
        let args = ConfigArgs {
            workers: Some(0),
            ..Default::default()
        };
        assert!(SyncConfig::from_lookup(Path::new("/docs"), &args, env(&[])).is_err());
    }
}
