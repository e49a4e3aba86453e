//! Paths that are never synchronized.
//!
//! Hidden entries, editor and download temporaries, and the engine's own
//! data directory. Directories are never skipped by name alone: a folder
//! called `build` or `out` in a document tree holds documents like any other.

use ignore::WalkBuilder;
use std::path::{Component, Path, PathBuf};

/// Suffixes of files that are still being written by another program.
const TEMP_SUFFIXES: &[&str] = &["~", ".swp", ".swx", ".tmp", ".part", ".crdownload"];

#[derive(Debug, Clone)]
pub struct Exclusions {
    root: PathBuf,
    data_dir: Option<PathBuf>,
}

impl Exclusions {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            data_dir: None,
        }
    }

    /// Also exclude the directory holding the engine's own databases.
    pub fn with_data_dir(mut self, data_dir: impl Into<PathBuf>) -> Self {
        self.data_dir = Some(data_dir.into());
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Check if a path should be excluded.
    ///
    /// Paths outside the root are always excluded. Only components below the
    /// root are inspected, so a root that itself lives under a hidden
    /// directory still works.
    pub fn is_excluded(&self, path: &Path) -> bool {
        if let Some(data_dir) = &self.data_dir
            && path.starts_with(data_dir)
        {
            return true;
        }

        let Ok(relative) = path.strip_prefix(&self.root) else {
            return true;
        };
        let mut components = relative.components().peekable();
        while let Some(component) = components.next() {
            let Component::Normal(name) = component else {
                continue;
            };
            let name = name.to_string_lossy();
            if name.starts_with('.') {
                return true;
            }
            if components.peek().is_none() && is_temporary(&name) {
                return true;
            }
        }
        false
    }

    /// Regular files below `dir` that pass the rules. Symlinks are not followed.
    pub fn files_under(&self, dir: &Path) -> Vec<PathBuf> {
        let rules = self.clone();
        WalkBuilder::new(dir)
            .standard_filters(false)
            .follow_links(false)
            .filter_entry(move |entry| !rules.is_excluded(entry.path()))
            .build()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_some_and(|t| t.is_file()))
            .map(|e| e.into_path())
            .collect()
    }
}

fn is_temporary(file_name: &str) -> bool {
    TEMP_SUFFIXES.iter().any(|suffix| file_name.ends_with(suffix))
}
