//! Record operations for RecordStore.

use super::RecordStore;
use crate::schema::ChangeRecord;
use anyhow::{Context, Result};
use rusqlite::{OptionalExtension, params};
use std::path::MAIN_SEPARATOR;
use tracing::debug;

impl RecordStore {
    /// Look up the record for an exact path.
    pub fn get(&self, path: &str) -> Result<Option<ChangeRecord>> {
        self.with_conn(|conn| {
            let record = conn
                .query_row(
                    "SELECT path, last_modified, content_hash FROM records WHERE path = ?1",
                    [path],
                    |row| {
                        Ok(ChangeRecord {
                            path: row.get(0)?,
                            last_modified: row.get(1)?,
                            content_hash: row.get(2)?,
                        })
                    },
                )
                .optional()
                .with_context(|| format!("Failed to read record for {}", path))?;
            Ok(record)
        })
    }

    /// Insert or replace the record for `path`.
    pub fn upsert(&self, path: &str, last_modified: f64, content_hash: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO records (path, last_modified, content_hash)
                 VALUES (?1, ?2, ?3)
                 ON CONFLICT(path) DO UPDATE SET
                    last_modified = excluded.last_modified,
                    content_hash = excluded.content_hash",
                params![path, last_modified, content_hash],
            )
            .with_context(|| format!("Failed to write record for {}", path))?;
            debug!("Recorded {} ({})", path, content_hash);
            Ok(())
        })
    }

    /// Remove the record for `path`. Returns whether a row existed.
    pub fn delete(&self, path: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let removed = conn
                .execute("DELETE FROM records WHERE path = ?1", [path])
                .with_context(|| format!("Failed to delete record for {}", path))?;
            Ok(removed > 0)
        })
    }

    pub fn count(&self) -> Result<usize> {
        self.with_conn(|conn| {
            let count: i64 = conn.query_row("SELECT COUNT(*) FROM records", [], |row| row.get(0))?;
            Ok(count as usize)
        })
    }

    /// Every tracked path strictly below directory `dir`, in path order.
    pub fn paths_under(&self, dir: &str) -> Result<Vec<String>> {
        let base = dir.trim_end_matches(MAIN_SEPARATOR);
        // Paths below `base` sort between "base/" and "base0" ('0' follows '/')
        let lower = format!("{}{}", base, MAIN_SEPARATOR);
        let upper = format!("{}{}", base, char::from(MAIN_SEPARATOR as u8 + 1));

        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT path FROM records WHERE path >= ?1 AND path < ?2 ORDER BY path",
            )?;
            let paths = stmt
                .query_map(params![lower, upper], |row| row.get::<_, String>(0))?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(paths)
        })
    }

    /// Every tracked path, in path order.
    pub fn all_paths(&self) -> Result<Vec<String>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare("SELECT path FROM records ORDER BY path")?;
            let paths = stmt
                .query_map([], |row| row.get::<_, String>(0))?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(paths)
        })
    }
}
