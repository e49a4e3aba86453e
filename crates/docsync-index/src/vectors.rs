//! Local vector index on sqlite-vec.
//!
//! One document per source path: its extracted text, its metadata and a
//! single embedding in a `vec0` table. Writes for a path replace everything
//! previously stored for it.

use crate::schema::{DocumentRecord, SearchHit, init_vector_schema};
use anyhow::{Context, Result, anyhow, bail};
use rusqlite::ffi::sqlite3_auto_extension;
use rusqlite::{Connection, OptionalExtension, params};
use sqlite_vec::sqlite3_vec_init;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, Once, PoisonError};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::debug;

static SQLITE_VEC_INIT: Once = Once::new();

/// Register sqlite-vec as an auto-extension so every connection opened
/// afterwards can create `vec0` tables.
fn init_sqlite_vec() {
    SQLITE_VEC_INIT.call_once(|| {
        // SAFETY: `sqlite3_vec_init` is the extension entry point exported by
        // sqlite-vec with SQLite's loadable-extension signature. The transmute
        // only restores that signature, which the crate declares without
        // parameters. Registration runs once, before connections are opened.
        unsafe {
            sqlite3_auto_extension(Some(std::mem::transmute::<
                *const (),
                unsafe extern "C" fn(
                    *mut rusqlite::ffi::sqlite3,
                    *mut *mut std::os::raw::c_char,
                    *const rusqlite::ffi::sqlite3_api_routines,
                ) -> std::os::raw::c_int,
            >(sqlite3_vec_init as *const ())));
        }
        debug!("sqlite-vec extension registered");
    });
}

fn embedding_bytes(vector: &[f32]) -> Vec<u8> {
    vector.iter().flat_map(|f| f.to_le_bytes()).collect()
}

pub struct VectorIndex {
    conn: Mutex<Connection>,
    db_path: PathBuf,
    dimension: usize,
}

impl VectorIndex {
    pub fn open(path: &Path, dimension: usize) -> Result<Self> {
        init_sqlite_vec();

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create data directory {:?}", parent))?;
        }

        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open vector database at {:?}", path))?;
        conn.execute_batch(
            "PRAGMA journal_mode=WAL;
             PRAGMA synchronous=NORMAL;
             PRAGMA busy_timeout=5000;",
        )?;
        init_vector_schema(&conn, dimension)?;

        Ok(Self {
            conn: Mutex::new(conn),
            db_path: path.to_path_buf(),
            dimension,
        })
    }

    pub fn open_in_memory(dimension: usize) -> Result<Self> {
        init_sqlite_vec();

        let conn = Connection::open_in_memory()?;
        init_vector_schema(&conn, dimension)?;

        Ok(Self {
            conn: Mutex::new(conn),
            db_path: PathBuf::from(":memory:"),
            dimension,
        })
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    fn with_conn<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        let conn = self
            .conn
            .lock()
            .map_err(|e: PoisonError<MutexGuard<Connection>>| {
                anyhow!("Vector database lock poisoned: {}", e)
            })?;
        f(&conn)
    }

    /// Store `content` and its embedding under `path`, replacing any previous
    /// document for that path.
    pub fn upsert(
        &self,
        path: &str,
        content: &str,
        vector: &[f32],
        metadata: &BTreeMap<String, String>,
    ) -> Result<()> {
        if vector.len() != self.dimension {
            bail!(
                "Embedding for {} has dimension {}, index expects {}",
                path,
                vector.len(),
                self.dimension
            );
        }

        let metadata_json = serde_json::to_string(metadata)?;
        let indexed_at = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .context("System time before UNIX epoch")?
            .as_secs() as i64;
        let bytes = embedding_bytes(vector);

        self.with_conn(|conn| {
            conn.execute("BEGIN IMMEDIATE", [])?;

            let result = (|| -> Result<i64> {
                let id = conn.query_row(
                    "INSERT INTO documents (path, content, metadata_json, indexed_at)
                     VALUES (?1, ?2, ?3, ?4)
                     ON CONFLICT(path) DO UPDATE SET
                        content = excluded.content,
                        metadata_json = excluded.metadata_json,
                        indexed_at = excluded.indexed_at
                     RETURNING id",
                    params![path, content, metadata_json, indexed_at],
                    |row| row.get::<_, i64>(0),
                )?;

                // vec0 does not support upserts
                conn.execute("DELETE FROM documents_vec WHERE document_id = ?1", [id])?;
                conn.execute(
                    "INSERT INTO documents_vec (document_id, embedding) VALUES (?1, ?2)",
                    params![id, bytes],
                )?;
                Ok(id)
            })();

            match result {
                Ok(id) => {
                    conn.execute("COMMIT", [])?;
                    debug!("Indexed {} as document {}", path, id);
                    Ok(())
                }
                Err(e) => {
                    let _ = conn.execute("ROLLBACK", []);
                    Err(e.context(format!("Failed to index {}", path)))
                }
            }
        })
    }

    /// Remove the document for `path`. Absent paths are not an error.
    pub fn delete(&self, path: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let id: Option<i64> = conn
                .query_row("SELECT id FROM documents WHERE path = ?1", [path], |row| {
                    row.get(0)
                })
                .optional()?;

            let Some(id) = id else {
                return Ok(false);
            };

            conn.execute("BEGIN IMMEDIATE", [])?;
            let result = (|| -> Result<()> {
                conn.execute("DELETE FROM documents_vec WHERE document_id = ?1", [id])?;
                conn.execute("DELETE FROM documents WHERE id = ?1", [id])?;
                Ok(())
            })();

            match result {
                Ok(()) => {
                    conn.execute("COMMIT", [])?;
                    debug!("Removed document {} ({})", id, path);
                    Ok(true)
                }
                Err(e) => {
                    let _ = conn.execute("ROLLBACK", []);
                    Err(e.context(format!("Failed to remove {}", path)))
                }
            }
        })
    }

    pub fn get(&self, path: &str) -> Result<Option<DocumentRecord>> {
        self.with_conn(|conn| {
            let row = conn
                .query_row(
                    "SELECT path, content, metadata_json, indexed_at FROM documents WHERE path = ?1",
                    [path],
                    |row| {
                        Ok((
                            row.get::<_, String>(0)?,
                            row.get::<_, String>(1)?,
                            row.get::<_, String>(2)?,
                            row.get::<_, i64>(3)?,
                        ))
                    },
                )
                .optional()?;

            row.map(|(path, content, metadata_json, indexed_at)| -> Result<DocumentRecord> {
                let metadata = serde_json::from_str(&metadata_json)
                    .with_context(|| format!("Corrupted metadata for {}", path))?;
                Ok(DocumentRecord {
                    path,
                    content,
                    metadata,
                    indexed_at,
                })
            })
            .transpose()
        })
    }

    pub fn count(&self) -> Result<usize> {
        self.with_conn(|conn| {
            let count: i64 =
                conn.query_row("SELECT COUNT(*) FROM documents", [], |row| row.get(0))?;
            Ok(count as usize)
        })
    }

    pub fn paths(&self) -> Result<Vec<String>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare("SELECT path FROM documents ORDER BY path")?;
            let paths = stmt
                .query_map([], |row| row.get::<_, String>(0))?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(paths)
        })
    }

    /// Nearest documents to `query`, closest first.
    pub fn search(&self, query: &[f32], limit: usize) -> Result<Vec<SearchHit>> {
        if query.len() != self.dimension {
            bail!(
                "Query embedding has dimension {}, index expects {}",
                query.len(),
                self.dimension
            );
        }
        let bytes = embedding_bytes(query);

        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT d.path, v.distance, d.content
                 FROM (
                    SELECT document_id, distance
                    FROM documents_vec
                    WHERE embedding MATCH ?1
                    ORDER BY distance
                    LIMIT ?2
                 ) v
                 JOIN documents d ON d.id = v.document_id
                 ORDER BY v.distance",
            )?;

            let hits = stmt
                .query_map(params![bytes, limit as i64], |row| {
                    Ok(SearchHit {
                        path: row.get(0)?,
                        distance: row.get(1)?,
                        content: row.get(2)?,
                    })
                })?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(hits)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta(source: &str) -> BTreeMap<String, String> {
        BTreeMap::from([("source".to_string(), source.to_string())])
    }

    #[test]
    fn test_upsert_and_get() {
        let index = VectorIndex::open_in_memory(3).unwrap();
        index
            .upsert("/a.txt", "alpha", &[1.0, 0.0, 0.0], &meta("/a.txt"))
            .unwrap();

        let doc = index.get("/a.txt").unwrap().unwrap();
        assert_eq!(doc.content, "alpha");
        assert_eq!(doc.metadata.get("source").map(String::as_str), Some("/a.txt"));
        assert_eq!(index.count().unwrap(), 1);
    }

    #[test]
    fn test_upsert_replaces_document() {
        let index = VectorIndex::open_in_memory(3).unwrap();
        index.upsert("/a.txt", "v1", &[1.0, 0.0, 0.0], &meta("/a.txt")).unwrap();
        index.upsert("/a.txt", "v2", &[0.0, 1.0, 0.0], &meta("/a.txt")).unwrap();

        assert_eq!(index.count().unwrap(), 1);
        assert_eq!(index.get("/a.txt").unwrap().unwrap().content, "v2");

        let hits = index.search(&[0.0, 1.0, 0.0], 5).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].path, "/a.txt");
        assert!(hits[0].distance < 1e-6);
    }

    #[test]
    fn test_wrong_dimension_rejected() {
        let index = VectorIndex::open_in_memory(3).unwrap();
        assert!(index.upsert("/a.txt", "x", &[1.0, 0.0], &meta("/a.txt")).is_err());
        assert!(index.search(&[1.0], 1).is_err());
        assert_eq!(index.count().unwrap(), 0);
    }

    #[test]
    fn test_delete() {
        let index = VectorIndex::open_in_memory(3).unwrap();
        index.upsert("/a.txt", "a", &[1.0, 0.0, 0.0], &meta("/a.txt")).unwrap();

        assert!(index.delete("/a.txt").unwrap());
        assert!(!index.delete("/a.txt").unwrap());
        assert!(index.get("/a.txt").unwrap().is_none());
        assert!(index.search(&[1.0, 0.0, 0.0], 5).unwrap().is_empty());
    }

    #[test]
    fn test_search_orders_by_distance() {
        let index = VectorIndex::open_in_memory(2).unwrap();
        index.upsert("/near", "n", &[1.0, 0.1], &meta("/near")).unwrap();
        index.upsert("/far", "f", &[-1.0, 0.0], &meta("/far")).unwrap();
        index.upsert("/mid", "m", &[0.0, 1.0], &meta("/mid")).unwrap();

        let hits = index.search(&[1.0, 0.0], 2).unwrap();
        let paths: Vec<_> = hits.iter().map(|h| h.path.as_str()).collect();
        assert_eq!(paths, vec!["/near", "/mid"]);
    }

    #[test]
    fn test_dimension_mismatch_on_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join("vectors.db");
        {
            let index = VectorIndex::open(&db, 4).unwrap();
            assert_eq!(index.dimension(), 4);
        }
        assert!(VectorIndex::open(&db, 8).is_err());
        assert!(VectorIndex::open(&db, 4).is_ok());
    }

    #[test]
    fn test_paths_sorted() {
        let index = VectorIndex::open_in_memory(1).unwrap();
        index.upsert("/b", "b", &[1.0], &meta("/b")).unwrap();
        index.upsert("/a", "a", &[1.0], &meta("/a")).unwrap();
        assert_eq!(index.paths().unwrap(), vec!["/a", "/b"]);
    }
}
