use anyhow::{Result, bail};
use rusqlite::{Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const SCHEMA_VERSION: i32 = 1;

/// Change record database: one row per tracked path.
pub fn init_records_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS metadata (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS records (
            path TEXT PRIMARY KEY,
            last_modified REAL NOT NULL,
            content_hash TEXT NOT NULL
        );
        "#,
    )?;

    set_schema_version(conn)
}

/// Vector database: document rows plus a vec0 table keyed by document id.
///
/// The embedding dimension is fixed at creation. Reopening with a different
/// dimension fails instead of silently mixing vector sizes.
pub fn init_vector_schema(conn: &Connection, dimension: usize) -> Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS metadata (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS documents (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            path TEXT NOT NULL UNIQUE,
            content TEXT NOT NULL,
            metadata_json TEXT NOT NULL,
            indexed_at INTEGER NOT NULL
        );
        "#,
    )?;

    let stored: Option<String> = conn
        .query_row(
            "SELECT value FROM metadata WHERE key = 'embedding_dimension'",
            [],
            |row| row.get(0),
        )
        .optional()?;

    match stored {
        Some(value) if value != dimension.to_string() => {
            bail!(
                "Vector index was created with dimension {}, requested {}",
                value,
                dimension
            );
        }
        Some(_) => {}
        None => {
            conn.execute(
                "INSERT INTO metadata (key, value) VALUES ('embedding_dimension', ?1)",
                [dimension.to_string()],
            )?;
        }
    }

    conn.execute_batch(&format!(
        r#"
        CREATE VIRTUAL TABLE IF NOT EXISTS documents_vec USING vec0(
            document_id INTEGER PRIMARY KEY,
            embedding float[{dimension}]
        );
        "#
    ))?;

    set_schema_version(conn)
}

fn set_schema_version(conn: &Connection) -> Result<()> {
    conn.execute(
        "INSERT OR REPLACE INTO metadata (key, value) VALUES ('schema_version', ?1)",
        [SCHEMA_VERSION.to_string()],
    )?;
    Ok(())
}

/// What the engine remembers about a path it has indexed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeRecord {
    pub path: String,
    /// Seconds since the Unix epoch, with sub-second precision.
    pub last_modified: f64,
    pub content_hash: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentRecord {
    pub path: String,
    pub content: String,
    pub metadata: BTreeMap<String, String>,
    pub indexed_at: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchHit {
    pub path: String,
    pub distance: f32,
    pub content: String,
}
