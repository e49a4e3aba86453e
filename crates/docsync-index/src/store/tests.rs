//! Tests for RecordStore.

use super::*;
use std::path::MAIN_SEPARATOR_STR as SEP;

fn p(parts: &[&str]) -> String {
    format!("{}{}", SEP, parts.join(SEP))
}

#[test]
fn test_get_missing_record() {
    let store = RecordStore::open_in_memory().unwrap();
    assert!(store.get("/nowhere.txt").unwrap().is_none());
}

#[test]
fn test_upsert_and_get() {
    let store = RecordStore::open_in_memory().unwrap();
    store.upsert("/docs/a.txt", 1700000000.25, "abc").unwrap();

    let record = store.get("/docs/a.txt").unwrap().unwrap();
    assert_eq!(record.path, "/docs/a.txt");
    assert_eq!(record.last_modified, 1700000000.25);
    assert_eq!(record.content_hash, "abc");
}

#[test]
fn test_upsert_replaces_existing() {
    let store = RecordStore::open_in_memory().unwrap();
    store.upsert("/docs/a.txt", 1.0, "old").unwrap();
    store.upsert("/docs/a.txt", 2.0, "new").unwrap();

    let record = store.get("/docs/a.txt").unwrap().unwrap();
    assert_eq!(record.last_modified, 2.0);
    assert_eq!(record.content_hash, "new");
    assert_eq!(store.count().unwrap(), 1);
}

#[test]
fn test_delete() {
    let store = RecordStore::open_in_memory().unwrap();
    store.upsert("/docs/a.txt", 1.0, "h").unwrap();

    assert!(store.delete("/docs/a.txt").unwrap());
    assert!(!store.delete("/docs/a.txt").unwrap());
    assert!(store.get("/docs/a.txt").unwrap().is_none());
}

#[test]
fn test_paths_under() {
    let store = RecordStore::open_in_memory().unwrap();
    for path in [
        p(&["docs", "a.txt"]),
        p(&["docs", "sub", "b.txt"]),
        p(&["docs-old", "c.txt"]),
        p(&["docs0.txt"]),
        p(&["other", "d.txt"]),
    ] {
        store.upsert(&path, 1.0, "h").unwrap();
    }

    let under = store.paths_under(&p(&["docs"])).unwrap();
    assert_eq!(under, vec![p(&["docs", "a.txt"]), p(&["docs", "sub", "b.txt"])]);

    // A trailing separator means the same directory
    let with_sep = format!("{}{}", p(&["docs"]), SEP);
    assert_eq!(store.paths_under(&with_sep).unwrap(), under);
}

#[test]
fn test_all_paths_sorted() {
    let store = RecordStore::open_in_memory().unwrap();
    store.upsert("/b", 1.0, "h").unwrap();
    store.upsert("/a", 1.0, "h").unwrap();
    assert_eq!(store.all_paths().unwrap(), vec!["/a", "/b"]);
}

#[test]
fn test_records_survive_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("state").join("records.db");

    {
        let store = RecordStore::open(&db).unwrap();
        store.upsert("/docs/a.txt", 5.5, "h1").unwrap();
    }

    let store = RecordStore::open(&db).unwrap();
    assert_eq!(store.db_path(), db.as_path());
    let record = store.get("/docs/a.txt").unwrap().unwrap();
    assert_eq!(record.content_hash, "h1");
}

#[test]
fn test_schema_version_recorded() {
    let store = RecordStore::open_in_memory().unwrap();
    let version: String = store
        .with_conn(|conn| {
            Ok(conn.query_row(
                "SELECT value FROM metadata WHERE key = 'schema_version'",
                [],
                |row| row.get(0),
            )?)
        })
        .unwrap();
    assert_eq!(version, crate::schema::SCHEMA_VERSION.to_string());
}
