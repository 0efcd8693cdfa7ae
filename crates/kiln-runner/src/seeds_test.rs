use super::*;
use kiln_db::DuckDbBackend;
use std::fs;
use std::sync::Arc;
use tempfile::TempDir;

fn adapter() -> Adapter {
    Adapter::new(Arc::new(DuckDbBackend::in_memory().unwrap()), 1)
}

fn count(adapter: &Adapter, sql: &str) -> String {
    let mut conn = adapter.acquire("check").unwrap();
    let result = adapter.fetch(&mut conn, sql).unwrap();
    adapter.release(conn);
    result.rows[0][0].clone().unwrap()
}

#[test]
fn test_seeds_load_and_reload() {
    let dir = TempDir::new().unwrap();
    let csv = dir.path().join("countries.csv");
    fs::write(&csv, "code,name\nNZ,New Zealand\nFR,France\n").unwrap();
    let adapter = adapter();

    let results = load_seeds(&adapter, "raw", &[csv.clone()], false).unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].table, "countries");
    assert_eq!(results[0].status, NodeStatus::Success);
    assert_eq!(count(&adapter, "select count(*) from raw.countries"), "2");

    fs::write(&csv, "code,name\nNZ,New Zealand\nFR,France\nJP,Japan\n").unwrap();
    load_seeds(&adapter, "raw", &[csv], false).unwrap();
    assert_eq!(count(&adapter, "select count(*) from raw.countries"), "3");
    assert!(adapter.pool().in_use().is_empty());
}

#[test]
fn test_full_refresh_recreates_the_table() {
    let dir = TempDir::new().unwrap();
    let csv = dir.path().join("people.csv");
    fs::write(&csv, "id\n1\n").unwrap();
    let adapter = adapter();
    load_seeds(&adapter, "raw", &[csv.clone()], false).unwrap();

    fs::write(&csv, "id,name\n1,ann\n2,bob\n").unwrap();
    load_seeds(&adapter, "raw", &[csv], true).unwrap();
    assert_eq!(count(&adapter, "select count(*) from raw.people where name is not null"), "2");
}

#[test]
fn test_broken_file_is_reported_and_others_load() {
    let dir = TempDir::new().unwrap();
    let missing = dir.path().join("ghost.csv");
    let good = dir.path().join("good.csv");
    fs::write(&good, "x\n1\n").unwrap();
    let adapter = adapter();

    let results = load_seeds(&adapter, "raw", &[missing, good], false).unwrap();
    assert_eq!(results[0].status, NodeStatus::Error);
    assert!(results[0].message.is_some());
    assert_eq!(results[1].status, NodeStatus::Success);
    assert_eq!(count(&adapter, "select count(*) from raw.good"), "1");
}
