//! `kiln seed`: load CSV files into the target schema

use crate::error::{RunnerError, RunnerResult};
use crate::results::NodeStatus;
use kiln_db::{Adapter, Connection, DbResult, RelationKind, DEFAULT_CONNECTION};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Instant;

/// Outcome of loading one file
#[derive(Debug, Clone, Serialize)]
pub struct SeedResult {
    pub table: String,
    pub path: PathBuf,
    pub status: NodeStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub duration_secs: f64,
}

impl SeedResult {
    pub fn status_line(&self) -> String {
        let millis = (self.duration_secs * 1000.0) as u128;
        match &self.message {
            Some(message) if self.status == NodeStatus::Error => {
                format!("  \u{2717} {} - {} [{}ms]", self.table, message, millis)
            }
            _ => format!("  \u{2713} {} (seed) [{}ms]", self.table, millis),
        }
    }
}

/// Load every file in `files` into `"<schema>"."<file stem>"`.
///
/// With `full_refresh` an existing table is dropped and recreated from the
/// file; otherwise it is truncated and the rows appended, which keeps its
/// column types. A file that fails to load is reported and the rest still
/// load.
pub fn load_seeds(
    adapter: &Adapter,
    schema: &str,
    files: &[PathBuf],
    full_refresh: bool,
) -> RunnerResult<Vec<SeedResult>> {
    let mut conn = adapter
        .acquire(DEFAULT_CONNECTION)
        .map_err(RunnerError::Connection)?;
    let outcome = load_all(adapter, &mut conn, schema, files, full_refresh);
    adapter.release(conn);
    outcome
}

fn load_all(
    adapter: &Adapter,
    conn: &mut Connection,
    schema: &str,
    files: &[PathBuf],
    full_refresh: bool,
) -> RunnerResult<Vec<SeedResult>> {
    let database = |source| RunnerError::Database {
        context: format!("Failed to prepare schema '{}'", schema),
        source,
    };
    adapter.create_schema(conn, schema).map_err(database)?;
    let existing = adapter.query_existing(conn, schema).map_err(database)?;
    conn.commit().map_err(database)?;

    let mut results = Vec::with_capacity(files.len());
    for path in files {
        let table = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let started = Instant::now();
        let loaded = load_one(adapter, conn, schema, &table, path, &existing, full_refresh)
            .and_then(|()| conn.commit());
        let (status, message) = match loaded {
            Ok(()) => (NodeStatus::Success, None),
            Err(e) if e.is_fatal() => return Err(RunnerError::Connection(e)),
            Err(e) => {
                if conn.transaction_open() {
                    if let Err(rollback) = conn.rollback() {
                        log::debug!("Rollback after failed seed {} failed: {}", table, rollback);
                    }
                }
                (NodeStatus::Error, Some(e.to_string()))
            }
        };
        let result = SeedResult {
            table,
            path: path.clone(),
            status,
            message,
            duration_secs: started.elapsed().as_secs_f64(),
        };
        println!("{}", result.status_line());
        results.push(result);
    }
    Ok(results)
}

fn load_one(
    adapter: &Adapter,
    conn: &mut Connection,
    schema: &str,
    table: &str,
    path: &Path,
    existing: &BTreeMap<String, RelationKind>,
    full_refresh: bool,
) -> DbResult<()> {
    match existing.get(table) {
        Some(&kind) if full_refresh || kind == RelationKind::View => {
            log::debug!("Dropping {} \"{}\".\"{}\" before reload", kind.as_str(), schema, table);
            adapter.drop(conn, schema, table, kind)?;
            adapter.load_csv(conn, schema, table, path, false)
        }
        Some(_) => {
            adapter.truncate(conn, schema, table)?;
            adapter.load_csv(conn, schema, table, path, true)
        }
        None => adapter.load_csv(conn, schema, table, path, false),
    }
}

#[cfg(test)]
#[path = "seeds_test.rs"]
mod tests;
