//! DuckDB backend implementation

use crate::backend::{Backend, BackendConnection, QueryResult};
use crate::error::{DbError, DbResult};
use duckdb::types::Value;
use duckdb::Connection;
use kiln_core::DbType;
use std::path::Path;
use std::sync::Mutex;

/// DuckDB backend. Every pooled connection is a clone of one database
/// handle, so in-memory databases are shared across the pool.
pub struct DuckDbBackend {
    root: Mutex<Connection>,
}

impl DuckDbBackend {
    /// Create a new in-memory DuckDB database
    pub fn in_memory() -> DbResult<Self> {
        let conn =
            Connection::open_in_memory().map_err(|e| DbError::ConnectionError(e.to_string()))?;
        Ok(Self {
            root: Mutex::new(conn),
        })
    }

    /// Open a DuckDB database file
    pub fn from_path(path: &Path) -> DbResult<Self> {
        let conn = Connection::open(path).map_err(|e| DbError::ConnectionError(e.to_string()))?;
        Ok(Self {
            root: Mutex::new(conn),
        })
    }

    /// Create from path string (handles :memory: special case)
    pub fn new(path: &str) -> DbResult<Self> {
        if path == ":memory:" {
            Self::in_memory()
        } else {
            Self::from_path(Path::new(path))
        }
    }
}

impl Backend for DuckDbBackend {
    fn db_type(&self) -> DbType {
        DbType::DuckDb
    }

    fn connect(&self) -> DbResult<Box<dyn BackendConnection>> {
        let root = self.root.lock().unwrap_or_else(|e| e.into_inner());
        let conn = root
            .try_clone()
            .map_err(|e| DbError::ConnectionError(e.to_string()))?;
        Ok(Box::new(DuckDbConnection { conn: Some(conn) }))
    }
}

struct DuckDbConnection {
    conn: Option<Connection>,
}

impl DuckDbConnection {
    fn conn(&self) -> DbResult<&Connection> {
        self.conn
            .as_ref()
            .ok_or_else(|| DbError::Internal("DuckDB connection used after close".to_string()))
    }
}

impl BackendConnection for DuckDbConnection {
    fn execute_batch(&mut self, sql: &str) -> DbResult<()> {
        log::debug!("duckdb: {}", sql.trim());
        self.conn()?.execute_batch(sql)?;
        Ok(())
    }

    fn query(&mut self, sql: &str) -> DbResult<QueryResult> {
        log::debug!("duckdb query: {}", sql.trim());
        let conn = self.conn()?;
        let mut stmt = conn.prepare(sql)?;
        let mut rows = stmt.query([])?;

        let columns: Vec<String> = match rows.as_ref() {
            Some(s) => s.column_names(),
            None => Vec::new(),
        };

        let mut result = QueryResult {
            columns,
            rows: Vec::new(),
        };
        while let Some(row) = rows.next()? {
            let mut values = Vec::with_capacity(result.columns.len());
            for i in 0..result.columns.len() {
                let value = row.get_ref(i).map(|v| v.to_owned()).unwrap_or(Value::Null);
                values.push(value_to_text(&value));
            }
            result.rows.push(values);
        }
        Ok(result)
    }

    fn close(&mut self) -> DbResult<()> {
        if let Some(conn) = self.conn.take() {
            conn.close().map_err(|(_, e)| DbError::from(e))?;
        }
        Ok(())
    }
}

fn value_to_text(value: &Value) -> Option<String> {
    let text = match value {
        Value::Null => return None,
        Value::Boolean(b) => b.to_string(),
        Value::TinyInt(i) => i.to_string(),
        Value::SmallInt(i) => i.to_string(),
        Value::Int(i) => i.to_string(),
        Value::BigInt(i) => i.to_string(),
        Value::HugeInt(i) => i.to_string(),
        Value::UTinyInt(i) => i.to_string(),
        Value::USmallInt(i) => i.to_string(),
        Value::UInt(i) => i.to_string(),
        Value::UBigInt(i) => i.to_string(),
        Value::Float(f) => f.to_string(),
        Value::Double(f) => f.to_string(),
        Value::Text(s) => s.clone(),
        other => format!("{:?}", other),
    };
    Some(text)
}

#[cfg(test)]
#[path = "duckdb_test.rs"]
mod tests;
