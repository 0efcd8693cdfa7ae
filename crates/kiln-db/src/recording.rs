//! In-memory backend that records statements instead of running them

use crate::backend::{Backend, BackendConnection, QueryResult};
use crate::error::{DbError, DbResult};
use kiln_core::DbType;
use std::sync::{Arc, Mutex};

#[derive(Default)]
struct Script {
    statements: Vec<String>,
    responses: Vec<(String, QueryResult)>,
    failures: Vec<(String, DbError)>,
    connects: usize,
}

/// Backend whose connections log every statement they receive.
///
/// Queries answer with the first registered response whose pattern the
/// SQL contains, or with no rows. Statements containing a failure pattern
/// return that error.
#[derive(Clone)]
pub struct RecordingBackend {
    db_type: DbType,
    script: Arc<Mutex<Script>>,
}

impl RecordingBackend {
    pub fn new(db_type: DbType) -> Self {
        Self {
            db_type,
            script: Arc::new(Mutex::new(Script::default())),
        }
    }

    fn script(&self) -> std::sync::MutexGuard<'_, Script> {
        self.script.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn respond(&self, pattern: impl Into<String>, result: QueryResult) -> &Self {
        self.script().responses.push((pattern.into(), result));
        self
    }

    pub fn fail_on(&self, pattern: impl Into<String>, error: DbError) -> &Self {
        self.script().failures.push((pattern.into(), error));
        self
    }

    /// Every statement and query received so far, in order
    pub fn statements(&self) -> Vec<String> {
        self.script().statements.clone()
    }

    /// Whether any received statement contains `pattern`
    pub fn saw(&self, pattern: &str) -> bool {
        self.script().statements.iter().any(|s| s.contains(pattern))
    }

    /// Number of physical connections opened
    pub fn connects(&self) -> usize {
        self.script().connects
    }
}

impl Backend for RecordingBackend {
    fn db_type(&self) -> DbType {
        self.db_type
    }

    fn connect(&self) -> DbResult<Box<dyn BackendConnection>> {
        self.script().connects += 1;
        Ok(Box::new(RecordingConnection {
            script: Arc::clone(&self.script),
        }))
    }
}

struct RecordingConnection {
    script: Arc<Mutex<Script>>,
}

impl RecordingConnection {
    fn record(&self, sql: &str) -> DbResult<()> {
        let mut script = self.script.lock().unwrap_or_else(|e| e.into_inner());
        script.statements.push(sql.trim().to_string());
        match script.failures.iter().find(|(p, _)| sql.contains(p.as_str())) {
            Some((_, err)) => Err(err.clone()),
            None => Ok(()),
        }
    }
}

impl BackendConnection for RecordingConnection {
    fn execute_batch(&mut self, sql: &str) -> DbResult<()> {
        self.record(sql)
    }

    fn query(&mut self, sql: &str) -> DbResult<QueryResult> {
        self.record(sql)?;
        let script = self.script.lock().unwrap_or_else(|e| e.into_inner());
        Ok(script
            .responses
            .iter()
            .find(|(p, _)| sql.contains(p.as_str()))
            .map(|(_, r)| r.clone())
            .unwrap_or_default())
    }
}
