//! What the compiler may learn about the warehouse

use kiln_db::{Adapter, Column, Connection, DbError, DbResult, RelationKind};
use std::sync::{Arc, Mutex, MutexGuard};

/// Warehouse lookups made while compiling
pub trait Introspector: Send + Sync {
    /// Kind of the relation `schema.table`, if there is one
    fn relation_kind(&self, schema: &str, table: &str) -> DbResult<Option<RelationKind>>;

    fn exists(&self, schema: &str, table: &str) -> DbResult<bool> {
        Ok(self.relation_kind(schema, table)?.is_some())
    }

    /// Whether `schema.table` is a table that rows can be inserted into
    fn table_exists(&self, schema: &str, table: &str) -> DbResult<bool> {
        Ok(self.relation_kind(schema, table)? == Some(RelationKind::Table))
    }

    fn columns(&self, schema: &str, table: &str) -> DbResult<Vec<Column>>;
}

/// No database: nothing exists and nothing has columns
#[derive(Debug, Default, Clone, Copy)]
pub struct Offline;

impl Introspector for Offline {
    fn relation_kind(&self, _schema: &str, _table: &str) -> DbResult<Option<RelationKind>> {
        Ok(None)
    }

    fn columns(&self, _schema: &str, _table: &str) -> DbResult<Vec<Column>> {
        Ok(Vec::new())
    }
}

/// A node's pooled connection, shared between its compile step (through
/// [`Introspector`]) and its execution
pub struct NodeSession {
    adapter: Arc<Adapter>,
    conn: Mutex<Option<Connection>>,
}

impl NodeSession {
    pub fn new(adapter: Arc<Adapter>, conn: Connection) -> Self {
        Self {
            adapter,
            conn: Mutex::new(Some(conn)),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Option<Connection>> {
        self.conn.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Run `f` with the adapter and the session's connection
    pub fn with<T>(
        &self,
        f: impl FnOnce(&Adapter, &mut Connection) -> DbResult<T>,
    ) -> DbResult<T> {
        let mut guard = self.lock();
        let conn = guard
            .as_mut()
            .ok_or_else(|| DbError::Internal("session connection already released".to_string()))?;
        f(&self.adapter, conn)
    }

    /// Take the connection back for release
    pub fn take(&self) -> Option<Connection> {
        self.lock().take()
    }
}

impl Introspector for NodeSession {
    fn relation_kind(&self, schema: &str, table: &str) -> DbResult<Option<RelationKind>> {
        self.with(|adapter, conn| Ok(adapter.query_existing(conn, schema)?.get(table).copied()))
    }

    fn columns(&self, schema: &str, table: &str) -> DbResult<Vec<Column>> {
        self.with(|adapter, conn| adapter.get_columns(conn, Some(schema), table))
    }
}
