//! Backend trait definition

use crate::error::DbResult;
use kiln_core::DbType;

/// Rows returned by a query, every value rendered as text
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryResult {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Option<String>>>,
}

/// One physical connection to a warehouse.
///
/// Implementations must be Send so pooled connections can move between
/// worker threads.
pub trait BackendConnection: Send {
    /// Run one or more statements
    fn execute_batch(&mut self, sql: &str) -> DbResult<()>;

    /// Run a query and collect every row
    fn query(&mut self, sql: &str) -> DbResult<QueryResult>;

    /// Drop the physical connection
    fn close(&mut self) -> DbResult<()> {
        Ok(())
    }
}

/// Opens connections to one configured warehouse
pub trait Backend: Send + Sync {
    fn db_type(&self) -> DbType;

    fn connect(&self) -> DbResult<Box<dyn BackendConnection>>;
}
