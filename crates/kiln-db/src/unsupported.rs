//! Warehouses kiln can generate SQL for but not yet connect to

use crate::backend::{Backend, BackendConnection};
use crate::error::{DbError, DbResult};
use kiln_core::DbType;

/// Placeholder backend for Postgres, Redshift and Snowflake targets.
///
/// Compilation works against these targets; connecting does not.
pub struct UnsupportedBackend {
    db_type: DbType,
}

impl UnsupportedBackend {
    pub fn new(db_type: DbType) -> Self {
        Self { db_type }
    }
}

impl Backend for UnsupportedBackend {
    fn db_type(&self) -> DbType {
        self.db_type
    }

    fn connect(&self) -> DbResult<Box<dyn BackendConnection>> {
        Err(DbError::NotImplemented {
            backend: self.db_type.to_string(),
            feature: "connections".to_string(),
        })
    }
}
