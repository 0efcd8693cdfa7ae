//! kiln-db - Warehouse adapter for kiln
//!
//! A small synchronous [`Backend`] trait with a DuckDB implementation, a
//! capped connection pool, column metadata with string widening, and the
//! per-dialect SQL fragments the compiler and scheduler need.

pub mod adapter;
pub mod backend;
pub mod column;
pub mod dialect;
pub mod duckdb;
pub mod error;
pub mod pool;
#[cfg(any(test, feature = "test-support"))]
pub mod recording;
pub mod unsupported;

pub use adapter::Adapter;
pub use backend::{Backend, BackendConnection, QueryResult};
pub use column::Column;
pub use dialect::{Dialect, RelationKind};
pub use crate::duckdb::DuckDbBackend;
pub use error::{DbError, DbResult};
pub use pool::{Connection, ConnectionPool, ConnectionState, DEFAULT_CONNECTION};
#[cfg(any(test, feature = "test-support"))]
pub use recording::RecordingBackend;
pub use unsupported::UnsupportedBackend;
