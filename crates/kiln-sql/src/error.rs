//! Error types for kiln-sql

use thiserror::Error;

/// SQL synthesis errors
#[derive(Error, Debug)]
pub enum SqlError {
    /// Malformed operation instruction in a script (S001)
    #[error("[S001] Invalid operation instruction on line {line}: {message}")]
    InvalidOperation { line: usize, message: String },

    /// Incremental statement without a filter (S002)
    #[error("[S002] Incremental statements need a non-empty sql_where")]
    MissingIncrementalFilter,

    /// Archive source has no columns (S003)
    #[error("[S003] Source table \"{schema}\".\"{table}\" does not exist")]
    ArchiveSourceMissing { schema: String, table: String },
}

/// Result type alias for SqlError
pub type SqlResult<T> = Result<T, SqlError>;
