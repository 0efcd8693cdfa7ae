//! Error types for kiln-db

use thiserror::Error;

/// Adapter errors, classified so callers can react to the kind of failure
/// rather than to driver message text
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DbError {
    /// Connection error (D001)
    #[error("[D001] Database connection failed: {0}")]
    ConnectionError(String),

    /// Query execution error (D002)
    #[error("[D002] SQL execution failed: {0}")]
    ExecutionError(String),

    /// A statement ran inside a transaction an earlier statement already
    /// broke (D003)
    #[error("[D003] Current transaction is aborted: {0}")]
    AbortedTransaction(String),

    /// More connections requested than the pool allows (D004)
    #[error("[D004] Tried to request a new connection '{name}' but the maximum number of connections are already allocated ({max})!")]
    PoolExhausted { name: String, max: usize },

    /// Internal error (D005)
    #[error("[D005] Internal database error: {0}")]
    Internal(String),

    /// Not implemented (D006)
    #[error("[D006] Feature not implemented for {backend}: {feature}")]
    NotImplemented { backend: String, feature: String },

    /// Invalid begin/commit/rollback for the connection's state (D007)
    #[error("[D007] Tried to {action} on connection '{name}' {reason}")]
    TransactionState {
        name: String,
        action: String,
        reason: String,
    },

    /// IO error (D008)
    #[error("[D008] IO error: {0}")]
    IoError(String),
}

/// Result type alias for DbError
pub type DbResult<T> = Result<T, DbError>;

impl DbError {
    /// Classify a driver message
    pub fn from_message(msg: impl Into<String>) -> Self {
        let msg = msg.into();
        let lower = msg.to_lowercase();
        if lower.contains("current transaction is aborted")
            || lower.contains("commands ignored until end of transaction block")
        {
            DbError::AbortedTransaction(msg)
        } else {
            DbError::ExecutionError(msg)
        }
    }

    /// Errors that mean the run cannot continue, as opposed to one node failing
    pub fn is_fatal(&self) -> bool {
        matches!(self, DbError::ConnectionError(_))
    }
}

impl From<duckdb::Error> for DbError {
    fn from(err: duckdb::Error) -> Self {
        // duckdb::Error does not expose structured variants
        DbError::from_message(err.to_string())
    }
}

impl From<std::io::Error> for DbError {
    fn from(err: std::io::Error) -> Self {
        DbError::IoError(err.to_string())
    }
}

impl From<kiln_sql::SqlError> for DbError {
    fn from(err: kiln_sql::SqlError) -> Self {
        DbError::Internal(err.to_string())
    }
}
