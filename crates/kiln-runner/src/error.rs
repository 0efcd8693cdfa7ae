//! Error types for kiln-runner

use kiln_core::CoreError;
use kiln_db::DbError;
use kiln_jinja::JinjaError;
use kiln_sql::SqlError;
use thiserror::Error;

/// Errors that stop one node from compiling
#[derive(Error, Debug)]
pub enum CompileError {
    /// Template rendering failed (C001)
    #[error("[C001] Compilation error in {node}: {source}")]
    Render {
        node: String,
        #[source]
        source: JinjaError,
    },

    /// Statement synthesis failed (C002)
    #[error("[C002] Compilation error in {node}: {source}")]
    Sql {
        node: String,
        #[source]
        source: SqlError,
    },

    /// Database introspection failed while compiling (C003)
    #[error("[C003] Database error while compiling {node}: {source}")]
    Introspection {
        node: String,
        #[source]
        source: DbError,
    },

    /// Graph or config problem (C004)
    #[error("[C004] {0}")]
    Core(#[from] CoreError),

    /// Build artifact could not be written (C005)
    #[error("[C005] Failed to write {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// A node reached a compile step it cannot take (C006)
    #[error("[C006] Internal compiler error: {0}")]
    Internal(String),
}

/// Result type alias for CompileError
pub type CompileResult<T> = Result<T, CompileError>;

/// Errors that abort a whole run
#[derive(Error, Debug)]
pub enum RunnerError {
    /// Graph-structural or project problem (R001)
    #[error("[R001] {0}")]
    Core(#[from] CoreError),

    /// Compilation failed before any node could run (R002)
    #[error("[R002] {0}")]
    Compile(#[from] CompileError),

    /// The warehouse is unreachable (R003)
    #[error("[R003] {0}")]
    Connection(DbError),

    /// Run setup or a run hook failed (R004)
    #[error("[R004] {context}: {source}")]
    Database {
        context: String,
        #[source]
        source: DbError,
    },

    /// Macros failed to load or a hook failed to render (R005)
    #[error("[R005] Template error: {0}")]
    Template(#[from] JinjaError),

    /// A worker panicked or was cancelled (R006)
    #[error("[R006] Worker failed: {0}")]
    Worker(String),
}

/// Result type alias for RunnerError
pub type RunnerResult<T> = Result<T, RunnerError>;
