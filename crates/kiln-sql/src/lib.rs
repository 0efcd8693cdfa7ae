//! kiln-sql - SQL synthesis layer for kiln
//!
//! Pure text generation: ephemeral CTE injection (tokenized with
//! sqlparser-rs), materialization statements, hook wrapping, adapter
//! instructions embedded in scripts, and archive statements.

pub mod archive;
pub mod error;
pub mod inline;
pub mod materialize;
pub mod operation;

pub use archive::{ArchiveSpec, ARCHIVE_COLUMNS, ARCHIVE_DIST_KEY, ARCHIVE_SORT_KEY};
pub use error::{SqlError, SqlResult};
pub use inline::{cte_definition, cte_name, inject_ctes};
pub use materialize::{tmp_name, with_hooks, wrap_data_test, ModelStatement, Strategy};
pub use operation::{split_script, Operation, ScriptPart};
