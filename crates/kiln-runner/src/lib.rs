//! kiln-runner - Compiler and scheduler for kiln
//!
//! Parses and links a project into a graph, compiles nodes on demand
//! (render, inline ephemeral CTEs, wrap in materialization statements)
//! and runs them level by level against an [`kiln_db::Adapter`].

pub mod compiler;
pub mod error;
pub mod hooks;
pub mod introspect;
pub mod parse;
pub mod results;
pub mod scheduler;
pub mod seeds;
pub mod workspace;

pub use compiler::{CompileOptions, Compiler, SharedGraph};
pub use error::{CompileError, CompileResult, RunnerError, RunnerResult};
pub use hooks::run_hooks;
pub use introspect::{Introspector, NodeSession, Offline};
pub use parse::parse_project;
pub use results::{
    write_run_results, NodeStatus, Reporter, RunResult, RunResults, Summary, RUN_RESULTS_FILE,
};
pub use scheduler::{NodeFailure, NodeOutcome, Scheduler};
pub use seeds::{load_seeds, SeedResult};
pub use workspace::Workspace;
