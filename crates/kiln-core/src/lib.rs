//! kiln-core - Core library for kiln
//!
//! Shared node model, project configuration and discovery, the dependency
//! graph store, reference resolution and node selection.

pub mod config;
pub mod error;
pub mod graph;
pub mod graph_file;
pub mod node;
pub mod project;
pub mod resolver;
pub mod selector;

pub use config::{DbType, ProjectConfig, TargetConfig};
pub use error::{CoreError, CoreResult};
pub use graph::{Graph, LevelMode};
pub use node::{
    ArchiveTarget, Materialization, Node, NodeConfig, NodeId, RefCall, ResourceKind,
};
pub use project::{MacroFile, Package, Project};
pub use resolver::process_refs;
pub use selector::{select_nodes, SelectionSpec};
