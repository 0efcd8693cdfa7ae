//! A loaded project ready to compile or run: config, macros, linked graph

use crate::compiler::{CompileOptions, Compiler};
use crate::error::{RunnerError, RunnerResult};
use crate::parse::parse_project;
use kiln_core::graph_file::{read_graph, write_graph};
use kiln_core::{select_nodes, Graph, NodeId, Project, ResourceKind, TargetConfig};
use kiln_db::{Adapter, Dialect};
use kiln_jinja::{JinjaEnvironment, RunContext, TargetContext};
use std::collections::BTreeSet;
use std::path::Path;
use std::sync::{Arc, RwLock};

pub struct Workspace {
    pub project: Project,
    pub target_name: String,
    pub target: TargetConfig,
    pub env: Arc<JinjaEnvironment>,
    pub graph: Graph,
}

impl Workspace {
    /// Load the project at `root`, parse every node and link the graph.
    /// `threads` overrides the target's thread count.
    pub fn load(root: &Path, target: Option<&str>, threads: Option<usize>) -> RunnerResult<Self> {
        let project = Project::load(root)?;
        let (target_name, target_config) = project.config.active_target(target)?;
        let mut target_config = target_config.clone();
        if let Some(threads) = threads {
            target_config.threads = threads;
        }

        let macros = project.load_macros()?;
        let context = TargetContext {
            name: target_name.clone(),
            db_type: target_config.db_type.to_string(),
            schema: target_config.schema.clone(),
            threads: target_config.threads,
        };
        let env = JinjaEnvironment::new(&macros, RunContext::new(), context)?;
        let graph = parse_project(&project, &env, &target_config.schema)?;
        log::debug!(
            "Loaded '{}' for target '{}' ({})",
            project.config.name,
            target_name,
            target_config.db_type
        );

        Ok(Self {
            project,
            target_name,
            target: target_config,
            env: Arc::new(env),
            graph,
        })
    }

    pub fn schema(&self) -> &str {
        &self.target.schema
    }

    pub fn threads(&self) -> usize {
        self.target.threads.max(1)
    }

    /// Selected nodes of the given kinds. `keep` filters further (tags).
    pub fn select(
        &self,
        include: &[String],
        exclude: &[String],
        kinds: &[ResourceKind],
        keep: impl Fn(&kiln_core::Node) -> bool,
    ) -> RunnerResult<BTreeSet<NodeId>> {
        let selected = select_nodes(&self.graph, include, exclude)?;
        Ok(selected
            .into_iter()
            .filter(|id| kinds.contains(&id.kind))
            .filter(|id| self.graph.get(id).is_some_and(&keep))
            .collect())
    }

    /// Save the linked graph to `target/graph.json`
    pub fn write_graph(&self) -> RunnerResult<()> {
        Ok(write_graph(&self.graph, &self.project.graph_path())?)
    }

    /// Replace the in-memory graph with the one saved in `target/graph.json`.
    /// A missing file is an error.
    pub fn reload_graph(&mut self) -> RunnerResult<()> {
        self.graph = read_graph(&self.project.graph_path())?;
        log::debug!("Loaded {} nodes from the graph file", self.graph.len());
        Ok(())
    }

    /// Save the graph and continue from the saved copy
    pub fn persist_graph(&mut self) -> RunnerResult<()> {
        self.write_graph()?;
        self.reload_graph()
    }

    /// A compiler over a fresh copy of the graph
    pub fn compiler(&self, options: CompileOptions) -> Compiler {
        Compiler::new(
            Arc::new(RwLock::new(self.graph.clone())),
            Arc::clone(&self.env),
            self.schema(),
            Dialect::from(self.target.db_type),
            self.project.build_dir(),
            options,
        )
    }

    /// Adapter for the active target, pooled for this workspace's threads
    pub fn adapter(&self) -> RunnerResult<Arc<Adapter>> {
        let adapter = Adapter::for_target(&self.target, self.threads(), &self.project.root)
            .map_err(RunnerError::Connection)?;
        Ok(Arc::new(adapter))
    }
}

#[cfg(test)]
#[path = "workspace_test.rs"]
mod tests;
