//! Per-node compilation: render, inline ephemeral CTEs, wrap, persist.
//!
//! Nodes live in a shared graph behind a lock. The lock is only held to
//! read or write back a node, never while a template renders, since
//! rendering resolves refs against the same graph.

use crate::error::{CompileError, CompileResult};
use crate::introspect::Introspector;
use kiln_core::{
    Graph, Materialization, Node, NodeId, RefCall, ResourceKind,
};
use kiln_db::Dialect;
use kiln_jinja::{HostError, JinjaEnvironment, Relation, RenderHost, TemplateColumn};
use kiln_sql::{
    cte_definition, cte_name, inject_ctes, tmp_name, with_hooks, wrap_data_test, ModelStatement,
    Strategy,
};
use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Run-wide switches that change how models are wrapped
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CompileOptions {
    /// Rebuild incremental models from scratch
    pub full_refresh: bool,
    /// Keep existing relations and insert into them
    pub non_destructive: bool,
}

/// Graph shared by the compiler and the scheduler's workers
pub type SharedGraph = Arc<RwLock<Graph>>;

pub struct Compiler {
    graph: SharedGraph,
    env: Arc<JinjaEnvironment>,
    schema: String,
    dialect: Dialect,
    build_dir: PathBuf,
    options: CompileOptions,
}

impl Compiler {
    pub fn new(
        graph: SharedGraph,
        env: Arc<JinjaEnvironment>,
        schema: impl Into<String>,
        dialect: Dialect,
        build_dir: PathBuf,
        options: CompileOptions,
    ) -> Self {
        Self {
            graph,
            env,
            schema: schema.into(),
            dialect,
            build_dir,
            options,
        }
    }

    pub fn graph(&self) -> &SharedGraph {
        &self.graph
    }

    pub fn schema(&self) -> &str {
        &self.schema
    }

    pub fn options(&self) -> CompileOptions {
        self.options
    }

    fn read(&self) -> RwLockReadGuard<'_, Graph> {
        self.graph.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, Graph> {
        self.graph.write().unwrap_or_else(|e| e.into_inner())
    }

    fn snapshot(&self, id: &NodeId) -> CompileResult<Node> {
        Ok(self.read().node(id)?.clone())
    }

    /// Name a model is built under before being swapped into place
    pub fn immediate_name(&self, node: &Node) -> String {
        match node.materialization() {
            Materialization::Incremental | Materialization::Ephemeral => node.name().to_string(),
            _ if self.options.non_destructive => node.name().to_string(),
            _ => tmp_name(node.name()),
        }
    }

    /// The relation `this` refers to while compiling `node`
    fn this(&self, node: &Node) -> Relation {
        match (&node.archive, node.kind()) {
            (Some(target), _) => Relation::new(&target.target_schema, &target.target_table),
            (None, ResourceKind::Model) => Relation::new(&self.schema, self.immediate_name(node)),
            (None, _) => Relation::new(&self.schema, node.name()),
        }
    }

    /// Compile every node in `ids`, in id order
    pub fn compile_all(
        &self,
        ids: &BTreeSet<NodeId>,
        introspect: &Arc<dyn Introspector>,
    ) -> CompileResult<Vec<Node>> {
        ids.iter()
            .map(|id| self.compile_node(id, introspect))
            .collect()
    }

    /// Compile one node to its final statement and write the build
    /// artifact. Ephemeral dependencies are compiled on demand.
    pub fn compile_node(
        &self,
        id: &NodeId,
        introspect: &Arc<dyn Introspector>,
    ) -> CompileResult<Node> {
        self.ensure_rendered(id, introspect)?;
        let injected = self.prepend_ctes(id, introspect)?;
        let mut node = self.snapshot(id)?;

        let wrapped = if node.is_ephemeral() && node.kind() == ResourceKind::Model {
            injected
        } else {
            self.wrap(&node, &injected, introspect.as_ref())?
        };
        node.build_path = Some(self.write_artifact(&node, &wrapped)?);
        node.wrapped_sql = Some(wrapped);
        self.write().write_back(node.clone())?;
        log::debug!("Compiled {}", node.unique_id);
        Ok(node)
    }

    /// Render `id` unless it already has compiled SQL
    fn ensure_rendered(&self, id: &NodeId, introspect: &Arc<dyn Introspector>) -> CompileResult<()> {
        let mut node = self.snapshot(id)?;
        if node.compiled_sql.is_some() {
            return Ok(());
        }
        let (compiled, extra_ctes) = self.render(&node, introspect)?;
        node.compiled_sql = Some(compiled);
        node.extra_ctes = extra_ctes;
        self.write().write_back(node)?;
        Ok(())
    }

    fn render(
        &self,
        node: &Node,
        introspect: &Arc<dyn Introspector>,
    ) -> CompileResult<(String, Vec<NodeId>)> {
        // archives are generated at run time from the archive declaration
        if node.kind() == ResourceKind::Archive {
            return Ok((node.raw_sql.clone(), Vec::new()));
        }
        let host = Arc::new(CompileHost {
            graph: Arc::clone(&self.graph),
            node: node.name().to_string(),
            dependencies: node.depends_on.nodes.iter().cloned().collect(),
            schema: self.schema.clone(),
            vars: node.config.vars.clone(),
            introspect: Arc::clone(introspect),
            extra_ctes: Mutex::new(Vec::new()),
        });
        let compiled = self
            .env
            .render_node(node, self.this(node), host.clone())
            .map_err(|source| CompileError::Render {
                node: node.unique_id.to_string(),
                source,
            })?;
        Ok((compiled, host.take_extra_ctes()))
    }

    /// Inline the node's ephemeral dependencies as CTEs, depth first.
    ///
    /// A node whose CTEs are already injected is returned as is. Afterwards
    /// `extra_ctes` holds the flattened list in dependency order.
    pub fn prepend_ctes(
        &self,
        id: &NodeId,
        introspect: &Arc<dyn Introspector>,
    ) -> CompileResult<String> {
        let node = self.snapshot(id)?;
        let compiled = node
            .compiled_sql
            .clone()
            .ok_or_else(|| CompileError::Internal(format!("{} has not been rendered", id)))?;
        if node.extra_ctes_injected {
            return Ok(node.injected_sql.unwrap_or(compiled));
        }

        let mut flattened: Vec<NodeId> = Vec::new();
        for cte_id in &node.extra_ctes {
            self.ensure_rendered(cte_id, introspect)?;
            self.prepend_ctes(cte_id, introspect)?;
            let cte_node = self.snapshot(cte_id)?;
            for inner in cte_node.extra_ctes {
                if !flattened.contains(&inner) {
                    flattened.push(inner);
                }
            }
            if !flattened.contains(cte_id) {
                flattened.push(cte_id.clone());
            }
        }

        let definitions = {
            let graph = self.read();
            flattened
                .iter()
                .map(|cte_id| {
                    let cte = graph.node(cte_id)?;
                    Ok(cte_definition(
                        cte.name(),
                        cte.compiled_sql.as_deref().unwrap_or_default(),
                    ))
                })
                .collect::<CompileResult<Vec<String>>>()?
        };
        let injected = inject_ctes(&compiled, &definitions);

        let mut node = node;
        node.extra_ctes = flattened;
        node.extra_ctes_injected = true;
        node.injected_sql = Some(injected.clone());
        self.write().write_back(node)?;
        Ok(injected)
    }

    fn wrap(
        &self,
        node: &Node,
        injected: &str,
        introspect: &dyn Introspector,
    ) -> CompileResult<String> {
        match node.kind() {
            ResourceKind::Test if node.has_tag(kiln_core::project::DATA_TAG) => {
                Ok(wrap_data_test(injected))
            }
            ResourceKind::Model => self.wrap_model(node, injected, introspect),
            _ => Ok(injected.to_string()),
        }
    }

    fn wrap_model(
        &self,
        node: &Node,
        injected: &str,
        introspect: &dyn Introspector,
    ) -> CompileResult<String> {
        let id = node.unique_id.to_string();
        let this = self.this(node);
        let render = |text: &str| {
            self.env
                .render_model_hook(text, this.clone())
                .map_err(|source| CompileError::Render {
                    node: id.clone(),
                    source,
                })
        };
        let introspection = |source| CompileError::Introspection {
            node: id.clone(),
            source,
        };

        let strategy = match node.materialization() {
            Materialization::View => Strategy::View,
            Materialization::Table if self.options.non_destructive => Strategy::NonDestructive,
            Materialization::Table => Strategy::Table,
            Materialization::Incremental => Strategy::Incremental {
                sql_where: render(node.config.sql_where.as_deref().unwrap_or_default())?,
                unique_key: node.config.unique_key.clone(),
            },
            Materialization::Ephemeral => return Ok(injected.to_string()),
        };

        let incremental_shape = matches!(
            strategy,
            Strategy::Incremental { .. } | Strategy::NonDestructive
        );
        // a view of the same name is dropped before the insert, so only a
        // table counts
        let exists = incremental_shape
            && introspect
                .table_exists(&self.schema, node.name())
                .map_err(introspection)?;
        let dest_columns: Vec<String> = if exists {
            introspect
                .columns(&self.schema, node.name())
                .map_err(introspection)?
                .iter()
                .map(|c| c.quoted())
                .collect()
        } else {
            Vec::new()
        };

        let dist = self.dialect.dist_qualifier(node.config.dist.as_deref());
        let sort = self
            .dialect
            .sort_qualifier(&node.config.sort, node.config.sort_type.as_deref())
            .map_err(introspection)?;

        let statement = ModelStatement {
            strategy,
            schema: &self.schema,
            identifier: &this.table,
            dist: &dist,
            sort: &sort,
            query: injected,
            exists,
            full_refresh: self.options.full_refresh,
            dest_columns: &dest_columns,
        }
        .render()
        .map_err(|source| CompileError::Sql {
            node: id.clone(),
            source,
        })?;

        let pre = node
            .config
            .pre_hook
            .iter()
            .map(|h| render(h))
            .collect::<CompileResult<Vec<_>>>()?;
        let post = node
            .config
            .post_hook
            .iter()
            .map(|h| render(h))
            .collect::<CompileResult<Vec<_>>>()?;
        Ok(with_hooks(&statement, &pre, &post))
    }

    /// `build/<package>/<node path>` under the target directory
    fn write_artifact(&self, node: &Node, sql: &str) -> CompileResult<PathBuf> {
        let path = self.build_dir.join(node.package()).join(&node.path);
        let io = |source| CompileError::Io {
            path: path.display().to_string(),
            source,
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(io)?;
        }
        std::fs::write(&path, sql).map_err(io)?;
        Ok(path)
    }
}

/// Host used while compiling: refs resolve against the linked graph
struct CompileHost {
    graph: SharedGraph,
    node: String,
    dependencies: BTreeSet<NodeId>,
    schema: String,
    vars: BTreeMap<String, serde_json::Value>,
    introspect: Arc<dyn Introspector>,
    extra_ctes: Mutex<Vec<NodeId>>,
}

impl CompileHost {
    fn take_extra_ctes(&self) -> Vec<NodeId> {
        std::mem::take(&mut *self.extra_ctes.lock().unwrap_or_else(|e| e.into_inner()))
    }
}

impl RenderHost for CompileHost {
    fn resolve_ref(&self, call: &RefCall) -> Result<String, HostError> {
        let not_found = || HostError::RefNotFound {
            node: self.node.clone(),
            target: call.name.clone(),
        };
        let (target_id, target_name, ephemeral) = {
            let graph = self.graph.read().unwrap_or_else(|e| e.into_inner());
            let candidates: Vec<&Node> = graph
                .nodes()
                .filter(|n| {
                    n.kind() == ResourceKind::Model
                        && n.name() == call.name
                        && call.package.as_deref().map_or(true, |p| n.package() == p)
                })
                .collect();
            // an unqualified name prefers the model the resolver linked
            let target = candidates
                .iter()
                .find(|n| self.dependencies.contains(&n.unique_id))
                .or_else(|| candidates.first())
                .ok_or_else(not_found)?;
            (
                target.unique_id.clone(),
                target.name().to_string(),
                target.is_ephemeral(),
            )
        };

        if !self.dependencies.contains(&target_id) {
            return Err(HostError::RefOutsideDependencies {
                node: self.node.clone(),
                target: call.name.clone(),
            });
        }

        if ephemeral {
            let mut ctes = self.extra_ctes.lock().unwrap_or_else(|e| e.into_inner());
            if !ctes.contains(&target_id) {
                ctes.push(target_id);
            }
            Ok(cte_name(&target_name))
        } else {
            Ok(Relation::new(&self.schema, target_name).to_string())
        }
    }

    fn resolve_var(
        &self,
        name: &str,
        default: Option<serde_json::Value>,
    ) -> Result<serde_json::Value, HostError> {
        match (self.vars.get(name), default) {
            (Some(serde_json::Value::Null), _) => Err(HostError::NullVar {
                node: self.node.clone(),
                name: name.to_string(),
            }),
            (Some(value), _) => Ok(value.clone()),
            (None, Some(default)) => Ok(default),
            (None, None) => Err(HostError::UndefinedVar {
                node: self.node.clone(),
                name: name.to_string(),
            }),
        }
    }

    fn accept_config(&self, _key: &str, _value: serde_json::Value) -> Result<(), HostError> {
        // captured during parsing
        Ok(())
    }

    fn already_exists(&self, schema: &str, table: &str) -> Result<bool, HostError> {
        self.introspect
            .exists(schema, table)
            .map_err(|e| HostError::Adapter(e.to_string()))
    }

    fn get_columns(&self, schema: &str, table: &str) -> Result<Vec<TemplateColumn>, HostError> {
        Ok(self
            .introspect
            .columns(schema, table)
            .map_err(|e| HostError::Adapter(e.to_string()))?
            .iter()
            .map(|c| TemplateColumn::new(&c.name, c.data_type()))
            .collect())
    }

    fn get_missing_columns(
        &self,
        from_schema: &str,
        from_table: &str,
        to_schema: &str,
        to_table: &str,
    ) -> Result<Vec<TemplateColumn>, HostError> {
        let to: BTreeSet<String> = self
            .get_columns(to_schema, to_table)?
            .into_iter()
            .map(|c| c.name)
            .collect();
        Ok(self
            .get_columns(from_schema, from_table)?
            .into_iter()
            .filter(|c| !to.contains(&c.name))
            .collect())
    }
}

#[cfg(test)]
#[path = "compiler_test.rs"]
mod tests;
