//! Level-by-level execution with bounded concurrency.
//!
//! Levels run strictly in order. Inside a level every node gets a
//! blocking worker once a semaphore permit is free; the level is a barrier,
//! all its workers are joined before the next one starts. A node that
//! errors marks its descendants to be skipped.

use crate::compiler::Compiler;
use crate::error::{CompileError, RunnerError, RunnerResult};
use crate::hooks::run_hooks;
use crate::introspect::{Introspector, NodeSession};
use crate::results::{NodeStatus, Reporter, RunResult};
use kiln_core::{Graph, LevelMode, Materialization, Node, NodeId, ResourceKind};
use kiln_db::{Adapter, Column, DbError, RelationKind, DEFAULT_CONNECTION};
use kiln_jinja::{HookState, JinjaEnvironment};
use kiln_sql::{tmp_name, ArchiveSpec, ARCHIVE_COLUMNS, ARCHIVE_DIST_KEY, ARCHIVE_SORT_KEY};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tokio::sync::Semaphore;

/// Why a node did not finish
#[derive(Debug)]
pub enum NodeFailure {
    Compile(CompileError),
    Database(DbError),
    /// The node ran but its output was not usable
    Invalid(String),
    /// A runner bug
    Internal(String),
}

impl From<CompileError> for NodeFailure {
    fn from(err: CompileError) -> Self {
        NodeFailure::Compile(err)
    }
}

impl From<DbError> for NodeFailure {
    fn from(err: DbError) -> Self {
        NodeFailure::Database(err)
    }
}

/// What a node that ran reported
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeOutcome {
    Success(String),
    /// Test found this many failing rows
    Fail(u64),
    /// Not executed, and not an error (empty model, existing view)
    Skip(String),
}

type NodeResult = Result<NodeOutcome, NodeFailure>;

/// Runs a selected node set against the warehouse
pub struct Scheduler {
    compiler: Arc<Compiler>,
    adapter: Arc<Adapter>,
    env: Arc<JinjaEnvironment>,
    threads: usize,
    on_run_start: Vec<String>,
    on_run_end: Vec<String>,
    show_progress: bool,
}

impl Scheduler {
    pub fn new(
        compiler: Arc<Compiler>,
        adapter: Arc<Adapter>,
        env: Arc<JinjaEnvironment>,
        threads: usize,
    ) -> Self {
        Self {
            compiler,
            adapter,
            env,
            threads: threads.max(1),
            on_run_start: Vec::new(),
            on_run_end: Vec::new(),
            show_progress: false,
        }
    }

    /// Run-level hooks, executed around every level
    pub fn with_hooks(mut self, on_run_start: Vec<String>, on_run_end: Vec<String>) -> Self {
        self.on_run_start = on_run_start;
        self.on_run_end = on_run_end;
        self
    }

    pub fn show_progress(mut self, show: bool) -> Self {
        self.show_progress = show;
        self
    }

    fn graph(&self) -> Graph {
        self.compiler
            .graph()
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// `selected` plus every ephemeral ancestor, since consumers inline them
    pub fn with_ephemeral_ancestors(graph: &Graph, selected: &BTreeSet<NodeId>) -> BTreeSet<NodeId> {
        let mut expanded = selected.clone();
        for id in selected {
            for ancestor in graph.ancestors(id) {
                if graph.get(&ancestor).is_some_and(Node::is_ephemeral) {
                    expanded.insert(ancestor);
                }
            }
        }
        expanded
    }

    /// Execute `selected` level by level and collect one result per
    /// executed node. Ephemeral models produce no result.
    ///
    /// Only unreachable warehouses, failing run hooks and worker panics
    /// end the run early; node failures are recorded and the run goes on.
    pub async fn run(
        &self,
        selected: &BTreeSet<NodeId>,
        mode: LevelMode,
    ) -> RunnerResult<Vec<RunResult>> {
        let graph = self.graph();
        let expanded = Self::with_ephemeral_ancestors(&graph, selected);
        let levels = graph.topological_levels(&expanded, mode)?;
        let runnable = expanded
            .iter()
            .filter(|id| graph.get(id).is_some_and(|n| !n.is_ephemeral()))
            .count();
        log::info!(
            "Running {} nodes in {} levels with {} threads",
            runnable,
            levels.len(),
            self.threads
        );

        let existing = {
            let adapter = Arc::clone(&self.adapter);
            let env = Arc::clone(&self.env);
            let schema = self.compiler.schema().to_string();
            let hooks = self.on_run_start.clone();
            blocking(move || prepare(&adapter, &env, &schema, &hooks)).await??
        };

        let worker = Worker {
            compiler: Arc::clone(&self.compiler),
            adapter: Arc::clone(&self.adapter),
            existing: Arc::new(existing),
            skip: Arc::new(
                expanded
                    .iter()
                    .map(|id| (id.clone(), AtomicBool::new(false)))
                    .collect(),
            ),
            reporter: Arc::new(Reporter::new(runnable, self.show_progress)),
        };
        let results = Arc::new(Mutex::new(Vec::new()));

        let outcome = self.run_levels(&graph, &levels, &worker, &results).await;
        worker.reporter.finish();
        let outcome = match outcome {
            Ok(()) => {
                let adapter = Arc::clone(&self.adapter);
                let env = Arc::clone(&self.env);
                let hooks = self.on_run_end.clone();
                blocking(move || run_hooks(&adapter, &env, &hooks, HookState::End))
                    .await
                    .and_then(|r| r)
            }
            Err(e) => Err(e),
        };

        let left_open = self.adapter.cleanup();
        if !left_open.is_empty() {
            log::debug!("{} connections still in use after the run", left_open.len());
        }
        outcome?;

        let results = std::mem::take(&mut *results.lock().unwrap_or_else(|p| p.into_inner()));
        Ok(results)
    }

    async fn run_levels(
        &self,
        graph: &Graph,
        levels: &[Vec<NodeId>],
        worker: &Worker,
        results: &Arc<Mutex<Vec<RunResult>>>,
    ) -> RunnerResult<()> {
        let semaphore = Arc::new(Semaphore::new(self.threads));

        for (i, level) in levels.iter().enumerate() {
            log::debug!("Level {} of {}: {} nodes", i + 1, levels.len(), level.len());
            let mut handles = Vec::new();

            for id in level {
                if graph.get(id).is_some_and(Node::is_ephemeral) {
                    continue;
                }
                let permit = Arc::clone(&semaphore)
                    .acquire_owned()
                    .await
                    .map_err(|e| RunnerError::Worker(e.to_string()))?;
                let worker = worker.clone();
                let results = Arc::clone(results);
                let id = id.clone();

                handles.push(tokio::task::spawn_blocking(move || {
                    let _permit = permit;
                    let result = worker.execute(&id)?;
                    results
                        .lock()
                        .unwrap_or_else(|p| p.into_inner())
                        .push(result);
                    Ok::<(), RunnerError>(())
                }));
            }

            // barrier
            let mut fatal = None;
            for handle in handles {
                let outcome = handle
                    .await
                    .map_err(|e| RunnerError::Worker(e.to_string()))
                    .and_then(|r| r);
                if let Err(e) = outcome {
                    fatal.get_or_insert(e);
                }
            }
            if let Some(e) = fatal {
                return Err(e);
            }
        }
        Ok(())
    }
}

async fn blocking<T, F>(f: F) -> RunnerResult<T>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| RunnerError::Worker(e.to_string()))
}

/// Create the target schema, snapshot what already exists in it, and run
/// the start hooks
fn prepare(
    adapter: &Adapter,
    env: &JinjaEnvironment,
    schema: &str,
    on_run_start: &[String],
) -> RunnerResult<BTreeMap<String, RelationKind>> {
    let mut master = adapter
        .acquire(DEFAULT_CONNECTION)
        .map_err(RunnerError::Connection)?;
    let snapshot = adapter
        .create_schema(&mut master, schema)
        .and_then(|()| adapter.query_existing(&mut master, schema))
        .and_then(|existing| master.commit().map(|()| existing));
    adapter.release(master);

    let existing = snapshot.map_err(|source| match source {
        DbError::ConnectionError(_) => RunnerError::Connection(source),
        source => RunnerError::Database {
            context: format!("Failed to prepare schema '{}'", schema),
            source,
        },
    })?;
    log::debug!("{} relations already exist in '{}'", existing.len(), schema);

    run_hooks(adapter, env, on_run_start, HookState::Start)?;
    Ok(existing)
}

/// Everything one node execution needs, cheap to clone into a worker
#[derive(Clone)]
struct Worker {
    compiler: Arc<Compiler>,
    adapter: Arc<Adapter>,
    existing: Arc<BTreeMap<String, RelationKind>>,
    skip: Arc<HashMap<NodeId, AtomicBool>>,
    reporter: Arc<Reporter>,
}

impl Worker {
    fn node(&self, id: &NodeId) -> RunnerResult<Node> {
        let graph = self
            .compiler
            .graph()
            .read()
            .unwrap_or_else(|e| e.into_inner());
        Ok(graph.node(id)?.clone())
    }

    fn is_skipped(&self, id: &NodeId) -> bool {
        self.skip
            .get(id)
            .is_some_and(|flag| flag.load(Ordering::SeqCst))
    }

    /// Mark every selected descendant of `id` to be skipped
    fn skip_descendants(&self, id: &NodeId) {
        let descendants = {
            let graph = self
                .compiler
                .graph()
                .read()
                .unwrap_or_else(|e| e.into_inner());
            graph.descendants(id)
        };
        for descendant in descendants {
            if let Some(flag) = self.skip.get(&descendant) {
                flag.store(true, Ordering::SeqCst);
            }
        }
    }

    fn execute(&self, id: &NodeId) -> RunnerResult<RunResult> {
        let node = self.node(id)?;
        self.reporter.started(node.name());
        let started = Instant::now();

        let result = if self.is_skipped(id) {
            RunResult::new(&node, NodeStatus::Skip, started.elapsed())
                .with_message("an upstream node failed")
        } else if node.empty {
            RunResult::new(&node, NodeStatus::Skip, started.elapsed()).with_message("empty")
        } else {
            let outcome = self.run_node(&node)?;
            // the compiled copy carries the build path
            let node = self.node(id)?;
            self.classify(&node, outcome, started)?
        };

        if result.is_error() {
            self.skip_descendants(id);
        }
        self.reporter.finished(&result);
        Ok(result)
    }

    /// Acquire a connection keyed by unique id, compile, execute, commit,
    /// and always release
    fn run_node(&self, node: &Node) -> RunnerResult<NodeResult> {
        let conn = match self.adapter.acquire(&node.unique_id.to_string()) {
            Ok(conn) => conn,
            Err(e) if e.is_fatal() => return Err(RunnerError::Connection(e)),
            Err(e) => return Ok(Err(NodeFailure::Database(e))),
        };
        let session = Arc::new(NodeSession::new(Arc::clone(&self.adapter), conn));

        let mut outcome = self.compile_and_execute(node, &session);
        if let Some(mut conn) = session.take() {
            if outcome.is_ok() && conn.transaction_open() {
                if let Err(e) = conn.commit() {
                    outcome = Err(NodeFailure::Database(e));
                }
            }
            self.adapter.release(conn);
        }
        Ok(outcome)
    }

    fn compile_and_execute(&self, node: &Node, session: &Arc<NodeSession>) -> NodeResult {
        let introspect: Arc<dyn Introspector> = Arc::clone(session) as Arc<dyn Introspector>;
        let compiled = self.compiler.compile_node(&node.unique_id, &introspect)?;
        match compiled.kind() {
            ResourceKind::Model => self.execute_model(&compiled, session),
            ResourceKind::Test => execute_test(&compiled, session),
            ResourceKind::Archive => execute_archive(&compiled, session),
            ResourceKind::Analysis => Ok(NodeOutcome::Success("compiled".to_string())),
            kind => Err(NodeFailure::Internal(format!(
                "{} nodes cannot be executed",
                kind
            ))),
        }
    }

    fn execute_model(&self, node: &Node, session: &NodeSession) -> NodeResult {
        let schema = self.compiler.schema();
        let name = node.name();
        let sql = wrapped(node)?;
        let existing = self.existing.get(name).copied();
        let non_destructive = self.compiler.options().non_destructive;

        match node.materialization() {
            Materialization::Ephemeral => Ok(NodeOutcome::Skip("ephemeral".to_string())),
            Materialization::View if non_destructive && existing == Some(RelationKind::View) => {
                Ok(NodeOutcome::Skip("view already exists".to_string()))
            }
            Materialization::View | Materialization::Table if non_destructive => {
                session.with(|adapter, conn| {
                    match (node.materialization(), existing) {
                        (Materialization::Table, Some(RelationKind::Table)) => {
                            adapter.truncate(conn, schema, name)?
                        }
                        (_, Some(kind)) => adapter.drop(conn, schema, name, kind)?,
                        (_, None) => {}
                    }
                    adapter.execute_script(conn, sql)
                })?;
                Ok(NodeOutcome::Success(node.materialization().to_string()))
            }
            Materialization::View | Materialization::Table => {
                let tmp = tmp_name(name);
                let kind = match node.materialization() {
                    Materialization::View => RelationKind::View,
                    _ => RelationKind::Table,
                };
                session.with(|adapter, conn| {
                    if let Some(leftover) = self.existing.get(&tmp) {
                        adapter.drop(conn, schema, &tmp, *leftover)?;
                    }
                    adapter.execute_script(conn, sql)?;
                    if let Some(previous) = existing {
                        adapter.drop(conn, schema, name, previous)?;
                    }
                    adapter.rename(conn, schema, &tmp, name, kind)
                })?;
                Ok(NodeOutcome::Success(node.materialization().to_string()))
            }
            Materialization::Incremental => {
                session.with(|adapter, conn| {
                    if existing == Some(RelationKind::View) {
                        adapter.drop(conn, schema, name, RelationKind::View)?;
                    }
                    adapter.execute_script(conn, sql)
                })?;
                Ok(NodeOutcome::Success(node.materialization().to_string()))
            }
        }
    }

    /// Turn a node's outcome into its result. Connection loss is fatal.
    fn classify(&self, node: &Node, outcome: NodeResult, started: Instant) -> RunnerResult<RunResult> {
        let elapsed = started.elapsed();
        let result = match outcome {
            Ok(NodeOutcome::Success(message)) => {
                RunResult::new(node, NodeStatus::Success, elapsed).with_message(message)
            }
            Ok(NodeOutcome::Fail(count)) => RunResult::new(node, NodeStatus::Fail, elapsed)
                .with_failures(count)
                .with_message(format!("{} failing rows", count)),
            Ok(NodeOutcome::Skip(reason)) => {
                RunResult::new(node, NodeStatus::Skip, elapsed).with_message(reason)
            }
            Err(NodeFailure::Database(e)) if e.is_fatal() => return Err(RunnerError::Connection(e)),
            Err(NodeFailure::Database(DbError::AbortedTransaction(message))) => {
                log::warn!(
                    "{} skipped: statement ran in a transaction an earlier error aborted ({})",
                    node.unique_id,
                    message
                );
                RunResult::new(node, NodeStatus::Skip, elapsed).with_message(message)
            }
            Err(NodeFailure::Database(e @ (DbError::Internal(_) | DbError::PoolExhausted { .. })))
            | Err(NodeFailure::Compile(CompileError::Introspection {
                source: e @ (DbError::Internal(_) | DbError::PoolExhausted { .. }),
                ..
            })) => {
                bug_report(node, &e.to_string());
                RunResult::new(node, NodeStatus::Error, elapsed).with_message(e.to_string())
            }
            Err(NodeFailure::Internal(message)) => {
                bug_report(node, &message);
                RunResult::new(node, NodeStatus::Error, elapsed).with_message(message)
            }
            Err(NodeFailure::Compile(e)) => {
                log::debug!("{} failed to compile: {}", node.unique_id, e);
                RunResult::new(node, NodeStatus::Error, elapsed).with_message(e.to_string())
            }
            Err(NodeFailure::Database(e)) => {
                log::debug!("{} failed: {}", node.unique_id, e);
                RunResult::new(node, NodeStatus::Error, elapsed).with_message(e.to_string())
            }
            Err(NodeFailure::Invalid(message)) => {
                RunResult::new(node, NodeStatus::Error, elapsed).with_message(message)
            }
        };
        Ok(result)
    }
}

fn bug_report(node: &Node, message: &str) {
    log::error!(
        "Internal error while running {}: {}. This is a bug in kiln, please report it \
         with the output of `kiln --verbose`.",
        node.unique_id,
        message
    );
}

fn wrapped(node: &Node) -> Result<&str, NodeFailure> {
    node.wrapped_sql
        .as_deref()
        .ok_or_else(|| NodeFailure::Internal(format!("{} was not compiled", node.unique_id)))
}

/// A test query must return exactly one row with one column, the number
/// of failing rows
fn execute_test(node: &Node, session: &NodeSession) -> NodeResult {
    let sql = wrapped(node)?;
    let result = session.with(|adapter, conn| adapter.fetch(conn, sql))?;
    let (1, [row]) = (result.columns.len(), result.rows.as_slice()) else {
        return Err(NodeFailure::Invalid(format!(
            "Bad test {}: returned {} rows and {} columns",
            node.name(),
            result.rows.len(),
            result.columns.len()
        )));
    };
    let value = row.first().cloned().flatten().unwrap_or_default();
    let count = value
        .trim()
        .parse::<f64>()
        .map_err(|_| NodeFailure::Invalid(format!("Bad test {}: count was '{}'", node.name(), value)))?;
    if count > 0.0 {
        Ok(NodeOutcome::Fail(count as u64))
    } else {
        Ok(NodeOutcome::Success("pass".to_string()))
    }
}

/// Type-2 archive of one source table
fn execute_archive(node: &Node, session: &NodeSession) -> NodeResult {
    let target = node.archive.as_ref().ok_or_else(|| {
        NodeFailure::Internal(format!("{} has no archive declaration", node.unique_id))
    })?;
    let spec = ArchiveSpec {
        source_schema: &target.source_schema,
        source_table: &target.source_table,
        target_schema: &target.target_schema,
        target_table: &target.target_table,
        updated_at: &target.updated_at,
        unique_key: &target.unique_key,
    };
    let sql_error = |source| {
        NodeFailure::Compile(CompileError::Sql {
            node: node.unique_id.to_string(),
            source,
        })
    };

    let source_columns = session.with(|adapter, conn| {
        adapter.get_columns(conn, Some(spec.source_schema), spec.source_table)
    })?;
    let source_names: Vec<String> = source_columns.iter().map(|c| c.name.clone()).collect();
    spec.check_source(&source_names).map_err(sql_error)?;

    session.with(|adapter, conn| {
        adapter.create_schema(conn, spec.target_schema)?;
        let mut columns = source_columns.clone();
        columns.extend(
            ARCHIVE_COLUMNS
                .iter()
                .map(|(name, dtype)| Column::new(*name, *dtype, None)),
        );
        adapter.create_table(
            conn,
            spec.target_schema,
            spec.target_table,
            &columns,
            Some(ARCHIVE_SORT_KEY),
            Some(ARCHIVE_DIST_KEY),
        )?;

        let missing = adapter.get_missing_columns(
            conn,
            spec.source_schema,
            spec.source_table,
            spec.target_schema,
            spec.target_table,
        )?;
        let mut dest_columns: Vec<String> = adapter
            .get_columns(conn, Some(spec.target_schema), spec.target_table)?
            .into_iter()
            .map(|c| c.name)
            .collect();
        dest_columns.extend(missing.iter().map(|c| c.name.clone()));
        let missing: Vec<(String, String)> = missing
            .iter()
            .map(|c| (c.name.clone(), c.data_type()))
            .collect();

        let select = spec.select(&source_names);
        adapter.execute_script(conn, &spec.script(&select, &missing, &dest_columns))
    })?;
    Ok(NodeOutcome::Success("archived".to_string()))
}

#[cfg(test)]
#[path = "scheduler_test.rs"]
mod tests;
