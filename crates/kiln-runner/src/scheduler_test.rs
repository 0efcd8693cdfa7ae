use super::*;
use crate::compiler::CompileOptions;
use kiln_core::project::DATA_TAG;
use kiln_core::DbType;
use kiln_db::{Dialect, QueryResult, RecordingBackend};
use kiln_jinja::{RunContext, TargetContext};
use std::path::PathBuf;
use std::sync::RwLock;
use tempfile::TempDir;

fn model(name: &str, raw: &str, deps: &[&str]) -> Node {
    let mut node = Node::new(
        NodeId::model("shop", name),
        vec!["shop".to_string(), name.to_string()],
        PathBuf::from(format!("{name}.sql")),
        PathBuf::from(format!("models/{name}.sql")),
        raw.to_string(),
    );
    for dep in deps {
        node.add_dependency(NodeId::model("shop", *dep));
    }
    node
}

fn ref_model(name: &str, deps: &[&str]) -> Node {
    let raw = match deps {
        [] => "select 1 as id".to_string(),
        _ => deps
            .iter()
            .map(|d| format!("select * from {{{{ ref('{d}') }}}}"))
            .collect::<Vec<_>>()
            .join(" union all "),
    };
    model(name, &raw, deps)
}

fn data_test(name: &str, on: &str) -> Node {
    let mut node = Node::new(
        NodeId::new(ResourceKind::Test, "shop", name),
        vec!["shop".to_string(), name.to_string()],
        PathBuf::from(format!("{name}.sql")),
        PathBuf::from(format!("tests/{name}.sql")),
        format!("select * from {{{{ ref('{on}') }}}} where id < 0"),
    );
    node.tags.insert(DATA_TAG.to_string());
    node.add_dependency(NodeId::model("shop", on));
    node
}

struct Harness {
    backend: RecordingBackend,
    scheduler: Scheduler,
    _build: TempDir,
}

fn harness(nodes: Vec<Node>, threads: usize) -> Harness {
    let build = TempDir::new().unwrap();
    let backend = RecordingBackend::new(DbType::Postgres);
    let adapter = Arc::new(Adapter::new(Arc::new(backend.clone()), threads));
    let target = TargetContext {
        name: "dev".to_string(),
        db_type: "postgres".to_string(),
        schema: "analytics".to_string(),
        threads,
    };
    let env = Arc::new(JinjaEnvironment::new(&[], RunContext::new(), target).unwrap());
    let graph = Arc::new(RwLock::new(Graph::link(nodes).unwrap()));
    let compiler = Arc::new(Compiler::new(
        graph,
        Arc::clone(&env),
        "analytics",
        Dialect::from(DbType::Postgres),
        build.path().to_path_buf(),
        CompileOptions::default(),
    ));
    Harness {
        backend,
        scheduler: Scheduler::new(compiler, adapter, env, threads),
        _build: build,
    }
}

fn ids(names: &[&str]) -> BTreeSet<NodeId> {
    names.iter().map(|n| NodeId::model("shop", *n)).collect()
}

fn status_of(results: &[RunResult], name: &str) -> NodeStatus {
    results
        .iter()
        .find(|r| r.name == name)
        .unwrap_or_else(|| panic!("no result for {name}"))
        .status
}

fn diamond() -> Vec<Node> {
    vec![
        ref_model("a", &[]),
        ref_model("b", &["a"]),
        ref_model("c", &["a"]),
        ref_model("d", &["b", "c"]),
    ]
}

#[tokio::test]
async fn test_every_node_runs_once_in_dependency_order() {
    let h = harness(diamond(), 2);
    let results = h
        .scheduler
        .run(&ids(&["a", "b", "c", "d"]), LevelMode::Blocking)
        .await
        .unwrap();
    assert_eq!(results.len(), 4);
    assert!(results.iter().all(|r| r.status == NodeStatus::Success));

    let statements = h.backend.statements();
    let position = |needle: &str| {
        statements
            .iter()
            .position(|s| s.contains(needle))
            .unwrap_or_else(|| panic!("{needle} never ran"))
    };
    assert!(position("create view \"analytics\".\"a__kiln_tmp\"") < position("\"b__kiln_tmp\""));
    assert!(position("\"c__kiln_tmp\"") < position("\"d__kiln_tmp\""));
    assert!(h.backend.saw("alter table \"analytics\".\"d__kiln_tmp\" rename to \"d\""));
}

#[tokio::test]
async fn test_same_named_models_in_one_level_get_their_own_connections() {
    let mut vendored = model("users", "select 2 as id", &[]);
    vendored.unique_id = NodeId::model("vendor", "users");
    vendored.fqn = vec!["vendor".to_string(), "users".to_string()];
    let h = harness(vec![model("users", "select 1 as id", &[]), vendored], 2);
    let selected = BTreeSet::from([NodeId::model("shop", "users"), NodeId::model("vendor", "users")]);

    let results = h.scheduler.run(&selected, LevelMode::Blocking).await.unwrap();
    assert_eq!(results.len(), 2);
    assert!(
        results.iter().all(|r| r.status == NodeStatus::Success),
        "{results:?}"
    );
    // one commit for schema preparation, one per model
    assert_eq!(h.backend.statements().iter().filter(|s| *s == "commit").count(), 3);
}

#[tokio::test]
async fn test_failure_skips_every_descendant() {
    let h = harness(diamond(), 2);
    h.backend
        .fail_on("\"a__kiln_tmp\"", DbError::ExecutionError("relation broke".into()));
    let results = h
        .scheduler
        .run(&ids(&["a", "b", "c", "d"]), LevelMode::Blocking)
        .await
        .unwrap();

    assert_eq!(status_of(&results, "a"), NodeStatus::Error);
    for name in ["b", "c", "d"] {
        assert_eq!(status_of(&results, name), NodeStatus::Skip);
        assert!(!h.backend.saw(&format!("\"{name}__kiln_tmp\"")));
    }
    let failed = results.iter().find(|r| r.name == "a").unwrap();
    assert!(failed.message.as_deref().unwrap().contains("relation broke"));
    assert!(failed.build_path.is_some());
}

#[tokio::test]
async fn test_unrelated_branch_keeps_running() {
    let mut nodes = diamond();
    nodes.push(ref_model("solo", &[]));
    let h = harness(nodes, 1);
    h.backend
        .fail_on("\"b__kiln_tmp\"", DbError::ExecutionError("bad column".into()));
    let results = h
        .scheduler
        .run(&ids(&["a", "b", "c", "d", "solo"]), LevelMode::Blocking)
        .await
        .unwrap();
    assert_eq!(status_of(&results, "a"), NodeStatus::Success);
    assert_eq!(status_of(&results, "b"), NodeStatus::Error);
    assert_eq!(status_of(&results, "c"), NodeStatus::Success);
    assert_eq!(status_of(&results, "d"), NodeStatus::Skip);
    assert_eq!(status_of(&results, "solo"), NodeStatus::Success);
}

#[tokio::test]
async fn test_aborted_transaction_is_a_skip_and_does_not_propagate() {
    let h = harness(diamond(), 1);
    h.backend.fail_on(
        "\"a__kiln_tmp\"",
        DbError::AbortedTransaction("current transaction is aborted".into()),
    );
    let results = h
        .scheduler
        .run(&ids(&["a", "b"]), LevelMode::Blocking)
        .await
        .unwrap();
    assert_eq!(status_of(&results, "a"), NodeStatus::Skip);
    assert_eq!(status_of(&results, "b"), NodeStatus::Success);
}

#[tokio::test]
async fn test_lost_connection_aborts_the_run() {
    let h = harness(diamond(), 1);
    h.backend
        .fail_on("\"a__kiln_tmp\"", DbError::ConnectionError("server closed".into()));
    let err = h
        .scheduler
        .run(&ids(&["a", "b"]), LevelMode::Blocking)
        .await
        .unwrap_err();
    assert!(matches!(err, RunnerError::Connection(_)));
    assert!(!h.backend.saw("\"b__kiln_tmp\""));
}

#[tokio::test]
async fn test_compile_error_is_a_node_error() {
    let h = harness(
        vec![
            ref_model("a", &[]),
            model("broken", "select * from {{ ref('nowhere') }}", &[]),
            ref_model("after", &["broken"]),
        ],
        1,
    );
    let results = h
        .scheduler
        .run(&ids(&["a", "broken", "after"]), LevelMode::Blocking)
        .await
        .unwrap();
    assert_eq!(status_of(&results, "a"), NodeStatus::Success);
    assert_eq!(status_of(&results, "broken"), NodeStatus::Error);
    assert_eq!(status_of(&results, "after"), NodeStatus::Skip);
}

#[tokio::test]
async fn test_ephemeral_ancestors_are_inlined_but_not_run() {
    let mut base = ref_model("base", &[]);
    base.config.materialized = Materialization::Ephemeral;
    let h = harness(vec![base, ref_model("top", &["base"])], 1);

    let results = h
        .scheduler
        .run(&ids(&["top"]), LevelMode::Blocking)
        .await
        .unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].name, "top");
    assert!(h.backend.saw("with __kiln__cte__base as ("));
    assert!(!h.backend.saw("\"base__kiln_tmp\""));
}

#[tokio::test]
async fn test_tests_count_failing_rows() {
    let h = harness(
        vec![
            ref_model("orders", &[]),
            data_test("no_negative", "orders"),
        ],
        1,
    );
    h.backend.respond(
        "select count(*) from (",
        QueryResult {
            columns: vec!["count".to_string()],
            rows: vec![vec![Some("3".to_string())]],
        },
    );
    let tests: BTreeSet<NodeId> = [NodeId::new(ResourceKind::Test, "shop", "no_negative")]
        .into_iter()
        .collect();
    let results = h.scheduler.run(&tests, LevelMode::Flat).await.unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].status, NodeStatus::Fail);
    assert_eq!(results[0].failures, Some(3));
}

#[tokio::test]
async fn test_with_wrong_shape_is_an_error() {
    let h = harness(
        vec![
            ref_model("orders", &[]),
            data_test("no_negative", "orders"),
        ],
        1,
    );
    h.backend.respond(
        "select count(*) from (",
        QueryResult {
            columns: vec!["a".to_string(), "b".to_string()],
            rows: vec![vec![Some("0".to_string()), Some("0".to_string())]],
        },
    );
    let tests: BTreeSet<NodeId> = [NodeId::new(ResourceKind::Test, "shop", "no_negative")]
        .into_iter()
        .collect();
    let results = h.scheduler.run(&tests, LevelMode::Flat).await.unwrap();
    assert_eq!(results[0].status, NodeStatus::Error);
    assert!(results[0].message.as_deref().unwrap().contains("Bad test"));
}

#[tokio::test]
async fn test_run_hooks_bracket_the_nodes() {
    let h = harness(vec![ref_model("a", &[])], 1);
    let scheduler = h.scheduler.with_hooks(
        vec!["select 'start {{ state }}'".to_string()],
        vec!["select 'end {{ state }}'".to_string()],
    );
    scheduler
        .run(&ids(&["a"]), LevelMode::Blocking)
        .await
        .unwrap();

    let statements = h.backend.statements();
    let start = statements.iter().position(|s| s == "select 'start start'").unwrap();
    let model = statements
        .iter()
        .position(|s| s.contains("\"a__kiln_tmp\""))
        .unwrap();
    let end = statements.iter().position(|s| s == "select 'end end'").unwrap();
    assert!(start < model && model < end);
    assert!(h.backend.saw("create schema if not exists \"analytics\""));
}

#[tokio::test]
async fn test_empty_models_are_skipped_without_skipping_dependents() {
    let h = harness(
        vec![model("blank", "   ", &[]), ref_model("other", &[])],
        1,
    );
    let results = h
        .scheduler
        .run(&ids(&["blank", "other"]), LevelMode::Blocking)
        .await
        .unwrap();
    assert_eq!(status_of(&results, "blank"), NodeStatus::Skip);
    assert_eq!(status_of(&results, "other"), NodeStatus::Success);
}

#[test]
fn test_ephemeral_ancestors_are_added_to_the_selection() {
    let mut base = ref_model("base", &[]);
    base.config.materialized = Materialization::Ephemeral;
    let graph = Graph::link(vec![
        base,
        ref_model("mid", &["base"]),
        ref_model("top", &["mid"]),
    ])
    .unwrap();
    let expanded = Scheduler::with_ephemeral_ancestors(&graph, &ids(&["top"]));
    assert_eq!(expanded, ids(&["base", "top"]));
}
