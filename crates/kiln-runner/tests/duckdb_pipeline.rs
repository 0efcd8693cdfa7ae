//! End-to-end runs against a DuckDB file: seed, build models, test, archive

use kiln_core::schema_test::SCHEMA_TAG;
use kiln_core::{LevelMode, ResourceKind};
use kiln_db::{Adapter, RelationKind, DEFAULT_CONNECTION};
use kiln_runner::{
    load_seeds, CompileOptions, NodeStatus, RunResult, Scheduler, Workspace,
};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

fn write(root: &Path, rel: &str, contents: &str) {
    let path = root.join(rel);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, contents).unwrap();
}

const ORDERS: &str = "id,amount,status\n1,10,placed\n2,20,shipped\n3,150,placed\n";
const MORE_ORDERS: &str =
    "id,amount,status\n1,10,placed\n2,20,shipped\n3,150,placed\n4,40,placed\n5,50,shipped\n";

fn project() -> TempDir {
    let dir = TempDir::new().unwrap();
    let root = dir.path();
    write(
        root,
        "kiln_project.yml",
        r#"
name: shop
targets:
  dev:
    type: duckdb
    path: warehouse.duckdb
    schema: analytics
    threads: 1
models:
  shop:
    materialized: table
    events_incr:
      materialized: incremental
      sql_where: "id > (select coalesce(max(id), 0) from {{ this }})"
      unique_key: id
archive:
  - source_schema: analytics
    target_schema: archived
    tables:
      - source_table: raw_users
        target_table: users_archived
        updated_at: updated_at
        unique_key: id
"#,
    );
    write(root, "data/raw_orders.csv", ORDERS);
    write(
        root,
        "data/raw_users.csv",
        "id,name,updated_at\n1,ada,2024-01-01 00:00:00\n2,grace,2024-01-02 00:00:00\n",
    );
    write(
        root,
        "models/staging/stg_orders.sql",
        "{{ config(materialized='ephemeral') }}\nselect id, amount, status from \"analytics\".\"raw_orders\"",
    );
    write(root, "models/orders.sql", "select * from {{ ref('stg_orders') }}");
    write(
        root,
        "models/orders_view.sql",
        "{{ config(materialized='view') }}\nselect status, count(*) as n from {{ ref('orders') }} group by status",
    );
    write(
        root,
        "models/events_incr.sql",
        "select id, amount from {{ ref('stg_orders') }}",
    );
    write(
        root,
        "models/schema.yml",
        "orders:\n  constraints:\n    not_null: [id]\n    unique: [id]\n",
    );
    write(
        root,
        "tests/no_negative_amounts.sql",
        "select * from {{ ref('orders') }} where amount < 0",
    );
    write(
        root,
        "tests/no_big_orders.sql",
        "select * from {{ ref('orders') }} where amount > 100",
    );
    dir
}

fn count(adapter: &Adapter, relation: &str) -> i64 {
    let mut conn = adapter.acquire("count").unwrap();
    let result = adapter
        .fetch(&mut conn, &format!("select count(*) from {relation}"))
        .unwrap();
    adapter.release(conn);
    result.rows[0][0].as_deref().unwrap().parse().unwrap()
}

fn seed(root: &Path, full_refresh: bool) {
    let workspace = Workspace::load(root, None, None).unwrap();
    let adapter = workspace.adapter().unwrap();
    let files = workspace.project.seed_files().unwrap();
    let results = load_seeds(&adapter, workspace.schema(), &files, full_refresh).unwrap();
    assert!(results.iter().all(|r| r.message.is_none()), "{results:?}");
    adapter.cleanup();
}

async fn run(root: &Path, kinds: &[ResourceKind], mode: LevelMode) -> BTreeMap<String, RunResult> {
    run_with(root, kinds, mode, CompileOptions::default()).await
}

async fn run_with(
    root: &Path,
    kinds: &[ResourceKind],
    mode: LevelMode,
    options: CompileOptions,
) -> BTreeMap<String, RunResult> {
    let workspace = Workspace::load(root, None, None).unwrap();
    let selected = workspace.select(&[], &[], kinds, |_| true).unwrap();
    let adapter = workspace.adapter().unwrap();
    let compiler = Arc::new(workspace.compiler(options));
    let scheduler = Scheduler::new(compiler, adapter, Arc::clone(&workspace.env), workspace.threads());
    scheduler
        .run(&selected, mode)
        .await
        .unwrap()
        .into_iter()
        .map(|r| (r.name.clone(), r))
        .collect()
}

fn relation_kind(root: &Path, name: &str) -> Option<RelationKind> {
    let workspace = Workspace::load(root, None, None).unwrap();
    let adapter = workspace.adapter().unwrap();
    let mut conn = adapter.acquire(DEFAULT_CONNECTION).unwrap();
    let existing = adapter.query_existing(&mut conn, workspace.schema()).unwrap();
    adapter.release(conn);
    adapter.cleanup();
    existing.get(name).copied()
}

/// A project with a single model `m`, built first as a view
fn view_project() -> TempDir {
    let dir = TempDir::new().unwrap();
    let root = dir.path();
    write(
        root,
        "kiln_project.yml",
        r#"
name: flip
targets:
  dev:
    type: duckdb
    path: warehouse.duckdb
    schema: analytics
    threads: 1
"#,
    );
    write(root, "models/m.sql", "{{ config(materialized='view') }}\nselect 1 as id");
    dir
}

fn counts(root: &Path, relations: &[&str]) -> Vec<i64> {
    let workspace = Workspace::load(root, None, None).unwrap();
    let adapter = workspace.adapter().unwrap();
    let counts = relations.iter().map(|r| count(&adapter, r)).collect();
    adapter.cleanup();
    counts
}

#[tokio::test]
async fn test_models_build_and_rebuild() {
    let dir = project();
    let root = dir.path();
    seed(root, false);

    let results = run(root, &[ResourceKind::Model], LevelMode::Blocking).await;
    assert_eq!(results.len(), 3, "ephemeral models are not run");
    assert!(!results.contains_key("stg_orders"));
    for result in results.values() {
        assert_eq!(result.status, NodeStatus::Success, "{result:?}");
    }
    assert_eq!(
        counts(root, &["analytics.orders", "analytics.orders_view", "analytics.events_incr"]),
        vec![3, 2, 3]
    );

    let again = run(root, &[ResourceKind::Model], LevelMode::Blocking).await;
    assert!(again.values().all(|r| r.status == NodeStatus::Success));
    assert_eq!(
        counts(root, &["analytics.orders", "analytics.events_incr"]),
        vec![3, 3]
    );

    assert!(root.join("target/build/shop/orders.sql").is_file());
}

#[tokio::test]
async fn test_incremental_picks_up_new_rows() {
    let dir = project();
    let root = dir.path();
    seed(root, false);
    run(root, &[ResourceKind::Model], LevelMode::Blocking).await;

    write(root, "data/raw_orders.csv", MORE_ORDERS);
    seed(root, false);
    assert_eq!(counts(root, &["analytics.raw_orders"]), vec![5]);

    run(root, &[ResourceKind::Model], LevelMode::Blocking).await;
    assert_eq!(
        counts(root, &["analytics.events_incr", "analytics.orders"]),
        vec![5, 5]
    );
}

#[tokio::test]
async fn test_tests_report_pass_and_fail() {
    let dir = project();
    let root = dir.path();
    seed(root, false);
    run(root, &[ResourceKind::Model], LevelMode::Blocking).await;

    let results = run(root, &[ResourceKind::Test], LevelMode::Flat).await;
    assert_eq!(results.len(), 4);
    assert_eq!(results["no_negative_amounts"].status, NodeStatus::Success);
    assert_eq!(results["no_big_orders"].status, NodeStatus::Fail);
    assert_eq!(results["no_big_orders"].failures, Some(1));
    assert_eq!(results["not_null_orders_id"].status, NodeStatus::Success);
    assert_eq!(results["unique_orders_id"].status, NodeStatus::Success);

    let workspace = Workspace::load(root, None, None).unwrap();
    let schema_only = workspace
        .select(&[], &[], &[ResourceKind::Test], |n| n.has_tag(SCHEMA_TAG))
        .unwrap();
    assert_eq!(schema_only.len(), 2);
}

#[tokio::test]
async fn test_archive_snapshots_source_rows() {
    let dir = project();
    let root = dir.path();
    seed(root, false);

    let results = run(root, &[ResourceKind::Archive], LevelMode::Flat).await;
    assert_eq!(results["users_archived"].status, NodeStatus::Success, "{results:?}");
    assert_eq!(counts(root, &["archived.users_archived"]), vec![2]);

    run(root, &[ResourceKind::Archive], LevelMode::Flat).await;
    assert_eq!(
        counts(root, &["archived.users_archived"]),
        vec![2],
        "unchanged rows are not archived twice"
    );
}

#[tokio::test]
async fn test_full_refresh_seed_replaces_table() {
    let dir = project();
    let root = dir.path();
    seed(root, false);
    write(root, "data/raw_orders.csv", "id,amount,status\n9,1,placed\n");
    seed(root, true);
    assert_eq!(counts(root, &["analytics.raw_orders"]), vec![1]);
}

#[tokio::test]
async fn test_view_rebuilt_as_incremental_becomes_a_table() {
    let dir = view_project();
    let root = dir.path();
    let first = run(root, &[ResourceKind::Model], LevelMode::Blocking).await;
    assert_eq!(first["m"].status, NodeStatus::Success, "{first:?}");
    assert_eq!(relation_kind(root, "m"), Some(RelationKind::View));

    write(
        root,
        "models/m.sql",
        "{{ config(materialized='incremental', sql_where='id > 0') }}\nselect 1 as id",
    );
    let second = run(root, &[ResourceKind::Model], LevelMode::Blocking).await;
    assert_eq!(second["m"].status, NodeStatus::Success, "{second:?}");
    assert_eq!(relation_kind(root, "m"), Some(RelationKind::Table));
    assert_eq!(counts(root, &["analytics.m"]), vec![1]);

    let third = run(root, &[ResourceKind::Model], LevelMode::Blocking).await;
    assert_eq!(third["m"].status, NodeStatus::Success, "{third:?}");
    assert_eq!(counts(root, &["analytics.m"]), vec![2], "existing table is appended to");
}

#[tokio::test]
async fn test_view_rebuilt_as_non_destructive_table_becomes_a_table() {
    let dir = view_project();
    let root = dir.path();
    run(root, &[ResourceKind::Model], LevelMode::Blocking).await;
    assert_eq!(relation_kind(root, "m"), Some(RelationKind::View));

    write(root, "models/m.sql", "{{ config(materialized='table') }}\nselect 1 as id");
    let options = CompileOptions {
        non_destructive: true,
        ..CompileOptions::default()
    };
    let second = run_with(root, &[ResourceKind::Model], LevelMode::Blocking, options).await;
    assert_eq!(second["m"].status, NodeStatus::Success, "{second:?}");
    assert_eq!(relation_kind(root, "m"), Some(RelationKind::Table));

    let third = run_with(root, &[ResourceKind::Model], LevelMode::Blocking, options).await;
    assert_eq!(third["m"].status, NodeStatus::Success, "{third:?}");
    assert_eq!(counts(root, &["analytics.m"]), vec![1], "truncated before the insert");
}
