use super::*;
use crate::error::HostError;
use crate::host::{RenderHost, TemplateColumn};
use kiln_core::{NodeId, RefCall};
use serde_json::json;
use std::path::PathBuf;

/// Compile-style host: refs resolve into the `analytics` schema
struct StubHost {
    vars: BTreeMap<String, serde_json::Value>,
}

impl RenderHost for StubHost {
    fn resolve_ref(&self, call: &RefCall) -> Result<String, HostError> {
        if call.name == "missing" {
            return Err(HostError::RefNotFound {
                node: "model.shop.x".into(),
                target: call.name.clone(),
            });
        }
        Ok(format!("\"analytics\".\"{}\"", call.name))
    }

    fn resolve_var(
        &self,
        name: &str,
        default: Option<serde_json::Value>,
    ) -> Result<serde_json::Value, HostError> {
        self.vars
            .get(name)
            .cloned()
            .or(default)
            .ok_or_else(|| HostError::UndefinedVar {
                node: "model.shop.x".into(),
                name: name.to_string(),
            })
    }

    fn accept_config(&self, _key: &str, _value: serde_json::Value) -> Result<(), HostError> {
        Ok(())
    }

    fn already_exists(&self, _schema: &str, table: &str) -> Result<bool, HostError> {
        Ok(table == "orders")
    }

    fn get_columns(&self, _schema: &str, _table: &str) -> Result<Vec<TemplateColumn>, HostError> {
        Ok(vec![
            TemplateColumn::new("id", "integer"),
            TemplateColumn::new("total", "numeric"),
        ])
    }

    fn get_missing_columns(
        &self,
        _from_schema: &str,
        _from_table: &str,
        _to_schema: &str,
        _to_table: &str,
    ) -> Result<Vec<TemplateColumn>, HostError> {
        Ok(vec![TemplateColumn::new("total", "numeric")])
    }
}

fn stub(vars: serde_json::Value) -> SharedHost {
    let vars = match vars {
        serde_json::Value::Object(map) => map.into_iter().collect(),
        _ => BTreeMap::new(),
    };
    Arc::new(StubHost { vars })
}

fn model(package: &str, name: &str, raw: &str) -> Node {
    Node::new(
        NodeId::model(package, name),
        vec![package.to_string(), name.to_string()],
        PathBuf::from(format!("{name}.sql")),
        PathBuf::from(format!("models/{name}.sql")),
        raw.to_string(),
    )
}

fn target() -> TargetContext {
    TargetContext {
        name: "dev".into(),
        db_type: "duckdb".into(),
        schema: "analytics".into(),
        threads: 4,
    }
}

fn env_with(macros: &[MacroFile]) -> JinjaEnvironment {
    JinjaEnvironment::new(macros, RunContext::new(), target()).unwrap()
}

fn this() -> Relation {
    Relation::new("analytics", "x")
}

#[test]
fn test_render_plain_sql() {
    let env = env_with(&[]);
    let node = model("shop", "x", "select 1 as id");
    let out = env.render_node(&node, this(), stub(json!({}))).unwrap();
    assert_eq!(out, "select 1 as id");
}

#[test]
fn test_ref_resolves_through_host() {
    let env = env_with(&[]);
    let node = model("shop", "x", "select * from {{ ref('orders') }}");
    let out = env.render_node(&node, this(), stub(json!({}))).unwrap();
    assert_eq!(out, "select * from \"analytics\".\"orders\"");
}

#[test]
fn test_ref_with_too_many_arguments() {
    let env = env_with(&[]);
    let node = model("shop", "x", "{{ ref('a', 'b', 'c') }}");
    let err = env.render_node(&node, this(), stub(json!({}))).unwrap_err();
    assert!(err.to_string().contains("at most two arguments"));
}

#[test]
fn test_missing_ref_keeps_host_error() {
    let env = env_with(&[]);
    let node = model("shop", "x", "{{ ref('missing') }}");
    let err = env.render_node(&node, this(), stub(json!({}))).unwrap_err();
    assert!(matches!(err, JinjaError::Host(HostError::RefNotFound { .. })));
}

#[test]
fn test_var_and_default() {
    let env = env_with(&[]);
    let node = model(
        "shop",
        "x",
        "where d >= '{{ var('start') }}' limit {{ var('n', 5) }}",
    );
    let out = env
        .render_node(&node, this(), stub(json!({"start": "2024-01-01"})))
        .unwrap();
    assert_eq!(out, "where d >= '2024-01-01' limit 5");
}

#[test]
fn test_var_missing_is_undefined_var() {
    let env = env_with(&[]);
    let node = model("shop", "x", "{{ var('nope') }}");
    let err = env.render_node(&node, this(), stub(json!({}))).unwrap_err();
    assert!(matches!(err, JinjaError::Host(HostError::UndefinedVar { .. })));
}

#[test]
fn test_string_vars_are_rendered() {
    let env = env_with(&[]);
    let node = model("shop", "x", "{{ var('schema_name') }}");
    let out = env
        .render_node(
            &node,
            this(),
            stub(json!({"schema_name": "{{ target.schema }}_raw"})),
        )
        .unwrap();
    assert_eq!(out, "analytics_raw");
}

#[test]
fn test_this_and_target() {
    let env = env_with(&[]);
    let node = model(
        "shop",
        "x",
        "{{ this }} {{ this.schema }} {{ this.name }} {{ target.name }} {{ target.type }}",
    );
    let out = env.render_node(&node, this(), stub(json!({}))).unwrap();
    assert_eq!(out, "\"analytics\".\"x\" analytics x dev duckdb");
}

#[test]
fn test_adapter_helpers() {
    let env = env_with(&[]);
    let node = model(
        "shop",
        "x",
        "{% if already_exists('analytics', 'orders') %}yes{% endif %}\
         {% for c in adapter.get_columns_in_table('analytics', 'orders') %}{{ c.quoted }}{% if not loop.last %},{% endif %}{% endfor %}\
         {% for c in get_missing_columns('a', 'b', 'c', 'd') %} {{ c.name }} {{ c.data_type }}{% endfor %}",
    );
    let out = env.render_node(&node, this(), stub(json!({}))).unwrap();
    assert_eq!(out, "yes\"id\",\"total\" total numeric");
}

#[test]
fn test_package_macros_bare_and_qualified() {
    let env = env_with(&[
        MacroFile {
            package: "shop".into(),
            path: PathBuf::from("macros/money.sql"),
            contents: "{% macro cents(c) %}{{ c }} * 100{% endmacro %}".into(),
        },
        MacroFile {
            package: "shared".into(),
            path: PathBuf::from("macros/dates.sql"),
            contents: "{% macro today() %}current_date{% endmacro %}".into(),
        },
    ]);
    let node = model(
        "shop",
        "x",
        "select {{ cents('amount') }}, {{ shared.today() }}, {{ shop.cents('x') }}",
    );
    let out = env.render_node(&node, this(), stub(json!({}))).unwrap();
    assert_eq!(out, "select amount * 100, current_date, x * 100");
}

#[test]
fn test_other_package_macros_are_not_bare() {
    let env = env_with(&[MacroFile {
        package: "shared".into(),
        path: PathBuf::from("macros/dates.sql"),
        contents: "{% macro today() %}current_date{% endmacro %}".into(),
    }]);
    let node = model("shop", "x", "{{ today() }}");
    assert!(env.render_node(&node, this(), stub(json!({}))).is_err());
}

#[test]
fn test_schema_test_macro_renders_count_query() {
    let env = env_with(&[]);
    let node = model(
        "shop",
        "x",
        "{{ test_not_null(model=ref('orders'), arg='id') }}",
    );
    let out = env.render_node(&node, this(), stub(json!({}))).unwrap();
    assert!(out.contains("select count(*)"));
    assert!(out.contains("from \"analytics\".\"orders\""));
    assert!(out.contains("where id is null"));
}

#[test]
fn test_accepted_values_lists_values() {
    let env = env_with(&[]);
    let node = model(
        "shop",
        "x",
        "{{ test_accepted_values(model=ref('orders'), field='status', values=['placed', 'shipped']) }}",
    );
    let out = env.render_node(&node, this(), stub(json!({}))).unwrap();
    assert!(out.contains("not in ('placed', 'shipped')"));
}

#[test]
fn test_parse_node_captures_refs_and_config() {
    let env = env_with(&[]);
    let node = model(
        "shop",
        "x",
        "{{ config(materialized='table', sort=['id']) }}select * from {{ ref('orders') }} join {{ ref('shared', 'cal') }}",
    );
    let (rendered, capture) = env.parse_node(&node, "analytics", BTreeMap::new()).unwrap();
    assert_eq!(rendered, "select * from orders join cal");
    assert_eq!(
        capture.refs,
        vec![
            RefCall::new(None, "orders"),
            RefCall::new(Some("shared".into()), "cal")
        ]
    );
    assert_eq!(
        capture.config,
        vec![
            ("materialized".to_string(), json!("table")),
            ("sort".to_string(), json!(["id"])),
        ]
    );
}

#[test]
fn test_parse_tolerates_unknown_vars() {
    let env = env_with(&[]);
    let node = model("shop", "x", "select '{{ var('later') }}'");
    let (rendered, _) = env.parse_node(&node, "analytics", BTreeMap::new()).unwrap();
    assert_eq!(rendered, "select ''");
}

#[test]
fn test_macro_misuse_fails_environment() {
    let result = JinjaEnvironment::new(
        &[MacroFile {
            package: "shop".into(),
            path: PathBuf::from("macros/bad.sql"),
            contents: "{% macro bad() %}{{ ref('x') }}{% endmacro %}".into(),
        }],
        RunContext::new(),
        target(),
    );
    assert!(matches!(result, Err(JinjaError::MacroMisuse { .. })));
}

#[test]
fn test_render_hook_context() {
    let env = env_with(&[]);
    let out = env
        .render_hook(
            "insert into audit values ('{{ state }}', '{{ target.schema }}', '{{ invocation_id }}')",
            HookState::Start,
        )
        .unwrap();
    assert!(out.starts_with("insert into audit values ('start', 'analytics', '"));
    assert!(out.contains(&env.run().invocation_id));
}

#[test]
fn test_render_model_hook_sees_this() {
    let env = env_with(&[]);
    let out = env
        .render_model_hook("grant select on {{ this }} to reporter", this())
        .unwrap();
    assert_eq!(out, "grant select on \"analytics\".\"x\" to reporter");
}
