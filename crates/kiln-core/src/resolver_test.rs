use super::*;
use std::path::PathBuf;

fn node(kind: ResourceKind, package: &str, name: &str, refs: &[(Option<&str>, &str)]) -> Node {
    let mut n = Node::new(
        NodeId::new(kind, package, name),
        vec![package.into(), name.into()],
        PathBuf::from(format!("{name}.sql")),
        PathBuf::from(format!("models/{name}.sql")),
        "select 1".into(),
    );
    n.refs = refs
        .iter()
        .map(|(p, t)| RefCall::new(p.map(str::to_string), *t))
        .collect();
    n
}

fn model(name: &str, refs: &[&str]) -> Node {
    let refs: Vec<(Option<&str>, &str)> = refs.iter().map(|r| (None, *r)).collect();
    node(ResourceKind::Model, "proj", name, &refs)
}

#[test]
fn test_refs_become_dependencies() {
    let mut nodes = vec![model("base", &[]), model("leaf", &["base"])];
    process_refs(&mut nodes).unwrap();
    assert_eq!(nodes[1].depends_on.nodes, vec![NodeId::model("proj", "base")]);
    assert!(nodes[0].depends_on.nodes.is_empty());
}

#[test]
fn test_repeated_refs_add_repeated_dependencies() {
    let mut nodes = vec![model("base", &[]), model("leaf", &["base", "base"])];
    process_refs(&mut nodes).unwrap();
    assert_eq!(nodes[1].depends_on.nodes.len(), 2);
}

#[test]
fn test_missing_target_names_source_and_target() {
    let mut nodes = vec![model("leaf", &["nope"])];
    let err = process_refs(&mut nodes).unwrap_err();
    assert!(matches!(err, CoreError::RefTargetNotFound { .. }));
    let msg = err.to_string();
    assert!(msg.contains("leaf"));
    assert!(msg.contains("nope"));
}

#[test]
fn test_package_qualified_ref_is_scoped() {
    let mut nodes = vec![
        node(ResourceKind::Model, "shared", "calendar", &[]),
        node(ResourceKind::Model, "proj", "calendar", &[]),
        node(
            ResourceKind::Model,
            "proj",
            "report",
            &[(Some("shared"), "calendar")],
        ),
    ];
    process_refs(&mut nodes).unwrap();
    assert_eq!(
        nodes[2].depends_on.nodes,
        vec![NodeId::model("shared", "calendar")]
    );

    let mut missing = vec![
        node(ResourceKind::Model, "proj", "calendar", &[]),
        node(ResourceKind::Model, "proj", "r", &[(Some("other"), "calendar")]),
    ];
    let err = process_refs(&mut missing).unwrap_err();
    assert!(err.to_string().contains("in package 'other'"));
}

#[test]
fn test_only_models_are_ref_targets() {
    let mut nodes = vec![
        node(ResourceKind::Analysis, "proj", "thing", &[]),
        model("leaf", &["thing"]),
    ];
    assert!(process_refs(&mut nodes).is_err());
}

#[test]
fn test_enabled_node_may_not_ref_disabled_model() {
    let mut disabled = model("base", &[]);
    disabled.config.enabled = false;
    let mut nodes = vec![disabled, model("leaf", &["base"])];
    let err = process_refs(&mut nodes).unwrap_err();
    assert!(matches!(err, CoreError::DisabledDependency { .. }));
}

#[test]
fn test_disabled_node_may_ref_disabled_model() {
    let mut base = model("base", &[]);
    base.config.enabled = false;
    let mut leaf = model("leaf", &["base"]);
    leaf.config.enabled = false;
    let mut nodes = vec![base, leaf];
    process_refs(&mut nodes).unwrap();
    assert_eq!(nodes[1].depends_on.nodes.len(), 1);
}
