use super::*;
use serde_json::json;

fn model(name: &str) -> Node {
    Node::new(
        NodeId::model("proj", name),
        vec!["proj".into(), name.into()],
        PathBuf::from(format!("{name}.sql")),
        PathBuf::from(format!("models/{name}.sql")),
        "select 1".into(),
    )
}

#[test]
fn test_node_id_round_trips_through_text() {
    let id = NodeId::model("proj", "users");
    assert_eq!(id.to_string(), "model.proj.users");
    assert_eq!("model.proj.users".parse::<NodeId>().unwrap(), id);
}

#[test]
fn test_node_id_name_may_contain_dots() {
    let id: NodeId = "test.proj.not_null_a.b".parse().unwrap();
    assert_eq!(id.kind, ResourceKind::Test);
    assert_eq!(id.name, "not_null_a.b");
}

#[test]
fn test_node_id_rejects_bad_text() {
    assert!("model.proj".parse::<NodeId>().is_err());
    assert!("widget.proj.x".parse::<NodeId>().is_err());
    assert!("model..x".parse::<NodeId>().is_err());
}

#[test]
fn test_node_id_serializes_as_string() {
    let id = NodeId::new(ResourceKind::Archive, "proj", "users_archived");
    let text = serde_json::to_string(&id).unwrap();
    assert_eq!(text, "\"archive.proj.users_archived\"");
    let back: NodeId = serde_json::from_str(&text).unwrap();
    assert_eq!(back, id);
}

#[test]
fn test_empty_flag_follows_trimmed_text() {
    let blank = Node::new(
        NodeId::model("proj", "blank"),
        vec![],
        PathBuf::from("blank.sql"),
        PathBuf::from("models/blank.sql"),
        "  \n\t ".into(),
    );
    assert!(blank.empty);
    assert!(!model("x").empty);
}

#[test]
fn test_config_defaults() {
    let config = NodeConfig::default();
    assert!(config.enabled);
    assert_eq!(config.materialized, Materialization::View);
}

#[test]
fn test_config_hooks_append_and_vars_extend() {
    let mut config = NodeConfig::default();
    let mut tags = BTreeSet::new();
    config
        .apply_layer(
            "m",
            &[
                ("pre-hook".into(), json!("grant select on x to y")),
                ("vars".into(), json!({"a": 1, "b": 2})),
            ],
            &mut tags,
        )
        .unwrap();
    config
        .apply_layer(
            "m",
            &[
                ("pre-hook".into(), json!(["analyze x"])),
                ("vars".into(), json!({"b": 3})),
                ("materialized".into(), json!("table")),
            ],
            &mut tags,
        )
        .unwrap();

    assert_eq!(config.pre_hook, vec!["grant select on x to y", "analyze x"]);
    assert_eq!(config.vars["a"], json!(1));
    assert_eq!(config.vars["b"], json!(3));
    assert_eq!(config.materialized, Materialization::Table);
}

#[test]
fn test_config_rejects_unknown_materialization() {
    let mut config = NodeConfig::default();
    let err = config
        .apply("m", "materialized", &json!("snowball"), &mut BTreeSet::new())
        .unwrap_err();
    assert!(matches!(err, CoreError::InvalidMaterialization { .. }));
    assert!(err.to_string().contains("snowball"));
}

#[test]
fn test_config_sort_accepts_scalar_or_list() {
    let mut config = NodeConfig::default();
    let mut tags = BTreeSet::new();
    config.apply("m", "sort", &json!("id"), &mut tags).unwrap();
    assert_eq!(config.sort, vec!["id"]);
    config.apply("m", "sort", &json!(["a", "b"]), &mut tags).unwrap();
    assert_eq!(config.sort, vec!["a", "b"]);
}

#[test]
fn test_config_tags_go_to_node() {
    let mut config = NodeConfig::default();
    let mut tags = BTreeSet::new();
    config
        .apply("m", "tags", &json!(["nightly", "finance"]), &mut tags)
        .unwrap();
    assert!(tags.contains("nightly"));
    assert!(tags.contains("finance"));
}

#[test]
fn test_blocking_excludes_ephemeral_and_non_models() {
    let mut eph = model("eph");
    eph.config.materialized = Materialization::Ephemeral;
    assert!(eph.is_ephemeral());
    assert!(!eph.is_blocking());
    assert!(model("t").is_blocking());

    let test = Node::new(
        NodeId::new(ResourceKind::Test, "proj", "t"),
        vec![],
        PathBuf::from("t.sql"),
        PathBuf::from("tests/t.sql"),
        "select 0".into(),
    );
    assert!(!test.is_blocking());
}
