use super::*;

fn redshift() -> Dialect {
    Dialect::from(DbType::Redshift)
}

#[test]
fn test_redshift_dist_styles() {
    assert_eq!(redshift().dist_qualifier(Some("ALL")), "diststyle all");
    assert_eq!(redshift().dist_qualifier(Some("even")), "diststyle even");
    assert_eq!(
        redshift().dist_qualifier(Some("user_id")),
        "diststyle key distkey(\"user_id\")"
    );
    assert_eq!(redshift().dist_qualifier(None), "");
}

#[test]
fn test_redshift_sort_keys() {
    let keys = vec!["a".to_string(), "b".to_string()];
    assert_eq!(
        redshift().sort_qualifier(&keys, None).unwrap(),
        "compound sortkey(\"a\", \"b\")"
    );
    assert_eq!(
        redshift().sort_qualifier(&keys, Some("interleaved")).unwrap(),
        "interleaved sortkey(\"a\", \"b\")"
    );
    assert!(redshift().sort_qualifier(&keys, Some("random")).is_err());
    assert_eq!(redshift().sort_qualifier(&[], Some("random")).unwrap(), "");
}

#[test]
fn test_other_dialects_have_no_qualifiers() {
    let duck = Dialect::from(DbType::DuckDb);
    assert_eq!(duck.dist_qualifier(Some("id")), "");
    assert_eq!(duck.sort_qualifier(&["id".to_string()], None).unwrap(), "");
}

#[test]
fn test_postgres_rebuilds_altered_columns() {
    let stmts = Dialect::from(DbType::Postgres).alter_column_type("s", "t", "c", "character varying(50)");
    assert_eq!(stmts.len(), 4);
    assert_eq!(
        stmts[0],
        "alter table \"s\".\"t\" add column \"c__kiln_alter\" character varying(50)"
    );
    assert_eq!(
        stmts[3],
        "alter table \"s\".\"t\" rename column \"c__kiln_alter\" to \"c\""
    );
}

#[test]
fn test_create_table_lists_columns_and_qualifiers() {
    let columns = vec![
        Column::new("id", "integer", None),
        Column::new("name", "text", None),
    ];
    let sql = redshift().create_table_sql("s", "t", &columns, "compound sortkey(\"id\")", "diststyle even");
    assert_eq!(
        sql,
        "create table if not exists \"s\".\"t\" (\n    \"id\" integer,\n    \"name\" character varying(255)\n) diststyle even compound sortkey(\"id\")"
    );
}

#[test]
fn test_duckdb_renames_views_with_alter_view() {
    let duck = Dialect::from(DbType::DuckDb);
    assert_eq!(
        duck.rename_sql("s", "a__kiln_tmp", "a", RelationKind::View),
        "alter view \"s\".\"a__kiln_tmp\" rename to \"a\""
    );
    assert_eq!(
        redshift().rename_sql("s", "a__kiln_tmp", "a", RelationKind::View),
        "alter table \"s\".\"a__kiln_tmp\" rename to \"a\""
    );
}

#[test]
fn test_columns_query_filters_schema_only_when_given() {
    let duck = Dialect::from(DbType::DuckDb);
    assert!(!duck.columns_sql(None, "t").contains("table_schema"));
    assert!(duck.columns_sql(Some("s"), "t").contains("and table_schema = 's'"));
}

#[test]
fn test_seeds_are_duckdb_only() {
    assert!(Dialect::from(DbType::DuckDb).load_csv_sql("s", "t", "/x.csv").is_ok());
    assert!(matches!(
        redshift().load_csv_sql("s", "t", "/x.csv"),
        Err(DbError::NotImplemented { .. })
    ));
}
