use super::*;

#[test]
fn test_no_ctes_is_identity() {
    assert_eq!(inject_ctes("select 1", &[]), "select 1");
}

#[test]
fn test_single_ephemeral_dependency() {
    let ctes = vec![cte_definition("A", "select * from source_table")];
    let sql = inject_ctes("select * from __kiln__cte__A", &ctes);
    assert_eq!(
        sql,
        "with __kiln__cte__A as (\nselect * from source_table\n) select * from __kiln__cte__A"
    );
}

#[test]
fn test_definitions_keep_their_order() {
    let ctes = vec![
        cte_definition("A", "select 1"),
        cte_definition("B", "select * from __kiln__cte__A"),
    ];
    let sql = inject_ctes("select * from __kiln__cte__B", &ctes);
    let a = sql.find("__kiln__cte__A as").unwrap();
    let b = sql.find("__kiln__cte__B as").unwrap();
    assert!(a < b);
    assert!(sql.contains("\n), __kiln__cte__B as (\n"));
}

#[test]
fn test_existing_with_is_spliced() {
    let ctes = vec![cte_definition("A", "select 1 as id")];
    let sql = inject_ctes(
        "with cte as (select * from x) select * from cte join __kiln__cte__A using (id)",
        &ctes,
    );
    assert_eq!(
        sql,
        "with __kiln__cte__A as (\nselect 1 as id\n), cte as (select * from x) select * from cte join __kiln__cte__A using (id)"
    );
}

#[test]
fn test_existing_with_is_case_insensitive_and_keeps_leading_text() {
    let ctes = vec![cte_definition("A", "select 1")];
    let sql = inject_ctes("\n  -- staging\n  WITH cte as (select 1) select * from cte", &ctes);
    assert!(sql.starts_with("\n  -- staging\n  with __kiln__cte__A as (\nselect 1\n), cte as"));
}

#[test]
fn test_leading_comment_gets_with_in_front() {
    let ctes = vec![cte_definition("A", "select 1")];
    let sql = inject_ctes("  -- note\nselect * from __kiln__cte__A", &ctes);
    assert!(sql.starts_with("  with __kiln__cte__A as (\nselect 1\n) -- note\nselect"));
}

#[test]
fn test_nested_with_is_not_the_statement_with() {
    let ctes = vec![cte_definition("A", "select 1")];
    let sql = inject_ctes("select * from (with x as (select 1) select * from x) y", &ctes);
    assert!(sql.starts_with("with __kiln__cte__A as (\nselect 1\n) select * from (with x"));
}

#[test]
fn test_text_fallback_finds_with() {
    assert_eq!(
        splice_from_text("/* c */ with a as (select 1) select 1"),
        Splice::ExistingWith { start: 8, end: 12 }
    );
    assert_eq!(
        splice_from_text("  within_range"),
        Splice::Prepend { at: 2 }
    );
    assert_eq!(splice_from_text("-- c\nselect 1"), Splice::Prepend { at: 0 });
}

#[test]
fn test_multibyte_text_before_with() {
    let ctes = vec![cte_definition("A", "select 1")];
    let sql = inject_ctes("-- é ü\nwith b as (select 'ß') select * from b", &ctes);
    assert!(sql.starts_with("-- é ü\nwith __kiln__cte__A as (\nselect 1\n), b as"));
}
