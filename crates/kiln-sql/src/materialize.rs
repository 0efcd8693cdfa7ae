//! Materialization statements
//!
//! Builds the DDL/DML that turns a model's final query into a relation,
//! and the wrapper that places hooks around it.

use crate::error::{SqlError, SqlResult};
use crate::operation::Operation;

/// Suffix of the relation a view/table is built under before the swap
pub const TMP_SUFFIX: &str = "__kiln_tmp";

/// Suffix of the staging table used by incremental statements
pub const INCREMENTAL_TMP_SUFFIX: &str = "__kiln_incremental_tmp";

/// First line of every wrapped statement
pub const PROLOGUE: &str = "-- Compiled by kiln";

/// Name a view/table is built under before being renamed into place
pub fn tmp_name(name: &str) -> String {
    format!("{}{}", name, TMP_SUFFIX)
}

/// The statement shape to produce
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Strategy {
    View,
    Table,
    /// Append rows matching `sql_where`, replacing rows with the same
    /// `unique_key` when one is given
    Incremental {
        sql_where: String,
        unique_key: Option<String>,
    },
    /// Table in non-destructive mode: keep the relation and insert into it
    NonDestructive,
}

/// Everything needed to materialize one model
#[derive(Debug, Clone)]
pub struct ModelStatement<'a> {
    pub strategy: Strategy,
    pub schema: &'a str,
    /// Relation name the statement writes to
    pub identifier: &'a str,
    /// Dialect distribution qualifier, may be empty
    pub dist: &'a str,
    /// Dialect sort qualifier, may be empty
    pub sort: &'a str,
    /// The model's query with CTEs injected
    pub query: &'a str,
    /// Whether `identifier` already exists (incremental shapes only)
    pub exists: bool,
    /// Rebuild incremental relations from scratch
    pub full_refresh: bool,
    /// Quoted destination columns, used when inserting into an existing
    /// relation
    pub dest_columns: &'a [String],
}

impl ModelStatement<'_> {
    /// Render the statement
    pub fn render(&self) -> SqlResult<String> {
        match &self.strategy {
            Strategy::View => Ok(self.create("view")),
            Strategy::Table => Ok(self.create("table")),
            Strategy::Incremental {
                sql_where,
                unique_key,
            } => {
                if sql_where.trim().is_empty() {
                    return Err(SqlError::MissingIncrementalFilter);
                }
                if self.full_refresh {
                    return Ok(format!(
                        "drop table if exists \"{}\".\"{}\" cascade;\n{}",
                        self.schema,
                        self.identifier,
                        self.create("table")
                    ));
                }
                if !self.exists {
                    return Ok(self.create("table"));
                }
                let delete = match unique_key {
                    Some(key) => self.delete_statement(key),
                    None => "-- no unique key provided... skipping delete".to_string(),
                };
                Ok(self.incremental(sql_where, &delete))
            }
            Strategy::NonDestructive => {
                if !self.exists {
                    return Ok(self.create("table"));
                }
                Ok(self.incremental(
                    "TRUE",
                    "-- non-destructive insert... skipping delete",
                ))
            }
        }
    }

    fn qualifiers(&self) -> String {
        [self.dist, self.sort]
            .iter()
            .filter(|q| !q.trim().is_empty())
            .map(|q| format!(" {}", q.trim()))
            .collect()
    }

    fn create(&self, kind: &str) -> String {
        format!(
            "create {} \"{}\".\"{}\"{} as (\n    {}\n);",
            kind,
            self.schema,
            self.identifier,
            self.qualifiers(),
            self.query
        )
    }

    fn staging_table(&self) -> String {
        format!("{}{}", self.identifier, INCREMENTAL_TMP_SUFFIX)
    }

    fn delete_statement(&self, unique_key: &str) -> String {
        format!(
            "delete from \"{schema}\".\"{identifier}\" where ({key}) in (\n    select ({key}) from \"{staging}\"\n);",
            schema = self.schema,
            identifier = self.identifier,
            key = unique_key,
            staging = self.staging_table()
        )
    }

    fn incremental(&self, sql_where: &str, delete: &str) -> String {
        let staging = self.staging_table();
        let operation = Operation::ExpandColumnTypesIfNeeded {
            temp_table: staging.clone(),
            to_schema: self.schema.to_string(),
            to_table: self.identifier.to_string(),
        };
        let insert = if self.dest_columns.is_empty() {
            format!(
                "insert into \"{}\".\"{}\"\nselect *\nfrom \"{}\";",
                self.schema, self.identifier, staging
            )
        } else {
            let columns = self.dest_columns.join(", ");
            format!(
                "insert into \"{}\".\"{}\" ({})\nselect {}\nfrom \"{}\";",
                self.schema, self.identifier, columns, columns, staging
            )
        };
        format!(
            "drop table if exists \"{staging}\";\n\
             create temporary table \"{staging}\" as (\n\
             \x20   with kiln_incr_sbq as (\n\
             \x20       {query}\n\
             \x20   )\n\
             \x20   select * from kiln_incr_sbq\n\
             \x20   where ({w}) or ({w}) is null\n\
             );\n\n\
             {operation}\n\n\
             {delete}\n\n\
             {insert}",
            staging = staging,
            query = self.query,
            w = sql_where,
            operation = operation.to_comment(),
            delete = delete,
            insert = insert
        )
    }
}

/// Join hook statements, each terminated by `;`
fn hook_block(hooks: &[String]) -> String {
    if hooks.is_empty() {
        return String::new();
    }
    let joined: Vec<&str> = hooks
        .iter()
        .map(|h| h.trim().trim_end_matches(';'))
        .collect();
    format!("{};", joined.join(";\n\n"))
}

/// Place already-rendered hooks around a statement
pub fn with_hooks(sql: &str, pre_hooks: &[String], post_hooks: &[String]) -> String {
    format!(
        "{}\n\n-- Pre-model hooks\n{}\n\n-- Model SQL\n{}\n\n-- Post-model hooks\n{}\n",
        PROLOGUE,
        hook_block(pre_hooks),
        sql,
        hook_block(post_hooks)
    )
}

/// Data tests pass when their query returns no rows
pub fn wrap_data_test(sql: &str) -> String {
    format!(
        "select count(*) from (\n{}\n) sbq",
        sql.trim_end().trim_end_matches(';')
    )
}

#[cfg(test)]
#[path = "materialize_test.rs"]
mod tests;
