//! Per-warehouse SQL fragments.
//!
//! Everything here is text generation; executing it is the adapter's job.

use crate::column::Column;
use crate::error::{DbError, DbResult};
use kiln_core::DbType;

/// Kind of an existing relation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RelationKind {
    Table,
    View,
}

impl RelationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RelationKind::Table => "table",
            RelationKind::View => "view",
        }
    }

    /// Parse the `table`/`view` labels produced by [`Dialect::existing_relations_sql`]
    pub fn parse(text: &str) -> Option<Self> {
        match text {
            "table" => Some(RelationKind::Table),
            "view" => Some(RelationKind::View),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dialect {
    db_type: DbType,
}

impl From<DbType> for Dialect {
    fn from(db_type: DbType) -> Self {
        Self { db_type }
    }
}

impl Dialect {
    pub fn db_type(&self) -> DbType {
        self.db_type
    }

    /// Distribution clause. Only Redshift distributes.
    pub fn dist_qualifier(&self, dist_key: Option<&str>) -> String {
        let Some(key) = dist_key.map(str::trim).filter(|k| !k.is_empty()) else {
            return String::new();
        };
        if self.db_type != DbType::Redshift {
            return String::new();
        }
        let lower = key.to_lowercase();
        if lower == "all" || lower == "even" {
            format!("diststyle {}", lower)
        } else {
            format!("diststyle key distkey(\"{}\")", key)
        }
    }

    /// Sort clause. Only Redshift sorts; `sort_type` defaults to compound.
    pub fn sort_qualifier(&self, sort_keys: &[String], sort_type: Option<&str>) -> DbResult<String> {
        if sort_keys.is_empty() || self.db_type != DbType::Redshift {
            return Ok(String::new());
        }
        let sort_type = sort_type.unwrap_or("compound").to_lowercase();
        if sort_type != "compound" && sort_type != "interleaved" {
            return Err(DbError::ExecutionError(format!(
                "Invalid sort_type given: {} -- must be one of compound, interleaved",
                sort_type
            )));
        }
        let keys: Vec<String> = sort_keys.iter().map(|k| format!("\"{}\"", k)).collect();
        Ok(format!("{} sortkey({})", sort_type, keys.join(", ")))
    }

    /// Query returning `(name, 'table'|'view')` rows for one schema
    pub fn existing_relations_sql(&self, schema: &str) -> String {
        match self.db_type {
            DbType::Postgres | DbType::Redshift => format!(
                "select tablename as name, 'table' as type from pg_tables where schemaname = '{schema}'\n\
                 union all\n\
                 select viewname as name, 'view' as type from pg_views where schemaname = '{schema}'",
                schema = schema
            ),
            DbType::DuckDb | DbType::Snowflake => format!(
                "select table_name, case when table_type = 'VIEW' then 'view' else 'table' end \
                 from information_schema.tables where table_schema = '{}'",
                schema
            ),
        }
    }

    /// Query returning `(column_name, data_type, character_maximum_length)`.
    /// Without a schema, temporary tables are found too.
    pub fn columns_sql(&self, schema: Option<&str>, table: &str) -> String {
        let mut sql = format!(
            "select column_name, data_type, character_maximum_length\n\
             from information_schema.columns\n\
             where table_name = '{}'",
            table
        );
        if let Some(schema) = schema {
            sql.push_str(&format!("\n  and table_schema = '{}'", schema));
        }
        sql.push_str("\norder by ordinal_position");
        sql
    }

    /// Statements changing one column's type. Postgres-family warehouses
    /// cannot alter a varchar length in place, so the column is rebuilt.
    pub fn alter_column_type(
        &self,
        schema: &str,
        table: &str,
        column: &str,
        new_type: &str,
    ) -> Vec<String> {
        let relation = format!("\"{}\".\"{}\"", schema, table);
        match self.db_type {
            DbType::Postgres | DbType::Redshift => {
                let tmp = format!("{}__kiln_alter", column);
                vec![
                    format!("alter table {} add column \"{}\" {}", relation, tmp, new_type),
                    format!("update {} set \"{}\" = \"{}\"", relation, tmp, column),
                    format!("alter table {} drop column \"{}\" cascade", relation, column),
                    format!("alter table {} rename column \"{}\" to \"{}\"", relation, tmp, column),
                ]
            }
            DbType::Snowflake => vec![format!(
                "alter table {} alter \"{}\" set data type {}",
                relation, column, new_type
            )],
            DbType::DuckDb => vec![format!(
                "alter table {} alter column \"{}\" type {}",
                relation, column, new_type
            )],
        }
    }

    pub fn drop_sql(&self, schema: &str, name: &str, kind: RelationKind) -> String {
        format!(
            "drop {} if exists \"{}\".\"{}\" cascade",
            kind.as_str(),
            schema,
            name
        )
    }

    pub fn truncate_sql(&self, schema: &str, table: &str) -> String {
        format!("truncate table \"{}\".\"{}\"", schema, table)
    }

    pub fn rename_sql(&self, schema: &str, from: &str, to: &str, kind: RelationKind) -> String {
        // DuckDB refuses `alter table` on a view
        let keyword = match (self.db_type, kind) {
            (DbType::DuckDb, RelationKind::View) => "view",
            _ => "table",
        };
        format!(
            "alter {} \"{}\".\"{}\" rename to \"{}\"",
            keyword, schema, from, to
        )
    }

    pub fn create_schema_sql(&self, schema: &str) -> String {
        format!("create schema if not exists \"{}\"", schema)
    }

    pub fn create_table_sql(
        &self,
        schema: &str,
        table: &str,
        columns: &[Column],
        sort: &str,
        dist: &str,
    ) -> String {
        let fields: Vec<String> = columns
            .iter()
            .map(|c| format!("    {} {}", c.quoted(), c.data_type()))
            .collect();
        let qualifiers: String = [dist, sort]
            .iter()
            .filter(|q| !q.is_empty())
            .map(|q| format!(" {}", q))
            .collect();
        format!(
            "create table if not exists \"{}\".\"{}\" (\n{}\n){}",
            schema,
            table,
            fields.join(",\n"),
            qualifiers
        )
    }

    /// Statement loading a CSV file into a new table
    pub fn load_csv_sql(&self, schema: &str, table: &str, path: &str) -> DbResult<String> {
        match self.db_type {
            DbType::DuckDb => Ok(format!(
                "create table \"{}\".\"{}\" as select * from read_csv_auto('{}')",
                schema,
                table,
                path.replace('\'', "''")
            )),
            other => Err(DbError::NotImplemented {
                backend: other.to_string(),
                feature: "seed loading".to_string(),
            }),
        }
    }

    /// Statement appending a CSV file to an existing table
    pub fn append_csv_sql(&self, schema: &str, table: &str, path: &str) -> DbResult<String> {
        match self.db_type {
            DbType::DuckDb => Ok(format!(
                "insert into \"{}\".\"{}\" select * from read_csv_auto('{}')",
                schema,
                table,
                path.replace('\'', "''")
            )),
            other => Err(DbError::NotImplemented {
                backend: other.to_string(),
                feature: "seed loading".to_string(),
            }),
        }
    }
}

#[cfg(test)]
#[path = "dialect_test.rs"]
mod tests;
