//! The adapter: warehouse operations on top of a connection pool

use crate::backend::{Backend, QueryResult};
use crate::column::{string_type, Column};
use crate::dialect::{Dialect, RelationKind};
use crate::duckdb::DuckDbBackend;
use crate::error::{DbError, DbResult};
use crate::pool::{Connection, ConnectionPool};
use crate::unsupported::UnsupportedBackend;
use kiln_core::{DbType, TargetConfig};
use kiln_sql::{split_script, Operation, ScriptPart};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::Arc;

/// Warehouse operations shared by the compiler and the scheduler
pub struct Adapter {
    pool: ConnectionPool,
    dialect: Dialect,
}

impl Adapter {
    pub fn new(backend: Arc<dyn Backend>, threads: usize) -> Self {
        let dialect = Dialect::from(backend.db_type());
        Self {
            pool: ConnectionPool::new(backend, threads),
            dialect,
        }
    }

    /// Build the adapter for a configured target. Relative DuckDB paths
    /// are resolved against `project_root`.
    pub fn for_target(target: &TargetConfig, threads: usize, project_root: &Path) -> DbResult<Self> {
        let backend: Arc<dyn Backend> = match target.db_type {
            DbType::DuckDb => {
                let path = if target.path == ":memory:" {
                    target.path.clone()
                } else {
                    project_root.join(&target.path).display().to_string()
                };
                Arc::new(DuckDbBackend::new(&path)?)
            }
            other => Arc::new(UnsupportedBackend::new(other)),
        };
        Ok(Self::new(backend, threads))
    }

    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    pub fn pool(&self) -> &ConnectionPool {
        &self.pool
    }

    pub fn acquire(&self, name: &str) -> DbResult<Connection> {
        self.pool.acquire(name)
    }

    pub fn release(&self, conn: Connection) {
        self.pool.release(conn)
    }

    /// Close idle connections, warning about any still lent out
    pub fn cleanup(&self) -> Vec<String> {
        self.pool.cleanup()
    }

    pub fn execute(&self, conn: &mut Connection, sql: &str) -> DbResult<()> {
        conn.execute(sql)
    }

    pub fn execute_all(&self, conn: &mut Connection, statements: &[String]) -> DbResult<()> {
        for sql in statements {
            conn.execute(sql)?;
        }
        Ok(())
    }

    pub fn fetch(&self, conn: &mut Connection, sql: &str) -> DbResult<QueryResult> {
        conn.query(sql)
    }

    /// Run a generated script, carrying out embedded operations in order
    pub fn execute_script(&self, conn: &mut Connection, script: &str) -> DbResult<()> {
        for part in split_script(script)? {
            match part {
                ScriptPart::Sql(sql) => conn.execute(&sql)?,
                ScriptPart::Operation(Operation::ExpandColumnTypesIfNeeded {
                    temp_table,
                    to_schema,
                    to_table,
                }) => self.expand_target_column_types(conn, &temp_table, &to_schema, &to_table)?,
            }
        }
        Ok(())
    }

    /// Relations in `schema`, by name
    pub fn query_existing(
        &self,
        conn: &mut Connection,
        schema: &str,
    ) -> DbResult<BTreeMap<String, RelationKind>> {
        let result = conn.query(&self.dialect.existing_relations_sql(schema))?;
        let mut existing = BTreeMap::new();
        for row in result.rows {
            let (Some(Some(name)), Some(Some(kind))) = (row.first(), row.get(1)) else {
                continue;
            };
            if let Some(kind) = RelationKind::parse(kind) {
                existing.insert(name.clone(), kind);
            }
        }
        Ok(existing)
    }

    pub fn get_columns(
        &self,
        conn: &mut Connection,
        schema: Option<&str>,
        table: &str,
    ) -> DbResult<Vec<Column>> {
        let result = conn.query(&self.dialect.columns_sql(schema, table))?;
        let mut columns = Vec::with_capacity(result.rows.len());
        for row in result.rows {
            let mut values = row.into_iter();
            let (Some(Some(name)), Some(dtype)) = (values.next(), values.next()) else {
                return Err(DbError::Internal(format!(
                    "unexpected column metadata for table '{}'",
                    table
                )));
            };
            let char_size = values.next().flatten().and_then(|s| s.parse().ok());
            columns.push(Column::new(name, dtype.unwrap_or_default(), char_size));
        }
        Ok(columns)
    }

    /// Columns of `from` with no same-named column in `to`
    pub fn get_missing_columns(
        &self,
        conn: &mut Connection,
        from_schema: &str,
        from_table: &str,
        to_schema: &str,
        to_table: &str,
    ) -> DbResult<Vec<Column>> {
        let from = self.get_columns(conn, Some(from_schema), from_table)?;
        let to = self.get_columns(conn, Some(to_schema), to_table)?;
        Ok(from
            .into_iter()
            .filter(|c| !to.iter().any(|t| t.name == c.name))
            .collect())
    }

    /// Widen string columns of the destination that are narrower than the
    /// same-named columns of a (temporary) staging table
    pub fn expand_target_column_types(
        &self,
        conn: &mut Connection,
        temp_table: &str,
        to_schema: &str,
        to_table: &str,
    ) -> DbResult<()> {
        let reference: HashMap<String, Column> = self
            .get_columns(conn, None, temp_table)?
            .into_iter()
            .map(|c| (c.name.clone(), c))
            .collect();
        let target = self.get_columns(conn, Some(to_schema), to_table)?;

        for column in target {
            let Some(wider) = reference.get(&column.name) else {
                continue;
            };
            if column.can_expand_to(wider) {
                let new_type = string_type(wider.string_size());
                log::info!(
                    "Changing col type from {} to {} in table \"{}\".\"{}\"",
                    column.data_type(),
                    new_type,
                    to_schema,
                    to_table
                );
                self.alter_column_type(conn, to_schema, to_table, &column.name, &new_type)?;
            }
        }
        Ok(())
    }

    pub fn alter_column_type(
        &self,
        conn: &mut Connection,
        schema: &str,
        table: &str,
        column: &str,
        new_type: &str,
    ) -> DbResult<()> {
        let statements = self
            .dialect
            .alter_column_type(schema, table, column, new_type);
        self.execute_all(conn, &statements)
    }

    pub fn drop(
        &self,
        conn: &mut Connection,
        schema: &str,
        name: &str,
        kind: RelationKind,
    ) -> DbResult<()> {
        conn.execute(&self.dialect.drop_sql(schema, name, kind))
    }

    pub fn truncate(&self, conn: &mut Connection, schema: &str, table: &str) -> DbResult<()> {
        conn.execute(&self.dialect.truncate_sql(schema, table))
    }

    pub fn rename(
        &self,
        conn: &mut Connection,
        schema: &str,
        from: &str,
        to: &str,
        kind: RelationKind,
    ) -> DbResult<()> {
        conn.execute(&self.dialect.rename_sql(schema, from, to, kind))
    }

    pub fn create_schema(&self, conn: &mut Connection, schema: &str) -> DbResult<()> {
        conn.execute(&self.dialect.create_schema_sql(schema))
    }

    pub fn create_table(
        &self,
        conn: &mut Connection,
        schema: &str,
        table: &str,
        columns: &[Column],
        sort_key: Option<&str>,
        dist_key: Option<&str>,
    ) -> DbResult<()> {
        let sort_keys: Vec<String> = sort_key.map(str::to_string).into_iter().collect();
        let sort = self.dialect.sort_qualifier(&sort_keys, None)?;
        let dist = self.dialect.dist_qualifier(dist_key);
        conn.execute(
            &self
                .dialect
                .create_table_sql(schema, table, columns, &sort, &dist),
        )
    }

    /// Load a CSV into `"schema"."table"`, appending when `append` is set
    pub fn load_csv(
        &self,
        conn: &mut Connection,
        schema: &str,
        table: &str,
        path: &Path,
        append: bool,
    ) -> DbResult<()> {
        let path = path.display().to_string();
        let sql = if append {
            self.dialect.append_csv_sql(schema, table, &path)?
        } else {
            self.dialect.load_csv_sql(schema, table, &path)?
        };
        conn.execute(&sql)
    }
}

#[cfg(test)]
#[path = "adapter_test.rs"]
mod tests;
