//! Archive statements: type-2 slowly changing dimension snapshots.
//!
//! The destination carries every source column plus validity bookkeeping.
//! Each run stages the rows that changed since the last archive, closes
//! out superseded versions and inserts the new ones.

use crate::error::{SqlError, SqlResult};
use crate::operation::Operation;

/// Suffix of the staging table
pub const ARCHIVAL_TMP_SUFFIX: &str = "__kiln_archival_tmp";

/// Bookkeeping columns added to every archive destination
pub const ARCHIVE_COLUMNS: [(&str, &str); 4] = [
    ("valid_from", "timestamp"),
    ("valid_to", "timestamp"),
    ("scd_id", "text"),
    ("kiln_updated_at", "timestamp"),
];

/// Destination sort key
pub const ARCHIVE_SORT_KEY: &str = "kiln_updated_at";

/// Destination distribution key
pub const ARCHIVE_DIST_KEY: &str = "scd_id";

/// One archived table
#[derive(Debug, Clone, Copy)]
pub struct ArchiveSpec<'a> {
    pub source_schema: &'a str,
    pub source_table: &'a str,
    pub target_schema: &'a str,
    pub target_table: &'a str,
    /// Expression giving a row's last-modified time
    pub updated_at: &'a str,
    /// Expression identifying a row across versions
    pub unique_key: &'a str,
}

impl ArchiveSpec<'_> {
    /// Fail when the source has no columns, which means it does not exist
    pub fn check_source(&self, source_columns: &[String]) -> SqlResult<()> {
        if source_columns.is_empty() {
            return Err(SqlError::ArchiveSourceMissing {
                schema: self.source_schema.to_string(),
                table: self.source_table.to_string(),
            });
        }
        Ok(())
    }

    fn staging_table(&self) -> String {
        format!("{}{}", self.target_table, ARCHIVAL_TMP_SUFFIX)
    }

    /// The change-detection query: every new or changed source row, and
    /// every archived row it supersedes, tagged with a `change_type`
    pub fn select(&self, source_columns: &[String]) -> String {
        let columns = quoted_list(source_columns, ",\n            ");
        format!(
            r#"with "current_data" as (
        select
            {columns},
            {updated_at} as "kiln_updated_at",
            {unique_key} as "kiln_pk",
            {updated_at} as "valid_from",
            null::timestamp as "tmp_valid_to"
        from "{source_schema}"."{source_table}"
    ),

    "archived_data" as (
        select
            {columns},
            {updated_at} as "kiln_updated_at",
            {unique_key} as "kiln_pk",
            "valid_from",
            "valid_to" as "tmp_valid_to"
        from "{target_schema}"."{target_table}"
    ),

    "insertions" as (
        select
            "current_data".*,
            null::timestamp as "valid_to"
        from "current_data"
        left outer join "archived_data"
          on "archived_data"."kiln_pk" = "current_data"."kiln_pk"
        where "archived_data"."kiln_pk" is null or (
          "archived_data"."kiln_pk" is not null and
          "current_data"."kiln_updated_at" > "archived_data"."kiln_updated_at" and
          "archived_data"."tmp_valid_to" is null
        )
    ),

    "updates" as (
        select
            "archived_data".*,
            "current_data"."kiln_updated_at" as "valid_to"
        from "current_data"
        left outer join "archived_data"
          on "archived_data"."kiln_pk" = "current_data"."kiln_pk"
        where "archived_data"."kiln_pk" is not null
          and "archived_data"."kiln_updated_at" < "current_data"."kiln_updated_at"
          and "archived_data"."tmp_valid_to" is null
    ),

    "merged" as (
        select *, 'update' as "change_type" from "updates"
        union all
        select *, 'insert' as "change_type" from "insertions"
    )

    select *,
        md5(cast("kiln_pk" as varchar) || '|' || cast("kiln_updated_at" as varchar)) as "scd_id"
    from "merged""#,
            columns = columns,
            updated_at = self.updated_at,
            unique_key = self.unique_key,
            source_schema = self.source_schema,
            source_table = self.source_table,
            target_schema = self.target_schema,
            target_table = self.target_table,
        )
    }

    /// The full archive script.
    ///
    /// `missing_columns` are `(name, type)` pairs present in the source but
    /// not yet in the destination. `dest_columns` are the destination's
    /// columns after those are added.
    pub fn script(
        &self,
        select: &str,
        missing_columns: &[(String, String)],
        dest_columns: &[String],
    ) -> String {
        let schema = self.target_schema;
        let table = self.target_table;
        let staging = self.staging_table();

        let alters: String = missing_columns
            .iter()
            .map(|(name, data_type)| {
                format!(
                    "alter table \"{}\".\"{}\" add column \"{}\" {};\n",
                    schema, table, name, data_type
                )
            })
            .collect();
        let operation = Operation::ExpandColumnTypesIfNeeded {
            temp_table: staging.clone(),
            to_schema: schema.to_string(),
            to_table: table.to_string(),
        };
        let columns = quoted_list(dest_columns, ", ");

        format!(
            r#"{alters}
drop table if exists "{staging}";
create temporary table "{staging}" as (
    with kiln_archive_sbq as (
    {select}
    )
    select * from kiln_archive_sbq
);

{operation}

update "{schema}"."{table}" set "valid_to" = "tmp"."valid_to"
from "{staging}" as "tmp"
where "tmp"."scd_id" = "{schema}"."{table}"."scd_id"
  and "change_type" = 'update';

insert into "{schema}"."{table}" ({columns})
select {columns} from "{staging}"
where "change_type" = 'insert';
"#,
            alters = alters,
            staging = staging,
            select = select,
            operation = operation.to_comment(),
            schema = schema,
            table = table,
            columns = columns,
        )
    }
}

fn quoted_list(columns: &[String], separator: &str) -> String {
    columns
        .iter()
        .map(|c| format!("\"{}\"", c))
        .collect::<Vec<_>>()
        .join(separator)
}

#[cfg(test)]
#[path = "archive_test.rs"]
mod tests;
