//! Adapter instructions embedded in generated scripts.
//!
//! Some steps of a materialization cannot be written as plain SQL because
//! they depend on what the database looks like mid-script, e.g. widening
//! destination columns after the staging table exists. Those steps are
//! written as a comment line `-- KILN_OPERATION {json}` and carried out by
//! the adapter when it reaches that point of the script.

use crate::error::{SqlError, SqlResult};
use serde::{Deserialize, Serialize};

/// Comment prefix marking an instruction line
pub const OPERATION_MARKER: &str = "-- KILN_OPERATION ";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "function", content = "args", rename_all = "snake_case")]
pub enum Operation {
    /// Widen string columns of `to_schema.to_table` to fit `temp_table`
    ExpandColumnTypesIfNeeded {
        temp_table: String,
        to_schema: String,
        to_table: String,
    },
}

impl Operation {
    /// The instruction as a script line
    pub fn to_comment(&self) -> String {
        // Serializing a plain enum of strings cannot fail
        let json = serde_json::to_string(self).unwrap_or_default();
        format!("{}{}", OPERATION_MARKER, json)
    }
}

/// A piece of a script: SQL to run, or an instruction for the adapter
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptPart {
    Sql(String),
    Operation(Operation),
}

/// Split a generated script at its instruction lines. Blank SQL chunks
/// are dropped.
pub fn split_script(script: &str) -> SqlResult<Vec<ScriptPart>> {
    let mut parts = Vec::new();
    let mut chunk = String::new();

    for (index, line) in script.lines().enumerate() {
        match line.trim_start().strip_prefix(OPERATION_MARKER) {
            Some(json) => {
                flush(&mut chunk, &mut parts);
                let operation = serde_json::from_str(json.trim()).map_err(|e| {
                    SqlError::InvalidOperation {
                        line: index + 1,
                        message: e.to_string(),
                    }
                })?;
                parts.push(ScriptPart::Operation(operation));
            }
            None => {
                chunk.push_str(line);
                chunk.push('\n');
            }
        }
    }
    flush(&mut chunk, &mut parts);
    Ok(parts)
}

fn flush(chunk: &mut String, parts: &mut Vec<ScriptPart>) {
    let sql = std::mem::take(chunk);
    if has_statements(&sql) {
        parts.push(ScriptPart::Sql(sql));
    }
}

/// Whether `sql` contains anything besides whitespace and line comments
fn has_statements(sql: &str) -> bool {
    sql.lines().any(|line| {
        let line = line.trim();
        !line.is_empty() && !line.starts_with("--") && line != ";"
    })
}

#[cfg(test)]
#[path = "operation_test.rs"]
mod tests;
