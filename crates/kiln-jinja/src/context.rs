//! Values injected into every template as globals.

use crate::error::host_error;
use crate::functions::SharedHost;
use minijinja::value::{from_args, Object, ObjectRepr, Value};
use minijinja::{Error, ErrorKind, State};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;

/// Per-invocation values, fixed for the whole run
#[derive(Debug, Clone, Serialize)]
pub struct RunContext {
    /// Unique identifier for this invocation (UUID v4)
    pub invocation_id: String,
    /// ISO 8601 timestamp when the run started
    pub run_started_at: String,
}

impl RunContext {
    pub fn new() -> Self {
        Self {
            invocation_id: uuid::Uuid::new_v4().to_string(),
            run_started_at: chrono::Utc::now().to_rfc3339(),
        }
    }
}

impl Default for RunContext {
    fn default() -> Self {
        Self::new()
    }
}

/// Target configuration exposed to templates as `{{ target.schema }}`, etc.
#[derive(Debug, Clone, Default, Serialize)]
pub struct TargetContext {
    /// Target name (e.g. "dev", "prod")
    pub name: String,
    /// Database type (e.g. "duckdb")
    #[serde(rename = "type")]
    pub db_type: String,
    pub schema: String,
    pub threads: usize,
}

/// A schema-qualified relation. Renders as `"schema"."table"`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Relation {
    pub schema: String,
    pub table: String,
}

impl Relation {
    pub fn new(schema: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            schema: schema.into(),
            table: table.into(),
        }
    }
}

impl fmt::Display for Relation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "\"{}\".\"{}\"", self.schema, self.table)
    }
}

impl Object for Relation {
    fn repr(self: &Arc<Self>) -> ObjectRepr {
        ObjectRepr::Plain
    }

    fn get_value(self: &Arc<Self>, key: &Value) -> Option<Value> {
        match key.as_str()? {
            "schema" => Some(Value::from(self.schema.as_str())),
            "table" | "name" => Some(Value::from(self.table.as_str())),
            _ => None,
        }
    }

    fn render(self: &Arc<Self>, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self.as_ref(), f)
    }
}

/// The `adapter` namespace: `{{ adapter.already_exists(schema, table) }}`
pub(crate) struct AdapterNamespace {
    pub(crate) host: SharedHost,
}

impl fmt::Debug for AdapterNamespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("adapter")
    }
}

impl Object for AdapterNamespace {
    fn call_method(
        self: &Arc<Self>,
        _state: &State<'_, '_>,
        method: &str,
        args: &[Value],
    ) -> Result<Value, Error> {
        match method {
            "already_exists" => {
                let (schema, table): (String, String) = from_args(args)?;
                let exists = self
                    .host
                    .already_exists(&schema, &table)
                    .map_err(host_error)?;
                Ok(Value::from(exists))
            }
            "get_columns_in_table" => {
                let (schema, table): (String, String) = from_args(args)?;
                let columns = self.host.get_columns(&schema, &table).map_err(host_error)?;
                Ok(Value::from_serialize(&columns))
            }
            "get_missing_columns" => {
                let (fs, ft, ts, tt): (String, String, String, String) = from_args(args)?;
                let columns = self
                    .host
                    .get_missing_columns(&fs, &ft, &ts, &tt)
                    .map_err(host_error)?;
                Ok(Value::from_serialize(&columns))
            }
            other => Err(Error::new(
                ErrorKind::UnknownMethod,
                format!("adapter has no method named {}", other),
            )),
        }
    }
}
