//! The seam between templates and the rest of the tool.
//!
//! Rendering happens twice for every node: once while parsing, to learn
//! its refs and in-model config, and once while compiling, with refs
//! resolved to relation names and the database available for
//! introspection. Both passes use the same template functions and differ
//! only in the [`RenderHost`] behind them.

use crate::error::HostError;
use kiln_core::RefCall;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

/// A column as exposed to templates
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TemplateColumn {
    pub name: String,
    /// Identifier-quoted name
    pub quoted: String,
    pub data_type: String,
}

impl TemplateColumn {
    pub fn new(name: impl Into<String>, data_type: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            quoted: format!("\"{}\"", name),
            name,
            data_type: data_type.into(),
        }
    }
}

/// Everything a template may ask of its surroundings
pub trait RenderHost: Send + Sync {
    /// Resolve `ref([package,] name)` to the text substituted in the SQL
    fn resolve_ref(&self, call: &RefCall) -> Result<String, HostError>;

    /// Look up a variable. String values are rendered by the caller.
    fn resolve_var(
        &self,
        name: &str,
        default: Option<serde_json::Value>,
    ) -> Result<serde_json::Value, HostError>;

    /// Record one `config(key=value)` pair
    fn accept_config(&self, key: &str, value: serde_json::Value) -> Result<(), HostError>;

    fn already_exists(&self, schema: &str, table: &str) -> Result<bool, HostError>;

    fn get_columns(&self, schema: &str, table: &str) -> Result<Vec<TemplateColumn>, HostError>;

    /// Columns in `from` that `to` lacks
    fn get_missing_columns(
        &self,
        from_schema: &str,
        from_table: &str,
        to_schema: &str,
        to_table: &str,
    ) -> Result<Vec<TemplateColumn>, HostError>;
}

/// What the parse pass learned about a node
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParseCapture {
    pub refs: Vec<RefCall>,
    pub config: Vec<(String, serde_json::Value)>,
}

/// Host used while parsing: records refs and config, resolves nothing.
///
/// `ref()` renders as the bare target name, `var()` falls back to its
/// default (or an empty string) when the variable is not known yet, and
/// the database looks empty.
#[derive(Debug, Default)]
pub struct ParseHost {
    vars: BTreeMap<String, serde_json::Value>,
    capture: Arc<Mutex<ParseCapture>>,
}

impl ParseHost {
    /// Parse host seeded with the variables known from project config
    pub fn new(vars: BTreeMap<String, serde_json::Value>) -> Self {
        Self {
            vars,
            capture: Arc::new(Mutex::new(ParseCapture::default())),
        }
    }

    /// Take everything captured so far
    pub fn take(&self) -> ParseCapture {
        let mut capture = self.capture.lock().unwrap_or_else(|p| p.into_inner());
        std::mem::take(&mut *capture)
    }
}

impl RenderHost for ParseHost {
    fn resolve_ref(&self, call: &RefCall) -> Result<String, HostError> {
        let mut capture = self.capture.lock().unwrap_or_else(|p| p.into_inner());
        if !capture.refs.contains(call) {
            capture.refs.push(call.clone());
        }
        Ok(call.name.clone())
    }

    fn resolve_var(
        &self,
        name: &str,
        default: Option<serde_json::Value>,
    ) -> Result<serde_json::Value, HostError> {
        Ok(self
            .vars
            .get(name)
            .cloned()
            .or(default)
            .unwrap_or_else(|| serde_json::Value::String(String::new())))
    }

    fn accept_config(&self, key: &str, value: serde_json::Value) -> Result<(), HostError> {
        let mut capture = self.capture.lock().unwrap_or_else(|p| p.into_inner());
        capture.config.push((key.to_string(), value));
        Ok(())
    }

    fn already_exists(&self, _schema: &str, _table: &str) -> Result<bool, HostError> {
        Ok(false)
    }

    fn get_columns(&self, _schema: &str, _table: &str) -> Result<Vec<TemplateColumn>, HostError> {
        Ok(Vec::new())
    }

    fn get_missing_columns(
        &self,
        _from_schema: &str,
        _from_table: &str,
        _to_schema: &str,
        _to_table: &str,
    ) -> Result<Vec<TemplateColumn>, HostError> {
        Ok(Vec::new())
    }
}

#[cfg(test)]
#[path = "host_test.rs"]
mod tests;
