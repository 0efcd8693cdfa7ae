//! Template functions: ref(), var(), config() and the adapter helpers.
//!
//! Every function is a closure over the node's [`RenderHost`], built fresh
//! for each render.

use crate::error::host_error;
use crate::host::RenderHost;
use kiln_core::RefCall;
use minijinja::value::{Kwargs, Rest, Value};
use minijinja::{Error, ErrorKind, State};
use std::sync::Arc;

pub(crate) type SharedHost = Arc<dyn RenderHost>;

/// Create the ref() function
///
/// Usage in templates:
/// ```jinja
/// select * from {{ ref('orders') }}
/// select * from {{ ref('shared', 'calendar') }}
/// ```
pub(crate) fn make_ref_fn(
    host: SharedHost,
) -> impl Fn(Rest<String>) -> Result<String, Error> + Send + Sync + Clone + 'static {
    move |args: Rest<String>| {
        let call = match args.as_slice() {
            [name] => RefCall::new(None, name.as_str()),
            [package, name] => RefCall::new(Some(package.clone()), name.as_str()),
            _ => {
                return Err(Error::new(
                    ErrorKind::InvalidOperation,
                    format!(
                        "ref() takes at most two arguments ({} given)",
                        args.len()
                    ),
                ))
            }
        };
        host.resolve_ref(&call).map_err(host_error)
    }
}

/// Create the var() function
///
/// String values are themselves rendered, so a var may refer to `target`
/// or other globals.
///
/// ```jinja
/// {{ var('start_date') }}
/// {{ var('missing', 'default_value') }}
/// ```
pub(crate) fn make_var_fn(
    host: SharedHost,
) -> impl Fn(&State<'_, '_>, String, Option<Value>) -> Result<Value, Error> + Send + Sync + Clone + 'static
{
    move |state: &State<'_, '_>, name: String, default: Option<Value>| {
        let default = default.map(|v| minijinja_value_to_json(&v));
        match host.resolve_var(&name, default).map_err(host_error)? {
            serde_json::Value::String(text) if text.contains("{{") || text.contains("{%") => {
                Ok(Value::from(state.env().render_str(&text, ())?))
            }
            other => Ok(json_to_minijinja_value(&other)),
        }
    }
}

/// Create the config() function
///
/// ```jinja
/// {{ config(materialized='incremental', sql_where='id > 10') }}
/// ```
pub(crate) fn make_config_fn(
    host: SharedHost,
) -> impl Fn(Kwargs) -> Result<String, Error> + Send + Sync + Clone + 'static {
    move |kwargs: Kwargs| {
        for key in kwargs.args() {
            let value = kwargs.get::<Value>(key).map_err(|e| {
                Error::new(
                    ErrorKind::InvalidOperation,
                    format!("failed to get config kwarg '{}': {}", key, e),
                )
            })?;
            host.accept_config(key, minijinja_value_to_json(&value))
                .map_err(host_error)?;
        }

        // config() renders as nothing
        Ok(String::new())
    }
}

pub(crate) fn make_already_exists_fn(
    host: SharedHost,
) -> impl Fn(String, String) -> Result<bool, Error> + Send + Sync + Clone + 'static {
    move |schema: String, table: String| host.already_exists(&schema, &table).map_err(host_error)
}

pub(crate) fn make_get_columns_fn(
    host: SharedHost,
) -> impl Fn(String, String) -> Result<Value, Error> + Send + Sync + Clone + 'static {
    move |schema: String, table: String| {
        let columns = host.get_columns(&schema, &table).map_err(host_error)?;
        Ok(Value::from_serialize(&columns))
    }
}

pub(crate) fn make_get_missing_columns_fn(
    host: SharedHost,
) -> impl Fn(String, String, String, String) -> Result<Value, Error> + Send + Sync + Clone + 'static
{
    move |from_schema: String, from_table: String, to_schema: String, to_table: String| {
        let columns = host
            .get_missing_columns(&from_schema, &from_table, &to_schema, &to_table)
            .map_err(host_error)?;
        Ok(Value::from_serialize(&columns))
    }
}

/// Convert serde_json::Value to minijinja::Value
pub(crate) fn json_to_minijinja_value(json: &serde_json::Value) -> Value {
    match json {
        serde_json::Value::Null => Value::from(()),
        serde_json::Value::Bool(b) => Value::from(*b),
        serde_json::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Value::from(i)
            } else if let Some(f) = n.as_f64() {
                Value::from(f)
            } else {
                Value::from(n.to_string())
            }
        }
        serde_json::Value::String(s) => Value::from(s.as_str()),
        serde_json::Value::Array(arr) => {
            Value::from(arr.iter().map(json_to_minijinja_value).collect::<Vec<_>>())
        }
        serde_json::Value::Object(obj) => Value::from_iter(
            obj.iter()
                .map(|(k, v)| (k.clone(), json_to_minijinja_value(v))),
        ),
    }
}

/// Convert a minijinja Value to a serde_json::Value
pub(crate) fn minijinja_value_to_json(val: &Value) -> serde_json::Value {
    use minijinja::value::ValueKind;
    match val.kind() {
        ValueKind::Undefined | ValueKind::None => serde_json::Value::Null,
        ValueKind::Bool => serde_json::Value::Bool(val.is_true()),
        ValueKind::Number => {
            if let Ok(i) = i64::try_from(val.clone()) {
                serde_json::Value::Number(i.into())
            } else if let Ok(f) = f64::try_from(val.clone()) {
                serde_json::Number::from_f64(f)
                    .map(serde_json::Value::Number)
                    .unwrap_or(serde_json::Value::Null)
            } else {
                serde_json::Value::Null
            }
        }
        ValueKind::String => {
            serde_json::Value::String(val.as_str().unwrap_or_default().to_string())
        }
        ValueKind::Seq => serde_json::Value::Array(
            val.try_iter()
                .map(|iter| iter.map(|v| minijinja_value_to_json(&v)).collect())
                .unwrap_or_default(),
        ),
        ValueKind::Map => {
            let mut map = serde_json::Map::new();
            if let Ok(keys) = val.try_iter() {
                for key in keys {
                    if let Ok(v) = val.get_item(&key) {
                        map.insert(key.to_string(), minijinja_value_to_json(&v));
                    }
                }
            }
            serde_json::Value::Object(map)
        }
        _ => serde_json::Value::String(val.to_string()),
    }
}

#[cfg(test)]
#[path = "functions_test.rs"]
mod tests;
