//! The node model shared by every stage of the pipeline.
//!
//! A [`Node`] is created once per discovered source file (or per derived
//! schema test / archive table), gains dependency edges during reference
//! resolution, and gains compiled text when the compiler visits it.

use crate::error::{CoreError, CoreResult};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// Resource kind of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
    /// Templated select materialized into the warehouse
    Model,
    /// Data test or schema test
    Test,
    /// Compiled but never executed
    Analysis,
    /// Slowly-changing-dimension snapshot of a source table
    Archive,
    /// Macro definition file
    Macro,
}

impl ResourceKind {
    /// All kinds in declaration order
    pub const ALL: [ResourceKind; 5] = [
        ResourceKind::Model,
        ResourceKind::Test,
        ResourceKind::Analysis,
        ResourceKind::Archive,
        ResourceKind::Macro,
    ];

    /// Lowercase name used in ids and build paths
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::Model => "model",
            ResourceKind::Test => "test",
            ResourceKind::Analysis => "analysis",
            ResourceKind::Archive => "archive",
            ResourceKind::Macro => "macro",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResourceKind {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ResourceKind::ALL
            .into_iter()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| CoreError::InvalidNodeId {
                value: s.to_string(),
            })
    }
}

/// Globally unique node identifier: `(kind, package, name)`.
///
/// Rendered as `model.my_project.users`. Serialized in the same textual form
/// so it can be used as a map key in the graph artifact.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId {
    pub kind: ResourceKind,
    pub package: String,
    pub name: String,
}

impl NodeId {
    /// Build an id from its parts
    pub fn new(kind: ResourceKind, package: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            kind,
            package: package.into(),
            name: name.into(),
        }
    }

    /// Shorthand for a model id
    pub fn model(package: impl Into<String>, name: impl Into<String>) -> Self {
        Self::new(ResourceKind::Model, package, name)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.kind, self.package, self.name)
    }
}

impl FromStr for NodeId {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || CoreError::InvalidNodeId {
            value: s.to_string(),
        };
        let mut parts = s.splitn(3, '.');
        let kind = parts.next().ok_or_else(invalid)?;
        let package = parts.next().filter(|p| !p.is_empty()).ok_or_else(invalid)?;
        let name = parts.next().filter(|n| !n.is_empty()).ok_or_else(invalid)?;
        Ok(Self {
            kind: kind.parse().map_err(|_| invalid())?,
            package: package.to_string(),
            name: name.to_string(),
        })
    }
}

impl Serialize for NodeId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for NodeId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Materialization strategy for a model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Materialization {
    /// Create a view
    #[default]
    View,
    /// Create a table
    Table,
    /// Append to an existing table, creating it on first run
    Incremental,
    /// Never executed; inlined as a CTE into consumers
    Ephemeral,
}

impl Materialization {
    /// Lowercase name as written in config
    pub fn as_str(&self) -> &'static str {
        match self {
            Materialization::View => "view",
            Materialization::Table => "table",
            Materialization::Incremental => "incremental",
            Materialization::Ephemeral => "ephemeral",
        }
    }
}

impl fmt::Display for Materialization {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Materialization {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "view" => Ok(Materialization::View),
            "table" => Ok(Materialization::Table),
            "incremental" => Ok(Materialization::Incremental),
            "ephemeral" => Ok(Materialization::Ephemeral),
            other => Err(other.to_string()),
        }
    }
}

/// Keys a config layer may set. Anything else in a project config tree is a
/// directory name.
pub const CONFIG_KEYS: &[&str] = &[
    "enabled",
    "materialized",
    "dist",
    "sort",
    "sort_type",
    "sql_where",
    "unique_key",
    "pre-hook",
    "post-hook",
    "vars",
    "tags",
];

/// Resolved per-node configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeConfig {
    pub enabled: bool,
    pub materialized: Materialization,
    #[serde(default)]
    pub pre_hook: Vec<String>,
    #[serde(default)]
    pub post_hook: Vec<String>,
    #[serde(default)]
    pub vars: BTreeMap<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dist: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sort: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sort_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sql_where: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unique_key: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, Value>,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            materialized: Materialization::View,
            pre_hook: Vec::new(),
            post_hook: Vec::new(),
            vars: BTreeMap::new(),
            dist: None,
            sort: Vec::new(),
            sort_type: None,
            sql_where: None,
            unique_key: None,
            extra: BTreeMap::new(),
        }
    }
}

impl NodeConfig {
    /// Merge one `key = value` pair into this config.
    ///
    /// Hooks append, `vars` extend, everything else replaces. `tags` are
    /// returned to the caller through `tags` since they live on the node.
    pub fn apply(
        &mut self,
        node: &str,
        key: &str,
        value: &Value,
        tags: &mut BTreeSet<String>,
    ) -> CoreResult<()> {
        let invalid = |reason: &str| CoreError::InvalidConfigValue {
            node: node.to_string(),
            key: key.to_string(),
            reason: reason.to_string(),
        };
        match key {
            "enabled" => {
                self.enabled = value.as_bool().ok_or_else(|| invalid("expected a boolean"))?;
            }
            "materialized" => {
                let text = value.as_str().ok_or_else(|| invalid("expected a string"))?;
                self.materialized =
                    text.parse()
                        .map_err(|value| CoreError::InvalidMaterialization {
                            node: node.to_string(),
                            value,
                        })?;
            }
            "pre-hook" | "pre_hook" => self.pre_hook.extend(string_list(value, &invalid)?),
            "post-hook" | "post_hook" => self.post_hook.extend(string_list(value, &invalid)?),
            "vars" => {
                let map = value
                    .as_object()
                    .ok_or_else(|| invalid("expected a mapping"))?;
                for (k, v) in map {
                    self.vars.insert(k.clone(), v.clone());
                }
            }
            "dist" => self.dist = Some(scalar_string(value, &invalid)?),
            "sort" => self.sort = string_list(value, &invalid)?,
            "sort_type" => self.sort_type = Some(scalar_string(value, &invalid)?),
            "sql_where" => self.sql_where = Some(scalar_string(value, &invalid)?),
            "unique_key" => self.unique_key = Some(scalar_string(value, &invalid)?),
            "tags" => tags.extend(string_list(value, &invalid)?),
            other => {
                log::debug!("Unrecognized config key '{}' on {}", other, node);
                self.extra.insert(other.to_string(), value.clone());
            }
        }
        Ok(())
    }

    /// Merge an ordered list of layers, least specific first
    pub fn apply_layer(
        &mut self,
        node: &str,
        layer: &[(String, Value)],
        tags: &mut BTreeSet<String>,
    ) -> CoreResult<()> {
        for (key, value) in layer {
            self.apply(node, key, value, tags)?;
        }
        Ok(())
    }
}

fn scalar_string(value: &Value, invalid: &dyn Fn(&str) -> CoreError) -> CoreResult<String> {
    match value {
        Value::String(s) => Ok(s.clone()),
        Value::Number(n) => Ok(n.to_string()),
        Value::Bool(b) => Ok(b.to_string()),
        _ => Err(invalid("expected a scalar")),
    }
}

fn string_list(value: &Value, invalid: &dyn Fn(&str) -> CoreError) -> CoreResult<Vec<String>> {
    match value {
        Value::Null => Ok(Vec::new()),
        Value::Array(items) => items.iter().map(|v| scalar_string(v, invalid)).collect(),
        other => Ok(vec![scalar_string(other, invalid)?]),
    }
}

/// A `ref()` call captured while rendering: optional package plus target name
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RefCall {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub package: Option<String>,
    pub name: String,
}

impl RefCall {
    pub fn new(package: Option<String>, name: impl Into<String>) -> Self {
        Self {
            package,
            name: name.into(),
        }
    }
}

impl fmt::Display for RefCall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.package {
            Some(p) => write!(f, "{}.{}", p, self.name),
            None => f.write_str(&self.name),
        }
    }
}

/// Resolved dependency sets
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dependencies {
    #[serde(default)]
    pub nodes: Vec<NodeId>,
    #[serde(default)]
    pub macros: Vec<String>,
}

/// One archived table: where to read, where to write, how to detect changes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchiveTarget {
    pub source_schema: String,
    pub source_table: String,
    pub target_schema: String,
    pub target_table: String,
    pub updated_at: String,
    pub unique_key: String,
}

/// A unit of work
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub unique_id: NodeId,
    pub fqn: Vec<String>,
    /// Path relative to the package's source directory
    pub path: PathBuf,
    /// Path of the file the node came from, relative to the package root
    pub original_file_path: PathBuf,
    pub raw_sql: String,
    #[serde(default)]
    pub config: NodeConfig,
    #[serde(default)]
    pub tags: BTreeSet<String>,
    #[serde(default)]
    pub refs: Vec<RefCall>,
    #[serde(default)]
    pub depends_on: Dependencies,
    pub empty: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub archive: Option<ArchiveTarget>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compiled_sql: Option<String>,
    #[serde(default)]
    pub extra_ctes: Vec<NodeId>,
    #[serde(default)]
    pub extra_ctes_injected: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub injected_sql: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wrapped_sql: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub build_path: Option<PathBuf>,
}

impl Node {
    /// Create an unparsed node from its source text
    pub fn new(
        unique_id: NodeId,
        fqn: Vec<String>,
        path: PathBuf,
        original_file_path: PathBuf,
        raw_sql: String,
    ) -> Self {
        let empty = raw_sql.trim().is_empty();
        Self {
            unique_id,
            fqn,
            path,
            original_file_path,
            raw_sql,
            config: NodeConfig::default(),
            tags: BTreeSet::new(),
            refs: Vec::new(),
            depends_on: Dependencies::default(),
            empty,
            archive: None,
            compiled_sql: None,
            extra_ctes: Vec::new(),
            extra_ctes_injected: false,
            injected_sql: None,
            wrapped_sql: None,
            build_path: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.unique_id.name
    }

    pub fn package(&self) -> &str {
        &self.unique_id.package
    }

    pub fn kind(&self) -> ResourceKind {
        self.unique_id.kind
    }

    pub fn materialization(&self) -> Materialization {
        self.config.materialized
    }

    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    pub fn is_ephemeral(&self) -> bool {
        self.kind() == ResourceKind::Model && self.materialization() == Materialization::Ephemeral
    }

    /// A model that must finish executing before its dependents may run
    pub fn is_blocking(&self) -> bool {
        self.kind() == ResourceKind::Model && self.materialization() != Materialization::Ephemeral
    }

    /// Whether the node carries the given tag
    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.contains(tag)
    }

    /// Record a dependency, keeping repeats (they collapse in the graph)
    pub fn add_dependency(&mut self, id: NodeId) {
        self.depends_on.nodes.push(id);
    }

    /// Forget anything a previous compile wrote
    pub fn reset_compiled(&mut self) {
        self.compiled_sql = None;
        self.extra_ctes.clear();
        self.extra_ctes_injected = false;
        self.injected_sql = None;
        self.wrapped_sql = None;
        self.build_path = None;
    }
}

#[cfg(test)]
#[path = "node_test.rs"]
mod tests;
