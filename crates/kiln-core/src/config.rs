//! Project configuration (`kiln_project.yml`)

use crate::error::{CoreError, CoreResult};
use crate::node::CONFIG_KEYS;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Name of the project file at the root of every project and package
pub const PROJECT_FILE: &str = "kiln_project.yml";

/// Main project configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct ProjectConfig {
    /// Project (and package) name
    pub name: String,

    #[serde(default)]
    pub version: Option<String>,

    /// Directories containing model files
    #[serde(default = "default_source_paths")]
    pub source_paths: Vec<String>,

    /// Directories containing data tests
    #[serde(default = "default_test_paths")]
    pub test_paths: Vec<String>,

    /// Directories containing analyses
    #[serde(default = "default_analysis_paths")]
    pub analysis_paths: Vec<String>,

    /// Directories containing macro files
    #[serde(default = "default_macro_paths")]
    pub macro_paths: Vec<String>,

    /// Directories containing seed CSVs
    #[serde(default = "default_data_paths")]
    pub data_paths: Vec<String>,

    /// Where graph and build artifacts are written
    #[serde(default = "default_target_path")]
    pub target_path: String,

    /// Where installed packages live
    #[serde(default = "default_modules_path")]
    pub modules_path: String,

    /// Directories removed by `kiln clean`
    #[serde(default = "default_clean_targets")]
    pub clean_targets: Vec<String>,

    /// Default target name
    #[serde(default)]
    pub target: Option<String>,

    /// Named warehouse targets
    #[serde(default)]
    pub targets: BTreeMap<String, TargetConfig>,

    /// Statements run before any node, in their own transaction
    #[serde(default)]
    pub on_run_start: Vec<String>,

    /// Statements run after every node, in their own transaction
    #[serde(default)]
    pub on_run_end: Vec<String>,

    /// Model config tree keyed by package then directory segments
    #[serde(default)]
    pub models: serde_yaml::Mapping,

    /// Archive declarations
    #[serde(default)]
    pub archive: Vec<ArchiveConfig>,

    /// Package dependencies
    #[serde(default)]
    pub packages: Vec<PackageSpec>,
}

/// Supported warehouse types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DbType {
    /// DuckDB (default)
    #[default]
    DuckDb,
    /// PostgreSQL
    Postgres,
    /// Amazon Redshift
    Redshift,
    /// Snowflake
    Snowflake,
}

impl std::fmt::Display for DbType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DbType::DuckDb => write!(f, "duckdb"),
            DbType::Postgres => write!(f, "postgres"),
            DbType::Redshift => write!(f, "redshift"),
            DbType::Snowflake => write!(f, "snowflake"),
        }
    }
}

/// One warehouse connection profile
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetConfig {
    #[serde(rename = "type", default)]
    pub db_type: DbType,

    /// Database path (DuckDB file or `:memory:`)
    #[serde(default = "default_db_path")]
    pub path: String,

    /// Schema nodes are built into
    pub schema: String,

    /// Worker count
    #[serde(default = "default_threads")]
    pub threads: usize,

    /// Dialect-specific credentials (host, user, ...), kept opaque
    #[serde(flatten)]
    pub credentials: BTreeMap<String, serde_yaml::Value>,
}

/// Archive declaration: one source/target schema pair and its tables
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ArchiveConfig {
    pub source_schema: String,
    pub target_schema: String,
    pub tables: Vec<ArchiveTableConfig>,
}

/// A single archived table
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ArchiveTableConfig {
    pub source_table: String,
    pub target_table: String,
    pub updated_at: String,
    pub unique_key: String,
}

/// A package dependency
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PackageSpec {
    /// Local directory holding the package
    pub local: String,
}

fn default_source_paths() -> Vec<String> {
    vec!["models".to_string()]
}

fn default_test_paths() -> Vec<String> {
    vec!["tests".to_string()]
}

fn default_analysis_paths() -> Vec<String> {
    vec!["analysis".to_string()]
}

fn default_macro_paths() -> Vec<String> {
    vec!["macros".to_string()]
}

fn default_data_paths() -> Vec<String> {
    vec!["data".to_string()]
}

fn default_target_path() -> String {
    "target".to_string()
}

fn default_modules_path() -> String {
    "kiln_modules".to_string()
}

fn default_clean_targets() -> Vec<String> {
    vec!["target".to_string()]
}

fn default_db_path() -> String {
    "warehouse.duckdb".to_string()
}

fn default_threads() -> usize {
    1
}

impl ProjectConfig {
    /// Load configuration from a file
    pub fn load(path: &Path) -> CoreResult<Self> {
        if !path.exists() {
            return Err(CoreError::ConfigNotFound {
                path: path.display().to_string(),
            });
        }

        let content = std::fs::read_to_string(path).map_err(|e| CoreError::IoWithPath {
            path: path.display().to_string(),
            source: e,
        })?;
        let config: ProjectConfig =
            serde_yaml::from_str(&content).map_err(|e| CoreError::ConfigParseError {
                path: path.display().to_string(),
                message: e.to_string(),
            })?;
        config.validate()?;
        Ok(config)
    }

    /// Load `kiln_project.yml` from a project directory
    pub fn load_from_dir(dir: &Path) -> CoreResult<Self> {
        Self::load(&dir.join(PROJECT_FILE))
    }

    fn validate(&self) -> CoreResult<()> {
        if self.name.trim().is_empty() {
            return Err(CoreError::ConfigInvalid {
                message: "project name must not be empty".to_string(),
            });
        }
        if self.name.contains('.') {
            return Err(CoreError::ConfigInvalid {
                message: format!("project name '{}' must not contain '.'", self.name),
            });
        }
        for (name, target) in &self.targets {
            if target.threads == 0 {
                return Err(CoreError::ConfigInvalid {
                    message: format!("target '{}' must use at least one thread", name),
                });
            }
        }
        Ok(())
    }

    /// Resolve the target to run against: the explicit name, then the
    /// configured default, then the only target if exactly one exists.
    pub fn active_target(&self, name: Option<&str>) -> CoreResult<(String, &TargetConfig)> {
        let wanted = match (name, self.target.as_deref()) {
            (Some(n), _) | (None, Some(n)) => n.to_string(),
            (None, None) if self.targets.len() == 1 => {
                self.targets.keys().next().cloned().unwrap_or_default()
            }
            (None, None) => "dev".to_string(),
        };
        match self.targets.get(&wanted) {
            Some(t) => Ok((wanted, t)),
            None => Err(CoreError::TargetNotFound {
                name: wanted,
                available: self
                    .targets
                    .keys()
                    .cloned()
                    .collect::<Vec<_>>()
                    .join(", "),
            }),
        }
    }

    /// Walk the `models:` tree along `fqn` and collect every config key met
    /// on the way, least specific first.
    ///
    /// The first fqn segment is the package name, so keys sitting directly
    /// under `models:` never apply.
    pub fn tree_config_for(&self, fqn: &[String]) -> CoreResult<Vec<(String, serde_json::Value)>> {
        let mut layers = Vec::new();
        let mut level = &self.models;
        for segment in fqn {
            let Some(next) = level.get(segment.as_str()).and_then(|v| v.as_mapping())
            else {
                break;
            };
            for (key, value) in next {
                let Some(key) = key.as_str() else { continue };
                if CONFIG_KEYS.contains(&key) {
                    layers.push((key.to_string(), yaml_to_json(value)?));
                }
            }
            level = next;
        }
        Ok(layers)
    }
}

/// Convert a YAML value to JSON
pub fn yaml_to_json(value: &serde_yaml::Value) -> CoreResult<serde_json::Value> {
    Ok(serde_json::to_value(value)?)
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
