//! Error types for kiln-core

use thiserror::Error;

/// Core error type for kiln
#[derive(Error, Debug)]
pub enum CoreError {
    /// E001: Configuration file not found
    #[error("[E001] Project file not found: {path}")]
    ConfigNotFound { path: String },

    /// E002: Failed to parse configuration file
    #[error("[E002] Failed to parse {path}: {message}")]
    ConfigParseError { path: String, message: String },

    /// E003: Invalid configuration value
    #[error("[E003] Invalid config: {message}")]
    ConfigInvalid { message: String },

    /// E004: Project directory not found
    #[error("[E004] Project directory not found: {path}")]
    ProjectNotFound { path: String },

    /// E005: Target missing from the project file
    #[error("[E005] Target '{name}' is not defined in kiln_project.yml (available: {available})")]
    TargetNotFound { name: String, available: String },

    /// E006: Two source files produced the same unique id
    #[error("[E006] Duplicate node '{id}' found in {path1} and {path2}")]
    DuplicateNode {
        id: String,
        path1: String,
        path2: String,
    },

    /// E007: Circular dependency detected
    #[error("[E007] Circular dependency detected: {cycle}")]
    CircularDependency { cycle: String },

    /// E008: Node missing from the graph (never loaded, or pruned because disabled)
    #[error("[E008] Couldn't find node '{id}' -- does it exist or is it disabled?")]
    NodeNotFound { id: String },

    /// E009: Invalid selector
    #[error("[E009] Invalid selector '{selector}': {reason}")]
    InvalidSelector { selector: String, reason: String },

    /// E010: ref() names a model that does not exist
    #[error("[E010] Model '{node}' depends on model '{target}'{package} which was not found")]
    RefTargetNotFound {
        node: String,
        target: String,
        package: String,
    },

    /// E011: an enabled node refs a disabled model
    #[error("[E011] Model '{node}' depends on model '{target}' which is disabled in the project config")]
    DisabledDependency { node: String, target: String },

    /// E012: Unknown materialization
    #[error("[E012] Invalid materialization parameter '{value}' in {node}")]
    InvalidMaterialization { node: String, value: String },

    /// E013: Malformed config value
    #[error("[E013] Invalid value for config key '{key}' in {node}: {reason}")]
    InvalidConfigValue {
        node: String,
        key: String,
        reason: String,
    },

    /// E014: Invalid node identifier text
    #[error("[E014] Invalid node id '{value}': expected '<kind>.<package>.<name>'")]
    InvalidNodeId { value: String },

    /// E015: Schema test document could not be interpreted
    #[error("[E015] Invalid schema test in {path}: {reason}")]
    InvalidSchemaTest { path: String, reason: String },

    /// E016: Graph artifact missing
    #[error("[E016] Graph file not found at {path}. Run `kiln compile` first")]
    GraphFileNotFound { path: String },

    /// E017: IO error
    #[error("[E017] IO error: {0}")]
    Io(#[from] std::io::Error),

    /// E018: IO error with file path context
    #[error("[E018] Failed to read '{path}': {source}")]
    IoWithPath {
        path: String,
        source: std::io::Error,
    },

    /// E019: YAML parse error
    #[error("[E019] YAML parse error: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias for CoreError
pub type CoreResult<T> = Result<T, CoreError>;
