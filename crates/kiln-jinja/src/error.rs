//! Error types for kiln-jinja

use thiserror::Error;

/// Errors raised by the host while a template is being rendered.
///
/// These travel through minijinja as the error source so the caller can
/// tell a missing ref apart from a plain syntax problem.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum HostError {
    /// `ref()` named a model that does not exist or is disabled
    #[error("Model '{node}' depends on model '{target}' which was not found or is disabled")]
    RefNotFound { node: String, target: String },

    /// `ref()` named a model the node does not depend on
    #[error("Model '{node}' references '{target}' outside of its declared dependencies")]
    RefOutsideDependencies { node: String, target: String },

    /// `var()` named an undefined variable and gave no default
    #[error("Required var '{name}' not found in config for model '{node}'")]
    UndefinedVar { node: String, name: String },

    /// A variable is defined but set to null
    #[error("Field '{name}' is defined but null in config for model '{node}'")]
    NullVar { node: String, name: String },

    /// `config()` was handed something it cannot store
    #[error("Invalid config: {0}")]
    Config(String),

    /// Database introspection failed
    #[error("Adapter error: {0}")]
    Adapter(String),
}

/// Jinja templating errors
#[derive(Error, Debug)]
pub enum JinjaError {
    /// Template render error (J001)
    #[error("[J001] Jinja render error: {0}")]
    RenderError(String),

    /// Error surfaced by a template function (J002)
    #[error("[J002] {0}")]
    Host(HostError),

    /// A macro body calls ref() or var() (J003)
    #[error("[J003] Macro '{name}' in {file} calls {call}(), which is not allowed inside macros")]
    MacroMisuse {
        file: String,
        name: String,
        call: String,
    },

    /// A called function or macro does not exist (J004)
    #[error("[J004] Unknown macro or function: {0}")]
    UnknownMacro(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias for JinjaError
pub type JinjaResult<T> = Result<T, JinjaError>;

impl From<minijinja::Error> for JinjaError {
    fn from(err: minijinja::Error) -> Self {
        let mut source = std::error::Error::source(&err);
        while let Some(inner) = source {
            if let Some(host) = inner.downcast_ref::<HostError>() {
                return JinjaError::Host(host.clone());
            }
            source = inner.source();
        }
        match err.kind() {
            minijinja::ErrorKind::UnknownFunction => JinjaError::UnknownMacro(
                err.detail().map(str::to_string).unwrap_or_else(|| err.to_string()),
            ),
            _ => JinjaError::RenderError(format!("{:#}", err)),
        }
    }
}

/// Wrap a host error so it survives the trip through minijinja
pub(crate) fn host_error(err: HostError) -> minijinja::Error {
    minijinja::Error::new(minijinja::ErrorKind::InvalidOperation, err.to_string()).with_source(err)
}
