//! kiln-jinja - Jinja templating layer for kiln
//!
//! Renders node templates with `ref()`, `var()`, `config()`, `this`,
//! `target` and the adapter helpers, resolves macros per package, and
//! renders run and model hooks.

pub mod context;
pub mod environment;
pub mod error;
mod functions;
pub mod host;
pub mod macros;

pub use context::{Relation, RunContext, TargetContext};
pub use environment::{HookState, JinjaEnvironment};
pub use error::{HostError, JinjaError, JinjaResult};
pub use host::{ParseCapture, ParseHost, RenderHost, TemplateColumn};
pub use macros::{MacroRegistry, GLOBAL_PACKAGE};
