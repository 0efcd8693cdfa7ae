//! Jinja environment setup for kiln

use crate::context::{AdapterNamespace, Relation, RunContext, TargetContext};
use crate::error::{JinjaError, JinjaResult};
use crate::functions::{
    make_already_exists_fn, make_config_fn, make_get_columns_fn, make_get_missing_columns_fn,
    make_ref_fn, make_var_fn, SharedHost,
};
use crate::host::{ParseCapture, ParseHost};
use crate::macros::MacroRegistry;
use kiln_core::{MacroFile, Node};
use minijinja::{Environment, Value};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Which end of a run a hook belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookState {
    Start,
    End,
}

impl HookState {
    pub fn as_str(&self) -> &'static str {
        match self {
            HookState::Start => "start",
            HookState::End => "end",
        }
    }
}

/// Jinja templating environment for kiln.
///
/// Holds the macro templates and run-wide globals. Each node render works
/// on a clone with that node's `ref`, `var`, `config` and `this` added.
pub struct JinjaEnvironment {
    env: Environment<'static>,
    macros: MacroRegistry,
    run: RunContext,
    target: TargetContext,
}

impl JinjaEnvironment {
    /// Create an environment with the project's macros loaded
    pub fn new(
        macro_files: &[MacroFile],
        run: RunContext,
        target: TargetContext,
    ) -> JinjaResult<Self> {
        let macros = MacroRegistry::new(macro_files)?;
        let mut env = Environment::new();
        for (name, source) in macros.templates() {
            env.add_template_owned(name, source)?;
        }
        env.add_global("target", Value::from_serialize(&target));
        env.add_global("invocation_id", Value::from(run.invocation_id.as_str()));
        env.add_global("run_started_at", Value::from(run.run_started_at.as_str()));
        Ok(Self {
            env,
            macros,
            run,
            target,
        })
    }

    pub fn macros(&self) -> &MacroRegistry {
        &self.macros
    }

    pub fn run(&self) -> &RunContext {
        &self.run
    }

    pub fn target(&self) -> &TargetContext {
        &self.target
    }

    /// Render a node's raw SQL against `host`
    pub fn render_node(
        &self,
        node: &Node,
        this: Relation,
        host: SharedHost,
    ) -> JinjaResult<String> {
        let mut env = self.env.clone();
        env.add_function("ref", make_ref_fn(host.clone()));
        env.add_function("var", make_var_fn(host.clone()));
        env.add_function("config", make_config_fn(host.clone()));
        env.add_function("already_exists", make_already_exists_fn(host.clone()));
        env.add_function("get_columns_in_table", make_get_columns_fn(host.clone()));
        env.add_function(
            "get_missing_columns",
            make_get_missing_columns_fn(host.clone()),
        );
        env.add_global("adapter", Value::from_object(AdapterNamespace { host }));
        env.add_global("this", Value::from_object(this));

        let source = format!(
            "{}{}",
            self.macros.prelude(node.package()),
            node.raw_sql
        );
        let name = node.original_file_path.display().to_string();
        env.render_named_str(&name, &source, ()).map_err(|e| {
            log::debug!("Failed to render {}: {:#}", node.unique_id, e);
            JinjaError::from(e)
        })
    }

    /// Parse pass: render with a recording host and return what the node
    /// asked for. `vars` are the variables known from project config.
    pub fn parse_node(
        &self,
        node: &Node,
        schema: &str,
        vars: BTreeMap<String, serde_json::Value>,
    ) -> JinjaResult<(String, ParseCapture)> {
        let host = Arc::new(ParseHost::new(vars));
        let rendered = self.render_node(
            node,
            Relation::new(schema, node.name()),
            host.clone(),
        )?;
        Ok((rendered, host.take()))
    }

    /// Render an `on-run-start` / `on-run-end` or model hook. Hooks see
    /// `target`, `state`, `invocation_id` and `run_started_at`.
    pub fn render_hook(&self, hook: &str, state: HookState) -> JinjaResult<String> {
        let ctx = minijinja::context! { state => state.as_str() };
        Ok(self.env.render_str(hook, ctx)?)
    }

    /// Render a model's pre- or post-hook, which may refer to `this`
    pub fn render_model_hook(&self, hook: &str, this: Relation) -> JinjaResult<String> {
        let ctx = minijinja::context! { this => Value::from_object(this) };
        Ok(self.env.render_str(hook, ctx)?)
    }
}

#[cfg(test)]
#[path = "environment_test.rs"]
mod tests;
