//! `on-run-start` / `on-run-end` hooks

use crate::error::{RunnerError, RunnerResult};
use kiln_db::{Adapter, DEFAULT_CONNECTION};
use kiln_jinja::{HookState, JinjaEnvironment};

/// Render and execute `hooks` in one transaction on the master connection
pub fn run_hooks(
    adapter: &Adapter,
    env: &JinjaEnvironment,
    hooks: &[String],
    state: HookState,
) -> RunnerResult<()> {
    if hooks.is_empty() {
        return Ok(());
    }
    let statements = hooks
        .iter()
        .map(|hook| env.render_hook(hook, state))
        .collect::<Result<Vec<_>, _>>()?;

    let mut conn = adapter
        .acquire(DEFAULT_CONNECTION)
        .map_err(RunnerError::Connection)?;
    let outcome = adapter
        .execute_all(&mut conn, &statements)
        .and_then(|()| conn.commit());
    adapter.release(conn);

    log::debug!("Ran {} {} hooks", statements.len(), state.as_str());
    outcome.map_err(|source| RunnerError::Database {
        context: format!("{} hook failed", state.as_str()),
        source,
    })
}

#[cfg(test)]
#[path = "hooks_test.rs"]
mod tests;
