//! Run command implementation

use anyhow::Result;
use kiln_core::{LevelMode, ResourceKind};
use kiln_runner::CompileOptions;

use crate::cli::{GlobalArgs, RunArgs};
use crate::commands::common::{execute_nodes, load_workspace, Execution};

/// Execute the run command
pub async fn execute(args: &RunArgs, global: &GlobalArgs) -> Result<()> {
    let mut workspace = load_workspace(global, args.threads)?;
    workspace.persist_graph()?;

    let selected = workspace.select(
        &args.selection.models,
        &args.selection.exclude,
        &[ResourceKind::Model],
        |_| true,
    )?;

    let config = &workspace.project.config;
    let execution = Execution {
        mode: LevelMode::Blocking,
        options: CompileOptions {
            full_refresh: args.full_refresh,
            non_destructive: args.non_destructive,
        },
        on_run_start: config.on_run_start.clone(),
        on_run_end: config.on_run_end.clone(),
    };
    execute_nodes(&workspace, &selected, execution).await?;
    Ok(())
}
