//! Shared utilities for CLI commands

use anyhow::{Context, Result};
use kiln_core::{LevelMode, NodeId};
use kiln_runner::{
    write_run_results, CompileOptions, RunResult, RunResults, Scheduler, Workspace,
    RUN_RESULTS_FILE,
};
use std::collections::BTreeSet;
use std::io::IsTerminal;
use std::sync::Arc;
use std::time::Instant;

use crate::cli::GlobalArgs;

/// Load and link the project named by the global args
pub(crate) fn load_workspace(global: &GlobalArgs, threads: Option<usize>) -> Result<Workspace> {
    Workspace::load(&global.project_dir, global.target.as_deref(), threads).with_context(|| {
        format!(
            "Failed to load project at {}",
            global.project_dir.display()
        )
    })
}

/// What to run and how
pub(crate) struct Execution {
    pub mode: LevelMode,
    pub options: CompileOptions,
    pub on_run_start: Vec<String>,
    pub on_run_end: Vec<String>,
}

impl Execution {
    pub(crate) fn flat() -> Self {
        Self {
            mode: LevelMode::Flat,
            options: CompileOptions::default(),
            on_run_start: Vec::new(),
            on_run_end: Vec::new(),
        }
    }
}

/// Run `selected` through the scheduler, print the summary and save
/// `run_results.json`
pub(crate) async fn execute_nodes(
    workspace: &Workspace,
    selected: &BTreeSet<NodeId>,
    execution: Execution,
) -> Result<Vec<RunResult>> {
    if selected.is_empty() {
        println!("No nodes selected.");
        return Ok(Vec::new());
    }

    let started = Instant::now();
    let adapter = workspace
        .adapter()
        .with_context(|| format!("Failed to open target '{}'", workspace.target_name))?;
    let compiler = Arc::new(workspace.compiler(execution.options));
    let scheduler = Scheduler::new(
        compiler,
        adapter,
        Arc::clone(&workspace.env),
        workspace.threads(),
    )
    .with_hooks(execution.on_run_start, execution.on_run_end)
    .show_progress(std::io::stdout().is_terminal());

    let results = scheduler.run(selected, execution.mode).await?;

    let run_results = RunResults::new(results.clone(), started.elapsed());
    println!();
    println!(
        "{} in {:.2}s",
        run_results.summary, run_results.elapsed_secs
    );
    let path = workspace.project.target_dir().join(RUN_RESULTS_FILE);
    write_run_results(&path, &run_results)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    log::info!("Results written to {}", path.display());

    Ok(results)
}
