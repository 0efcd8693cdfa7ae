//! Seed command implementation

use anyhow::{Context, Result};
use kiln_runner::{load_seeds, NodeStatus};
use std::time::Instant;

use crate::cli::{GlobalArgs, SeedArgs};
use crate::commands::common::load_workspace;

/// Execute the seed command
pub async fn execute(args: &SeedArgs, global: &GlobalArgs) -> Result<()> {
    let workspace = load_workspace(global, None)?;
    let files = workspace.project.seed_files()?;
    if files.is_empty() {
        println!("No seed files found.");
        return Ok(());
    }

    let started = Instant::now();
    let adapter = workspace
        .adapter()
        .with_context(|| format!("Failed to open target '{}'", workspace.target_name))?;
    let schema = workspace.schema().to_string();
    let full_refresh = args.full_refresh;
    let results = tokio::task::spawn_blocking(move || {
        let results = load_seeds(&adapter, &schema, &files, full_refresh);
        adapter.cleanup();
        results
    })
    .await
    .context("Seed loader panicked")??;

    for result in &results {
        println!("{}", result.status_line());
    }
    let errors = results
        .iter()
        .filter(|r| r.status == NodeStatus::Error)
        .count();
    println!();
    println!(
        "Loaded {} of {} seed files in {:.2}s",
        results.len() - errors,
        results.len(),
        started.elapsed().as_secs_f64()
    );
    Ok(())
}
