//! Compile command implementation

use anyhow::{bail, Result};
use kiln_core::ResourceKind;
use kiln_runner::{CompileOptions, Introspector, Offline};
use std::sync::Arc;

use crate::cli::{CompileArgs, GlobalArgs};
use crate::commands::common::load_workspace;

const COMPILED_KINDS: [ResourceKind; 4] = [
    ResourceKind::Model,
    ResourceKind::Test,
    ResourceKind::Analysis,
    ResourceKind::Archive,
];

/// Execute the compile command
pub async fn execute(args: &CompileArgs, global: &GlobalArgs) -> Result<()> {
    let workspace = load_workspace(global, None)?;
    workspace.write_graph()?;
    log::info!(
        "Wrote graph with {} nodes to {}",
        workspace.graph.len(),
        workspace.project.graph_path().display()
    );

    let selected = workspace.select(
        &args.selection.models,
        &args.selection.exclude,
        &COMPILED_KINDS,
        |_| true,
    )?;

    let compiler = workspace.compiler(CompileOptions::default());
    let offline: Arc<dyn Introspector> = Arc::new(Offline);

    let mut failed = 0usize;
    for id in &selected {
        match compiler.compile_node(id, &offline) {
            Ok(node) => {
                if global.verbose {
                    if let Some(path) = &node.build_path {
                        println!("  {} -> {}", id, path.display());
                    }
                }
            }
            Err(e) => {
                failed += 1;
                eprintln!("  ✗ {} - {}", id, e);
            }
        }
    }

    println!(
        "Compiled {} of {} nodes into {}",
        selected.len() - failed,
        selected.len(),
        workspace.project.build_dir().display()
    );
    if failed > 0 {
        bail!("{} node(s) failed to compile", failed);
    }
    Ok(())
}
