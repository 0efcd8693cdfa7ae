//! Archive command implementation

use anyhow::Result;
use kiln_core::ResourceKind;

use crate::cli::{ArchiveArgs, GlobalArgs};
use crate::commands::common::{execute_nodes, load_workspace, Execution};

/// Execute the archive command
pub async fn execute(args: &ArchiveArgs, global: &GlobalArgs) -> Result<()> {
    let mut workspace = load_workspace(global, args.threads)?;
    workspace.persist_graph()?;
    let selected = workspace.select(&[], &[], &[ResourceKind::Archive], |_| true)?;
    execute_nodes(&workspace, &selected, Execution::flat()).await?;
    Ok(())
}
