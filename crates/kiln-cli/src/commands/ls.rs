//! Ls command implementation

use anyhow::Result;
use kiln_core::{Node, ResourceKind};
use serde_json::json;

use crate::cli::{GlobalArgs, LsArgs, LsOutput, ResourceArg};
use crate::commands::common::load_workspace;

impl From<ResourceArg> for ResourceKind {
    fn from(arg: ResourceArg) -> Self {
        match arg {
            ResourceArg::Model => ResourceKind::Model,
            ResourceArg::Test => ResourceKind::Test,
            ResourceArg::Analysis => ResourceKind::Analysis,
            ResourceArg::Archive => ResourceKind::Archive,
        }
    }
}

/// Execute the ls command
pub async fn execute(args: &LsArgs, global: &GlobalArgs) -> Result<()> {
    let workspace = load_workspace(global, None)?;
    let kinds: Vec<ResourceKind> = match args.resource_type {
        Some(kind) => vec![kind.into()],
        None => vec![
            ResourceKind::Model,
            ResourceKind::Test,
            ResourceKind::Analysis,
            ResourceKind::Archive,
        ],
    };
    let selected = workspace.select(
        &args.selection.models,
        &args.selection.exclude,
        &kinds,
        |_| true,
    )?;
    let nodes: Vec<&Node> = selected
        .iter()
        .filter_map(|id| workspace.graph.get(id))
        .collect();

    match args.output {
        LsOutput::Ids => {
            for node in &nodes {
                println!("{}", node.unique_id);
            }
        }
        LsOutput::Json => {
            let listing: Vec<_> = nodes.iter().map(|node| describe(node)).collect();
            println!("{}", serde_json::to_string_pretty(&listing)?);
        }
        LsOutput::Table => print_table(&nodes),
    }
    Ok(())
}

fn kind_label(node: &Node) -> String {
    match node.kind() {
        ResourceKind::Model => node.materialization().to_string(),
        other => other.to_string(),
    }
}

fn describe(node: &Node) -> serde_json::Value {
    json!({
        "unique_id": node.unique_id.to_string(),
        "name": node.name(),
        "kind": node.kind().as_str(),
        "materialized": (node.kind() == ResourceKind::Model).then(|| node.materialization().as_str()),
        "path": node.original_file_path,
        "depends_on": node.depends_on.nodes.iter().map(|d| d.to_string()).collect::<Vec<_>>(),
        "tags": node.tags,
    })
}

fn print_table(nodes: &[&Node]) {
    if nodes.is_empty() {
        println!("No nodes selected.");
        return;
    }
    let name_width = nodes.iter().map(|n| n.name().len()).max().unwrap_or(4).max(4);
    let kind_width = nodes.iter().map(|n| kind_label(n).len()).max().unwrap_or(4).max(4);
    println!("{:name_width$}  {:kind_width$}  DEPENDS ON", "NAME", "KIND");
    for node in nodes {
        let deps: Vec<&str> = node.depends_on.nodes.iter().map(|d| d.name.as_str()).collect();
        println!(
            "{:name_width$}  {:kind_width$}  {}",
            node.name(),
            kind_label(node),
            if deps.is_empty() { "-".to_string() } else { deps.join(", ") }
        );
    }
    println!();
    println!("{} nodes", nodes.len());
}
