//! Parse pass: render every node once to learn its refs and in-model
//! config, layer configuration, resolve refs and link the graph.

use crate::error::{CompileError, CompileResult};
use kiln_core::{process_refs, Graph, Node, NodeConfig, Project, ResourceKind};
use kiln_jinja::{JinjaEnvironment, ParseCapture};
use std::collections::BTreeSet;

/// Load, parse and link every node of `project`.
///
/// Fails on the first unresolvable ref, disabled dependency, duplicate id
/// or cycle. Disabled nodes are pruned from the returned graph.
pub fn parse_project(
    project: &Project,
    env: &JinjaEnvironment,
    schema: &str,
) -> CompileResult<Graph> {
    let mut nodes = project.load_nodes()?;
    for node in nodes.iter_mut() {
        parse_node(project, env, schema, node)?;
    }
    process_refs(&mut nodes)?;

    let mut graph = Graph::link(nodes)?;
    graph.validate()?;

    let disabled: Vec<_> = graph
        .nodes()
        .filter(|n| !n.is_enabled())
        .map(|n| n.unique_id.clone())
        .collect();
    for id in disabled {
        let orphaned = graph.remove_node(&id)?;
        log::debug!(
            "Pruned disabled node {} ({} dependents)",
            id,
            orphaned.len()
        );
    }
    log::info!("Parsed {} nodes", graph.len());
    Ok(graph)
}

/// Config layering, least specific first. Root project nodes: defaults,
/// project tree, in-model. Package nodes: defaults, the package's own
/// tree, in-model, then the root project's tree.
fn parse_node(
    project: &Project,
    env: &JinjaEnvironment,
    schema: &str,
    node: &mut Node,
) -> CompileResult<()> {
    let id = node.unique_id.to_string();
    let is_root = node.package() == project.root_package().name;
    let own_tree = match project.package(node.package()) {
        Some(package) => package.config.tree_config_for(&node.fqn)?,
        None => Vec::new(),
    };
    let root_tree = if is_root {
        Vec::new()
    } else {
        project.config.tree_config_for(&node.fqn)?
    };

    // vars known before the node's own config() calls are seen
    let mut known = NodeConfig::default();
    let mut scratch = BTreeSet::new();
    known.apply_layer(&id, &own_tree, &mut scratch)?;
    known.apply_layer(&id, &root_tree, &mut scratch)?;

    let capture = if node.kind() == ResourceKind::Archive {
        ParseCapture::default()
    } else {
        let (_, capture) = env
            .parse_node(node, schema, known.vars)
            .map_err(|source| CompileError::Render {
                node: id.clone(),
                source,
            })?;
        capture
    };

    let mut config = NodeConfig::default();
    let mut tags = node.tags.clone();
    config.apply_layer(&id, &own_tree, &mut tags)?;
    config.apply_layer(&id, &capture.config, &mut tags)?;
    config.apply_layer(&id, &root_tree, &mut tags)?;

    node.config = config;
    node.tags = tags;
    node.refs = capture.refs;
    node.depends_on.macros = env.macros().macros_used(&node.raw_sql, node.package());
    Ok(())
}

#[cfg(test)]
#[path = "parse_test.rs"]
mod tests;
