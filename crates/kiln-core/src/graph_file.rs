//! Serialized graph artifact shared between `compile` and `run`

use crate::error::{CoreError, CoreResult};
use crate::graph::Graph;
use crate::node::Node;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// File name under the target directory
pub const GRAPH_FILE_NAME: &str = "graph.json";

/// On-disk form: every node with its attributes. Edges are rebuilt from
/// each node's `depends_on` when loading.
#[derive(Debug, Serialize, Deserialize)]
struct GraphFile {
    nodes: Vec<Node>,
}

/// Write the graph to `path`, creating parent directories
pub fn write_graph(graph: &Graph, path: &Path) -> CoreResult<()> {
    let mut nodes: Vec<Node> = graph.nodes().cloned().collect();
    nodes.sort_by(|a, b| a.unique_id.cmp(&b.unique_id));
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(&GraphFile { nodes })?;
    std::fs::write(path, json).map_err(|e| CoreError::IoWithPath {
        path: path.display().to_string(),
        source: e,
    })?;
    log::debug!("Wrote graph to {}", path.display());
    Ok(())
}

/// Read a graph written by [`write_graph`]
pub fn read_graph(path: &Path) -> CoreResult<Graph> {
    if !path.exists() {
        return Err(CoreError::GraphFileNotFound {
            path: path.display().to_string(),
        });
    }
    let text = std::fs::read_to_string(path).map_err(|e| CoreError::IoWithPath {
        path: path.display().to_string(),
        source: e,
    })?;
    let file: GraphFile = serde_json::from_str(&text)?;
    Graph::link(file.nodes)
}

#[cfg(test)]
#[path = "graph_file_test.rs"]
mod tests;
