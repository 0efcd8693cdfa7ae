//! Reference resolution: turn captured `ref()` calls into dependency ids

use crate::error::{CoreError, CoreResult};
use crate::node::{Node, NodeId, RefCall, ResourceKind};
use std::collections::HashMap;

/// Index of models by local name, for `ref()` lookups
struct ModelIndex {
    by_name: HashMap<String, Vec<(NodeId, bool)>>,
}

impl ModelIndex {
    fn build(nodes: &[Node]) -> Self {
        let mut by_name: HashMap<String, Vec<(NodeId, bool)>> = HashMap::new();
        for node in nodes.iter().filter(|n| n.kind() == ResourceKind::Model) {
            by_name
                .entry(node.name().to_string())
                .or_default()
                .push((node.unique_id.clone(), node.is_enabled()));
        }
        Self { by_name }
    }

    /// First model named `name`, restricted to `package` when given
    fn find(&self, name: &str, package: Option<&str>) -> Option<&(NodeId, bool)> {
        self.by_name
            .get(name)?
            .iter()
            .find(|(id, _)| package.map_or(true, |p| id.package == p))
    }
}

/// Resolve every node's refs into `depends_on.nodes`.
///
/// Fails on the first ref whose target is missing, or whose target is
/// disabled while the referring node is enabled.
pub fn process_refs(nodes: &mut [Node]) -> CoreResult<()> {
    let index = ModelIndex::build(nodes);

    for node in nodes.iter_mut() {
        let refs = node.refs.clone();
        for RefCall { package, name } in refs {
            let Some((target, target_enabled)) = index.find(&name, package.as_deref()) else {
                return Err(CoreError::RefTargetNotFound {
                    node: node.name().to_string(),
                    target: name,
                    package: package
                        .map(|p| format!(" in package '{}'", p))
                        .unwrap_or_default(),
                });
            };
            if node.is_enabled() && !target_enabled {
                return Err(CoreError::DisabledDependency {
                    node: node.name().to_string(),
                    target: name,
                });
            }
            node.add_dependency(target.clone());
        }
    }
    Ok(())
}

#[cfg(test)]
#[path = "resolver_test.rs"]
mod tests;
