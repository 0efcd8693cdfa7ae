//! Node selection syntax
//!
//! Supports dbt-style selectors:
//! - `model_name` - select a node by local name
//! - `package.model_name` - select within a package
//! - `package.dir.*` - select everything below a path
//! - `+model_name` - the node and all of its ancestors
//! - `model_name+` - the node and all of its descendants
//! - `+model_name+` - both directions

use crate::error::{CoreError, CoreResult};
use crate::graph::Graph;
use crate::node::{NodeId, ResourceKind};
use std::collections::BTreeSet;
use std::str::FromStr;

/// Wildcard segment
pub const WILDCARD: &str = "*";

/// One parsed include/exclude token
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectionSpec {
    /// Leading `+`
    pub select_parents: bool,
    /// Trailing `+`
    pub select_children: bool,
    /// Dot-separated name segments
    pub qualified_name: Vec<String>,
    raw: String,
}

impl SelectionSpec {
    /// The text this spec was parsed from
    pub fn raw(&self) -> &str {
        &self.raw
    }
}

impl FromStr for SelectionSpec {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = |reason: &str| CoreError::InvalidSelector {
            selector: s.to_string(),
            reason: reason.to_string(),
        };

        let (select_parents, rest) = match s.strip_prefix('+') {
            Some(rest) => (true, rest),
            None => (false, s),
        };
        let (select_children, name) = match rest.strip_suffix('+') {
            Some(name) => (true, name),
            None => (false, rest),
        };

        if name.is_empty() {
            return Err(invalid("name cannot be empty"));
        }
        let qualified_name: Vec<String> = name.split('.').map(str::to_string).collect();
        if qualified_name.iter().any(String::is_empty) {
            return Err(invalid("empty path segment"));
        }

        Ok(Self {
            select_parents,
            select_children,
            qualified_name,
            raw: s.to_string(),
        })
    }
}

/// Split every spec string on whitespace and deduplicate
pub fn split_specs<S: AsRef<str>>(specs: &[S]) -> BTreeSet<String> {
    specs
        .iter()
        .flat_map(|s| s.as_ref().split_whitespace())
        .map(str::to_string)
        .collect()
}

/// Does `pattern` select the node whose fully-qualified name is `real`?
pub fn is_selected(real: &[String], pattern: &[String]) -> bool {
    let Some(real_last) = real.last() else {
        return false;
    };
    for (i, part) in pattern.iter().enumerate() {
        let is_last = i + 1 == pattern.len();
        if part == WILDCARD {
            return true;
        } else if is_last && part == real_last {
            return true;
        } else if real.len() <= i {
            return false;
        } else if &real[i] == part {
            continue;
        } else {
            return false;
        }
    }
    true
}

/// Package names present in the graph
fn package_names(graph: &Graph) -> BTreeSet<String> {
    graph.nodes().map(|n| n.package().to_string()).collect()
}

/// Nodes matched by a qualified name, before any graph expansion.
///
/// A bare name matches on the last fqn segment. A longer name is tried as
/// package-qualified when its first segment is a known package, otherwise
/// every known package is tried as a prefix.
pub fn nodes_by_qualified_name(graph: &Graph, qualified_name: &[String]) -> BTreeSet<NodeId> {
    let packages = package_names(graph);
    let mut selected = BTreeSet::new();

    for node in graph.nodes() {
        let fqn = &node.fqn;
        let matched = if qualified_name.len() == 1 && fqn.last() == qualified_name.first() {
            true
        } else if qualified_name
            .first()
            .is_some_and(|first| packages.contains(first))
        {
            is_selected(fqn, qualified_name)
        } else {
            packages.iter().any(|package| {
                let mut prefixed = Vec::with_capacity(qualified_name.len() + 1);
                prefixed.push(package.clone());
                prefixed.extend(qualified_name.iter().cloned());
                is_selected(fqn, &prefixed)
            })
        };
        if matched {
            selected.insert(node.unique_id.clone());
        }
    }
    selected
}

/// Nodes one spec selects, including its `+` expansions and the tests
/// that directly follow any of them
pub fn nodes_by_spec(graph: &Graph, spec: &SelectionSpec) -> BTreeSet<NodeId> {
    let matched = nodes_by_qualified_name(graph, &spec.qualified_name);
    let mut result = matched.clone();
    for id in &matched {
        if spec.select_parents {
            result.extend(graph.ancestors(id));
        }
        if spec.select_children {
            result.extend(graph.descendants(id));
        }
    }
    let tests: Vec<NodeId> = result
        .iter()
        .flat_map(|id| graph.successors(id))
        .filter(|s| s.kind == ResourceKind::Test)
        .collect();
    result.extend(tests);
    result
}

fn specs_to_nodes(graph: &Graph, specs: &BTreeSet<String>) -> CoreResult<BTreeSet<NodeId>> {
    let mut result = BTreeSet::new();
    for raw in specs {
        let spec: SelectionSpec = raw.parse()?;
        let nodes = nodes_by_spec(graph, &spec);
        if nodes.is_empty() {
            log::warn!(
                "* Spec='{}' does not identify any models and was ignored",
                spec.raw()
            );
        }
        result.extend(nodes);
    }
    Ok(result)
}

/// Evaluate include/exclude specs against the graph.
///
/// Defaults: include `*`, exclude nothing. Each spec carries the tests of
/// the nodes it matches, so excluding a model also drops its tests.
pub fn select_nodes<S: AsRef<str>>(
    graph: &Graph,
    include: &[S],
    exclude: &[S],
) -> CoreResult<BTreeSet<NodeId>> {
    let include = if include.is_empty() {
        BTreeSet::from([WILDCARD.to_string()])
    } else {
        split_specs(include)
    };
    let exclude = split_specs(exclude);

    let included = specs_to_nodes(graph, &include)?;
    let excluded = specs_to_nodes(graph, &exclude)?;
    Ok(included.difference(&excluded).cloned().collect())
}

#[cfg(test)]
#[path = "selector_test.rs"]
mod tests;
