//! The graph store: nodes keyed by id, edges pointing from dependency to dependent

use crate::error::{CoreError, CoreResult};
use crate::node::{Node, NodeId};
use petgraph::algo::tarjan_scc;
use petgraph::stable_graph::{NodeIndex, StableDiGraph};
use petgraph::visit::EdgeRef;
use petgraph::Direction;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet, VecDeque};

/// How ancestors are counted when bucketing nodes into levels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LevelMode {
    /// Level = number of blocking ancestors inside the subset
    Blocking,
    /// Every node in a single level (tests, archives)
    Flat,
}

/// Directed dependency graph owning every node
#[derive(Debug, Clone, Default)]
pub struct Graph {
    graph: StableDiGraph<Node, ()>,
    node_map: HashMap<NodeId, NodeIndex>,
}

impl Graph {
    /// Create an empty graph
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a graph from resolved nodes, one edge per `depends_on` entry
    pub fn link(nodes: Vec<Node>) -> CoreResult<Self> {
        let mut graph = Self::new();
        for node in nodes {
            graph.add_node(node)?;
        }
        let edges: Vec<(NodeId, NodeId)> = graph
            .nodes()
            .flat_map(|n| {
                n.depends_on
                    .nodes
                    .iter()
                    .map(move |dep| (n.unique_id.clone(), dep.clone()))
            })
            .collect();
        for (from, to) in edges {
            graph.add_edge(&from, &to)?;
        }
        Ok(graph)
    }

    /// Add a node; its id must not already be present
    pub fn add_node(&mut self, node: Node) -> CoreResult<NodeIndex> {
        if let Some(&existing) = self.node_map.get(&node.unique_id) {
            return Err(CoreError::DuplicateNode {
                id: node.unique_id.to_string(),
                path1: self.graph[existing].original_file_path.display().to_string(),
                path2: node.original_file_path.display().to_string(),
            });
        }
        let id = node.unique_id.clone();
        let idx = self.graph.add_node(node);
        self.node_map.insert(id, idx);
        Ok(idx)
    }

    /// Add a dependency edge (from depends on to)
    pub fn add_edge(&mut self, from: &NodeId, to: &NodeId) -> CoreResult<()> {
        let from_idx = self.index_of(from)?;
        let to_idx = self.index_of(to)?;
        // Edge goes from dependency to dependent (to -> from)
        // so topological order gives dependencies first
        self.graph.add_edge(to_idx, from_idx, ());
        Ok(())
    }

    fn index_of(&self, id: &NodeId) -> CoreResult<NodeIndex> {
        self.node_map
            .get(id)
            .copied()
            .ok_or_else(|| CoreError::NodeNotFound { id: id.to_string() })
    }

    pub fn contains(&self, id: &NodeId) -> bool {
        self.node_map.contains_key(id)
    }

    pub fn get(&self, id: &NodeId) -> Option<&Node> {
        self.node_map.get(id).map(|&idx| &self.graph[idx])
    }

    pub fn get_mut(&mut self, id: &NodeId) -> Option<&mut Node> {
        self.node_map.get(id).map(|&idx| &mut self.graph[idx])
    }

    /// Fetch a node or fail with "not found / disabled"
    pub fn node(&self, id: &NodeId) -> CoreResult<&Node> {
        self.get(id)
            .ok_or_else(|| CoreError::NodeNotFound { id: id.to_string() })
    }

    /// Replace a stored node with an updated copy of itself
    pub fn write_back(&mut self, node: Node) -> CoreResult<()> {
        let idx = self.index_of(&node.unique_id)?;
        self.graph[idx] = node;
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.node_map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.node_map.is_empty()
    }

    /// All nodes, in no particular order
    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.graph.node_weights()
    }

    /// All ids, sorted
    pub fn node_ids(&self) -> BTreeSet<NodeId> {
        self.node_map.keys().cloned().collect()
    }

    /// Ids of nodes with an edge into `id`
    pub fn predecessors(&self, id: &NodeId) -> BTreeSet<NodeId> {
        self.neighbors(id, Direction::Incoming)
    }

    /// Ids of nodes with an edge out of `id`
    pub fn successors(&self, id: &NodeId) -> BTreeSet<NodeId> {
        self.neighbors(id, Direction::Outgoing)
    }

    fn neighbors(&self, id: &NodeId, direction: Direction) -> BTreeSet<NodeId> {
        match self.node_map.get(id) {
            Some(&idx) => self
                .graph
                .neighbors_directed(idx, direction)
                .map(|n| self.graph[n].unique_id.clone())
                .collect(),
            None => BTreeSet::new(),
        }
    }

    /// All transitive dependencies of a node
    pub fn ancestors(&self, id: &NodeId) -> BTreeSet<NodeId> {
        self.reachable(id, Direction::Incoming)
    }

    /// All transitive dependents of a node
    pub fn descendants(&self, id: &NodeId) -> BTreeSet<NodeId> {
        self.reachable(id, Direction::Outgoing)
    }

    fn reachable(&self, id: &NodeId, direction: Direction) -> BTreeSet<NodeId> {
        let Some(&start) = self.node_map.get(id) else {
            return BTreeSet::new();
        };
        let mut visited = HashSet::new();
        let mut stack = vec![start];
        let mut result = BTreeSet::new();
        while let Some(current) = stack.pop() {
            for neighbor in self.graph.neighbors_directed(current, direction) {
                if neighbor != start && visited.insert(neighbor) {
                    result.insert(self.graph[neighbor].unique_id.clone());
                    stack.push(neighbor);
                }
            }
        }
        result
    }

    /// Return the first cycle found, as a closed path of ids
    pub fn find_cycle(&self) -> Option<Vec<NodeId>> {
        for component in tarjan_scc(&self.graph) {
            let Some(&start) = component.first() else {
                continue;
            };
            if component.len() == 1 && self.graph.find_edge(start, start).is_none() {
                continue;
            }
            let members: HashSet<NodeIndex> = component.iter().copied().collect();
            return Some(self.cycle_path(start, &members));
        }
        None
    }

    /// BFS from `start` back to itself, staying inside one strongly
    /// connected component
    fn cycle_path(&self, start: NodeIndex, members: &HashSet<NodeIndex>) -> Vec<NodeId> {
        let mut parent: HashMap<NodeIndex, NodeIndex> = HashMap::new();
        let mut queue = VecDeque::from([start]);
        let mut last = start;
        'search: while let Some(current) = queue.pop_front() {
            for edge in self.graph.edges_directed(current, Direction::Outgoing) {
                let next = edge.target();
                if !members.contains(&next) {
                    continue;
                }
                if next == start {
                    last = current;
                    break 'search;
                }
                if !parent.contains_key(&next) {
                    parent.insert(next, current);
                    queue.push_back(next);
                }
            }
        }

        let mut path = vec![self.graph[start].unique_id.clone()];
        let mut cursor = last;
        while cursor != start {
            path.push(self.graph[cursor].unique_id.clone());
            match parent.get(&cursor) {
                Some(&p) => cursor = p,
                None => break,
            }
        }
        path.push(self.graph[start].unique_id.clone());
        path.reverse();
        path
    }

    /// Fail if the graph has a cycle
    pub fn validate(&self) -> CoreResult<()> {
        match self.find_cycle() {
            None => Ok(()),
            Some(path) => Err(CoreError::CircularDependency {
                cycle: path
                    .iter()
                    .map(|id| id.to_string())
                    .collect::<Vec<_>>()
                    .join(" --> "),
            }),
        }
    }

    /// Partition `subset` into ordered levels.
    ///
    /// A node's level is decided by how many of its ancestors are both in
    /// `subset` and blocking. Buckets are emitted in ascending count order
    /// with gaps closed, and ids inside a bucket are sorted.
    pub fn topological_levels(
        &self,
        subset: &BTreeSet<NodeId>,
        mode: LevelMode,
    ) -> CoreResult<Vec<Vec<NodeId>>> {
        let mut buckets: BTreeMap<usize, Vec<NodeId>> = BTreeMap::new();
        for id in subset {
            if !self.contains(id) {
                return Err(CoreError::NodeNotFound { id: id.to_string() });
            }
            let depth = match mode {
                LevelMode::Flat => 0,
                LevelMode::Blocking => self
                    .ancestors(id)
                    .iter()
                    .filter(|a| subset.contains(*a))
                    .filter(|a| self.get(a).is_some_and(Node::is_blocking))
                    .count(),
            };
            buckets.entry(depth).or_default().push(id.clone());
        }
        Ok(buckets.into_values().collect())
    }

    /// Remove a node, returning what used to depend on it
    pub fn remove_node(&mut self, id: &NodeId) -> CoreResult<BTreeSet<NodeId>> {
        let descendants = self.descendants(id);
        let idx = self.index_of(id)?;
        self.graph.remove_node(idx);
        self.node_map.remove(id);
        Ok(descendants)
    }

    /// Copy of the graph keeping only nodes matching `keep`, plus the edges
    /// between them
    pub fn filtered<F>(&self, keep: F) -> Graph
    where
        F: Fn(&Node) -> bool,
    {
        let mut out = self.clone();
        let dropped: Vec<NodeId> = self
            .nodes()
            .filter(|n| !keep(n))
            .map(|n| n.unique_id.clone())
            .collect();
        for id in dropped {
            if let Some(idx) = out.node_map.remove(&id) {
                out.graph.remove_node(idx);
            }
        }
        out
    }
}

#[cfg(test)]
#[path = "graph_test.rs"]
mod tests;
