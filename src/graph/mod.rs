//! Page dependency graph
//!
//! An arena of [`GraphNode`]s with index-based "depends on" edges. The graph
//! is built once per page load and is read-only afterwards; metrics work on
//! [`GraphView`]s, sub-selections that stay closed under "depends on" so
//! every view keeps the root and simulates like a graph of its own.

pub mod builder;
pub mod node;

use std::collections::VecDeque;

pub use builder::GraphBuilder;
pub use node::{CpuNode, GraphNode, NetworkNode, NodeId};

/// Rooted DAG of network requests and main-thread tasks
#[derive(Debug, Clone)]
pub struct DependencyGraph {
    nodes: Vec<GraphNode>,
    /// node -> nodes it depends on
    dependencies: Vec<Vec<NodeId>>,
    /// node -> nodes that depend on it
    dependents: Vec<Vec<NodeId>>,
    root: NodeId,
    dropped_edges: usize,
}

impl DependencyGraph {
    /// Create a graph holding only its root
    pub fn new(root: GraphNode) -> Self {
        Self {
            nodes: vec![root],
            dependencies: vec![Vec::new()],
            dependents: vec![Vec::new()],
            root: NodeId(0),
            dropped_edges: 0,
        }
    }

    pub fn add_node(&mut self, node: GraphNode) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(node);
        self.dependencies.push(Vec::new());
        self.dependents.push(Vec::new());
        id
    }

    /// Make `node` depend on `dependency`
    ///
    /// Returns false when the edge was not added: self edges and edges into
    /// the root are ignored, edges that would close a cycle are dropped with
    /// a warning and counted in [`dropped_edges`](Self::dropped_edges).
    pub fn add_dependency(&mut self, node: NodeId, dependency: NodeId) -> bool {
        if node == dependency || node == self.root {
            return false;
        }
        if self.dependencies[node.index()].contains(&dependency) {
            return true;
        }
        if self.depends_on(dependency, node) {
            log::warn!(
                "dropping edge {} -> {}: would create a cycle ({} depends on {})",
                self.nodes[dependency.index()].label(),
                self.nodes[node.index()].label(),
                dependency,
                node
            );
            self.dropped_edges += 1;
            return false;
        }
        self.dependencies[node.index()].push(dependency);
        self.dependents[dependency.index()].push(node);
        true
    }

    /// Whether `node` transitively depends on `target`
    pub fn depends_on(&self, node: NodeId, target: NodeId) -> bool {
        let mut visited = vec![false; self.nodes.len()];
        let mut stack = vec![node];
        while let Some(current) = stack.pop() {
            if current == target {
                return true;
            }
            if std::mem::replace(&mut visited[current.index()], true) {
                continue;
            }
            stack.extend(self.dependencies[current.index()].iter().copied());
        }
        false
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn node(&self, id: NodeId) -> &GraphNode {
        &self.nodes[id.index()]
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node_ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        (0..self.nodes.len() as u32).map(NodeId)
    }

    pub fn nodes(&self) -> impl Iterator<Item = (NodeId, &GraphNode)> {
        self.nodes.iter().enumerate().map(|(i, n)| (NodeId(i as u32), n))
    }

    pub fn dependencies(&self, id: NodeId) -> &[NodeId] {
        &self.dependencies[id.index()]
    }

    pub fn dependents(&self, id: NodeId) -> &[NodeId] {
        &self.dependents[id.index()]
    }

    pub fn edge_count(&self) -> usize {
        self.dependencies.iter().map(Vec::len).sum()
    }

    /// Edges discarded because they would have closed a cycle
    pub fn dropped_edges(&self) -> usize {
        self.dropped_edges
    }

    /// Nodes with no dependencies; a well-formed graph has exactly the root
    pub fn sources(&self) -> Vec<NodeId> {
        self.node_ids().filter(|id| self.dependencies(*id).is_empty()).collect()
    }

    /// Kahn's algorithm; `None` if the graph has a cycle
    pub fn topological_order(&self) -> Option<Vec<NodeId>> {
        let mut in_degree: Vec<usize> = self.dependencies.iter().map(Vec::len).collect();
        let mut ready: VecDeque<NodeId> = self.node_ids().filter(|id| in_degree[id.index()] == 0).collect();
        let mut order = Vec::with_capacity(self.nodes.len());
        while let Some(id) = ready.pop_front() {
            order.push(id);
            for &next in self.dependents(id) {
                in_degree[next.index()] -= 1;
                if in_degree[next.index()] == 0 {
                    ready.push_back(next);
                }
            }
        }
        (order.len() == self.nodes.len()).then_some(order)
    }

    pub fn is_acyclic(&self) -> bool {
        self.topological_order().is_some()
    }

    /// The whole graph as a view
    pub fn full_view(&self) -> GraphView<'_> {
        GraphView {
            graph: self,
            included: vec![true; self.nodes.len()],
        }
    }

    /// Nodes matching `predicate`, plus the root and everything they depend on
    pub fn select(&self, mut predicate: impl FnMut(NodeId, &GraphNode) -> bool) -> GraphView<'_> {
        let mut included = vec![false; self.nodes.len()];
        let mut stack: Vec<NodeId> = self.nodes().filter(|(id, n)| predicate(*id, *n)).map(|(id, _)| id).collect();
        stack.push(self.root);
        while let Some(id) = stack.pop() {
            if std::mem::replace(&mut included[id.index()], true) {
                continue;
            }
            stack.extend(self.dependencies(id).iter().copied());
        }
        GraphView { graph: self, included }
    }

    /// Find the first network node matching `predicate`
    pub fn find_network(&self, mut predicate: impl FnMut(&NetworkNode) -> bool) -> Option<NodeId> {
        self.nodes()
            .find(|(_, n)| n.as_network().is_some_and(&mut predicate))
            .map(|(id, _)| id)
    }
}

/// A dependency-closed subset of a graph
#[derive(Debug, Clone)]
pub struct GraphView<'a> {
    graph: &'a DependencyGraph,
    included: Vec<bool>,
}

impl<'a> GraphView<'a> {
    pub fn graph(&self) -> &'a DependencyGraph {
        self.graph
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.included.get(id.index()).copied().unwrap_or(false)
    }

    pub fn len(&self) -> usize {
        self.included.iter().filter(|i| **i).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Included nodes in insertion order
    pub fn node_ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.graph.node_ids().filter(|id| self.contains(*id))
    }

    pub fn node(&self, id: NodeId) -> &'a GraphNode {
        self.graph.node(id)
    }

    pub fn dependencies(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        self.graph.dependencies(id).iter().copied().filter(|d| self.contains(*d))
    }

    pub fn dependents(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        self.graph.dependents(id).iter().copied().filter(|d| self.contains(*d))
    }

    /// Whether `other` includes every node of this view
    pub fn is_subset_of(&self, other: &GraphView<'_>) -> bool {
        self.node_ids().all(|id| other.contains(id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trace::CpuTask;

    fn cpu(start: f64) -> GraphNode {
        GraphNode::Cpu(CpuNode {
            task: CpuTask::new("RunTask", start, start + 10.0),
        })
    }

    // root <- a <- b, root <- c
    fn graph() -> (DependencyGraph, [NodeId; 4]) {
        let mut graph = DependencyGraph::new(cpu(0.0));
        let root = graph.root();
        let a = graph.add_node(cpu(10.0));
        let b = graph.add_node(cpu(20.0));
        let c = graph.add_node(cpu(30.0));
        graph.add_dependency(a, root);
        graph.add_dependency(b, a);
        graph.add_dependency(c, root);
        (graph, [root, a, b, c])
    }

    #[test]
    fn test_cycle_edges_are_dropped() {
        let (mut graph, [root, a, b, _]) = graph();
        assert!(!graph.add_dependency(a, b));
        assert!(!graph.add_dependency(root, b));
        assert!(!graph.add_dependency(a, a));
        assert_eq!(graph.dropped_edges(), 1);
        assert!(graph.is_acyclic());
        assert_eq!(graph.sources(), vec![root]);
    }

    #[test]
    fn test_duplicate_edge_is_noop() {
        let (mut graph, [_, a, b, _]) = graph();
        assert!(graph.add_dependency(b, a));
        assert_eq!(graph.edge_count(), 3);
    }

    #[test]
    fn test_topological_order() {
        let (graph, [root, a, b, _]) = graph();
        let order = graph.topological_order().unwrap();
        let pos = |id: NodeId| order.iter().position(|x| *x == id).unwrap();
        assert!(pos(root) < pos(a) && pos(a) < pos(b));
    }

    #[test]
    fn test_select_is_dependency_closed() {
        let (graph, [root, a, b, c]) = graph();
        let view = graph.select(|id, _| id == b);
        assert!(view.contains(root) && view.contains(a) && view.contains(b));
        assert!(!view.contains(c));
        assert_eq!(view.len(), 3);
        assert!(view.is_subset_of(&graph.full_view()));
        assert_eq!(view.dependents(root).collect::<Vec<_>>(), vec![a]);
    }
}
