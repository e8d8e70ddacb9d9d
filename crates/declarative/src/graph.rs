//! Dependency graph with cycle detection

use crate::error::{Error, Result};
use std::collections::VecDeque;
use std::fmt;

/// Handle of a node inside the graph that created it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

impl NodeId {
    pub fn index(self) -> usize {
        self.0
    }
}

/// How an edge constrains its target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdgeKind {
    /// The target needs the source to succeed; a failure skips the target.
    Dependency,
    /// The target only runs after the source finished, whatever its outcome.
    Ordering,
}

/// A graph under construction.
#[derive(Debug, Clone)]
pub struct Dag<T> {
    nodes: Vec<T>,
    successors: Vec<Vec<(NodeId, EdgeKind)>>,
}

impl<T> Dag<T> {
    pub fn new() -> Self {
        Self {
            nodes: Vec::new(),
            successors: Vec::new(),
        }
    }

    pub fn add_node(&mut self, node: T) -> NodeId {
        self.nodes.push(node);
        self.successors.push(Vec::new());
        NodeId(self.nodes.len() - 1)
    }

    /// Require `before` to finish before `after` starts.
    ///
    /// A repeated edge keeps the stronger kind.
    pub fn add_edge(&mut self, before: NodeId, after: NodeId, kind: EdgeKind) {
        let edges = &mut self.successors[before.0];
        match edges.iter_mut().find(|(to, _)| *to == after) {
            Some(edge) => {
                if kind == EdgeKind::Dependency {
                    edge.1 = EdgeKind::Dependency;
                }
            }
            None => edges.push((after, kind)),
        }
    }

    pub fn node(&self, id: NodeId) -> &T {
        &self.nodes[id.0]
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

impl<T: fmt::Display> Dag<T> {
    /// Validate the graph, computing a topological order (Kahn).
    ///
    /// Ties are broken by insertion order.
    pub fn build(self) -> Result<Graph<T>> {
        let mut in_degree = vec![0usize; self.nodes.len()];
        for edges in &self.successors {
            for (to, _) in edges {
                in_degree[to.0] += 1;
            }
        }

        let mut remaining = in_degree.clone();
        let mut queue: VecDeque<NodeId> = (0..self.nodes.len())
            .filter(|&i| remaining[i] == 0)
            .map(NodeId)
            .collect();
        let mut order = Vec::with_capacity(self.nodes.len());
        while let Some(id) = queue.pop_front() {
            order.push(id);
            for (to, _) in &self.successors[id.0] {
                remaining[to.0] -= 1;
                if remaining[to.0] == 0 {
                    queue.push_back(*to);
                }
            }
        }

        if order.len() < self.nodes.len() {
            let nodes = remaining
                .iter()
                .enumerate()
                .filter(|(_, degree)| **degree > 0)
                .map(|(i, _)| self.nodes[i].to_string())
                .collect();
            return Err(Error::Cycle { nodes });
        }

        Ok(Graph {
            nodes: self.nodes,
            successors: self.successors,
            in_degree,
            order,
        })
    }
}

impl<T> Default for Dag<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// An acyclic graph, ready for execution.
#[derive(Debug, Clone)]
pub struct Graph<T> {
    nodes: Vec<T>,
    successors: Vec<Vec<(NodeId, EdgeKind)>>,
    in_degree: Vec<usize>,
    order: Vec<NodeId>,
}

impl<T> Graph<T> {
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node(&self, id: NodeId) -> &T {
        &self.nodes[id.0]
    }

    /// Nodes in insertion order.
    pub fn nodes(&self) -> impl Iterator<Item = (NodeId, &T)> {
        self.nodes.iter().enumerate().map(|(i, n)| (NodeId(i), n))
    }

    pub fn successors(&self, id: NodeId) -> &[(NodeId, EdgeKind)] {
        &self.successors[id.0]
    }

    /// Number of edges into `id`.
    pub fn in_degree(&self, id: NodeId) -> usize {
        self.in_degree[id.0]
    }

    /// A topological order of every node.
    pub fn order(&self) -> &[NodeId] {
        &self.order
    }

    /// Nodes without prerequisites, in insertion order.
    pub fn roots(&self) -> Vec<NodeId> {
        (0..self.nodes.len())
            .filter(|&i| self.in_degree[i] == 0)
            .map(NodeId)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(graph: &Graph<&'static str>) -> Vec<&'static str> {
        graph.order().iter().map(|&id| *graph.node(id)).collect()
    }

    #[test]
    fn test_topological_order() {
        let mut dag = Dag::new();
        let route = dag.add_node("route");
        let service = dag.add_node("service");
        let plugin = dag.add_node("plugin");
        dag.add_edge(service, route, EdgeKind::Dependency);
        dag.add_edge(route, plugin, EdgeKind::Dependency);
        dag.add_edge(service, plugin, EdgeKind::Ordering);

        let graph = dag.build().unwrap();
        assert_eq!(names(&graph), ["service", "route", "plugin"]);
        assert_eq!(graph.in_degree(plugin), 2);
        assert_eq!(graph.roots(), vec![service]);
    }

    #[test]
    fn test_independent_nodes_keep_insertion_order() {
        let mut dag = Dag::new();
        dag.add_node("a");
        dag.add_node("b");
        dag.add_node("c");
        let graph = dag.build().unwrap();
        assert_eq!(names(&graph), ["a", "b", "c"]);
    }

    #[test]
    fn test_cycle_is_reported() {
        let mut dag = Dag::new();
        let a = dag.add_node("a");
        let b = dag.add_node("b");
        let c = dag.add_node("c");
        let free = dag.add_node("free");
        dag.add_edge(a, b, EdgeKind::Dependency);
        dag.add_edge(b, c, EdgeKind::Dependency);
        dag.add_edge(c, a, EdgeKind::Ordering);
        dag.add_edge(free, a, EdgeKind::Ordering);

        match dag.build() {
            Err(Error::Cycle { nodes }) => assert_eq!(nodes, ["a", "b", "c"]),
            other => panic!("expected cycle, got {other:?}"),
        }
    }

    #[test]
    fn test_repeated_edge_keeps_dependency() {
        let mut dag = Dag::new();
        let a = dag.add_node("a");
        let b = dag.add_node("b");
        dag.add_edge(a, b, EdgeKind::Ordering);
        dag.add_edge(a, b, EdgeKind::Dependency);
        dag.add_edge(a, b, EdgeKind::Ordering);

        let graph = dag.build().unwrap();
        assert_eq!(graph.successors(a), &[(b, EdgeKind::Dependency)]);
        assert_eq!(graph.in_degree(b), 1);
    }
}
