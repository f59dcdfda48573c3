//! Resolved dependency graph
//!
//! Immutable once built. Edges point from a module to each of its
//! dependencies; a fresh resolution always produces a fresh graph.

use crate::error::ResolutionError;
use crate::module::ModuleRef;
use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::Direction::{Incoming, Outgoing};
use serde::{Serialize, Serializer};
use std::collections::{HashMap, HashSet};
use std::fmt;

/// Where a node's dependency list came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscoverySource {
    /// Declared by the formula's discovery handler
    Dynamic,
    /// Taken from the static manifest
    StaticFallback,
}

impl fmt::Display for DiscoverySource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Dynamic => write!(f, "dynamic"),
            Self::StaticFallback => write!(f, "static"),
        }
    }
}

/// One resolved module and the modules it depends on
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModuleNode {
    pub module: ModuleRef,
    /// Dependencies in declaration order
    pub deps: Vec<ModuleRef>,
    pub source: DiscoverySource,
}

/// A cycle-free dependency graph with at most one node per module
#[derive(Debug, Clone)]
pub struct ResolvedGraph {
    root: ModuleRef,
    graph: DiGraph<ModuleNode, ()>,
    index: HashMap<ModuleRef, NodeIndex>,
    /// Dependencies before dependents
    order: Vec<NodeIndex>,
}

impl ResolvedGraph {
    /// Build a graph from nodes, checking that every edge lands on a node
    /// and that there are no cycles. Duplicate nodes keep the first entry;
    /// a dependency listed twice on one node is kept once.
    pub fn new(root: ModuleRef, nodes: Vec<ModuleNode>) -> Result<Self, ResolutionError> {
        let mut graph = DiGraph::with_capacity(nodes.len(), 0);
        let mut index = HashMap::with_capacity(nodes.len());

        for mut node in nodes {
            if index.contains_key(&node.module) {
                continue;
            }
            let mut seen = HashSet::new();
            node.deps.retain(|dep| seen.insert(dep.clone()));
            let module = node.module.clone();
            let idx = graph.add_node(node);
            index.insert(module, idx);
        }

        if !index.contains_key(&root) {
            return Err(ResolutionError::DanglingEdge {
                module: root.clone(),
                dependency: root,
            });
        }

        let mut edges = Vec::new();
        for idx in graph.node_indices() {
            let node = &graph[idx];
            for dep in &node.deps {
                let dep_idx = index.get(dep).ok_or_else(|| ResolutionError::DanglingEdge {
                    module: node.module.clone(),
                    dependency: dep.clone(),
                })?;
                edges.push((idx, *dep_idx));
            }
        }
        for (from, to) in edges {
            graph.update_edge(from, to, ());
        }

        let mut order = toposort(&graph, None)
            .map_err(|cycle| ResolutionError::Cycle(vec![graph[cycle.node_id()].module.clone()]))?;
        order.reverse();

        Ok(Self {
            root,
            graph,
            index,
            order,
        })
    }

    pub fn root(&self) -> &ModuleRef {
        &self.root
    }

    pub fn len(&self) -> usize {
        self.graph.node_count()
    }

    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }

    pub fn contains(&self, module: &ModuleRef) -> bool {
        self.index.contains_key(module)
    }

    pub fn get(&self, module: &ModuleRef) -> Option<&ModuleNode> {
        self.index.get(module).map(|&idx| &self.graph[idx])
    }

    /// The node selected for a module path, whatever its version
    pub fn by_path(&self, path: &str) -> Option<&ModuleNode> {
        self.graph.node_weights().find(|n| n.module.path == path)
    }

    /// Nodes with every dependency before its dependents
    pub fn topo_order(&self) -> impl Iterator<Item = &ModuleNode> {
        self.order.iter().map(|&idx| &self.graph[idx])
    }

    /// Modules that depend directly on `module`, sorted
    pub fn dependents(&self, module: &ModuleRef) -> Vec<&ModuleRef> {
        let Some(&idx) = self.index.get(module) else {
            return Vec::new();
        };
        let mut out: Vec<&ModuleRef> = self
            .graph
            .neighbors_directed(idx, Incoming)
            .map(|n| &self.graph[n].module)
            .collect();
        out.sort();
        out.dedup();
        out
    }

    /// Every module `module` depends on, directly or not, in topological order
    pub fn transitive_deps(&self, module: &ModuleRef) -> Vec<&ModuleRef> {
        let Some(&start) = self.index.get(module) else {
            return Vec::new();
        };

        let mut seen = HashSet::new();
        let mut stack: Vec<NodeIndex> = self.graph.neighbors_directed(start, Outgoing).collect();
        while let Some(idx) = stack.pop() {
            if seen.insert(idx) {
                stack.extend(self.graph.neighbors_directed(idx, Outgoing));
            }
        }

        self.order
            .iter()
            .filter(|idx| seen.contains(idx))
            .map(|&idx| &self.graph[idx].module)
            .collect()
    }
}

impl Serialize for ResolvedGraph {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        #[derive(Serialize)]
        struct GraphJson<'a> {
            root: &'a ModuleRef,
            nodes: Vec<&'a ModuleNode>,
        }

        GraphJson {
            root: &self.root,
            nodes: self.topo_order().collect(),
        }
        .serialize(serializer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn m(path: &str) -> ModuleRef {
        ModuleRef::new(path, "1.0")
    }

    fn node(path: &str, deps: &[&str]) -> ModuleNode {
        ModuleNode {
            module: m(path),
            deps: deps.iter().map(|d| m(d)).collect(),
            source: DiscoverySource::Dynamic,
        }
    }

    fn position(graph: &ResolvedGraph, path: &str) -> usize {
        graph
            .topo_order()
            .position(|n| n.module.path == path)
            .unwrap()
    }

    #[test]
    fn topo_order_puts_deps_first() {
        // a -> b -> d, a -> c -> d
        let graph = ResolvedGraph::new(
            m("a"),
            vec![
                node("a", &["b", "c"]),
                node("b", &["d"]),
                node("c", &["d"]),
                node("d", &[]),
            ],
        )
        .unwrap();

        assert_eq!(graph.len(), 4);
        assert!(position(&graph, "d") < position(&graph, "b"));
        assert!(position(&graph, "d") < position(&graph, "c"));
        assert!(position(&graph, "b") < position(&graph, "a"));
        assert!(position(&graph, "c") < position(&graph, "a"));
    }

    #[test]
    fn rejects_cycles() {
        let err = ResolvedGraph::new(m("a"), vec![node("a", &["b"]), node("b", &["a"])]).unwrap_err();
        assert!(matches!(err, ResolutionError::Cycle(_)));
    }

    #[test]
    fn rejects_dangling_edges() {
        let err = ResolvedGraph::new(m("a"), vec![node("a", &["zz"])]).unwrap_err();
        assert!(matches!(err, ResolutionError::DanglingEdge { .. }));
    }

    #[test]
    fn repeated_dependency_is_kept_once() {
        let graph = ResolvedGraph::new(
            m("a/a"),
            vec![node("a/a", &["b/b", "c/c", "b/b"]), node("b/b", &[]), node("c/c", &[])],
        )
        .unwrap();

        assert_eq!(graph.get(&m("a/a")).unwrap().deps, vec![m("b/b"), m("c/c")]);
        assert_eq!(graph.dependents(&m("b/b")), vec![&m("a/a")]);
    }

    #[test]
    fn duplicate_nodes_collapse() {
        let graph = ResolvedGraph::new(m("a"), vec![node("a", &[]), node("a", &[])]).unwrap();
        assert_eq!(graph.len(), 1);
    }

    #[test]
    fn dependents_and_transitive_deps() {
        let graph = ResolvedGraph::new(
            m("a"),
            vec![
                node("a", &["b", "c"]),
                node("b", &["d"]),
                node("c", &["d"]),
                node("d", &[]),
            ],
        )
        .unwrap();

        assert_eq!(graph.dependents(&m("d")), vec![&m("b"), &m("c")]);
        assert!(graph.dependents(&m("a")).is_empty());

        let deps = graph.transitive_deps(&m("a"));
        assert_eq!(deps.len(), 3);
        assert_eq!(deps.first(), Some(&&m("d")));
        assert!(graph.transitive_deps(&m("d")).is_empty());
    }

    #[test]
    fn lookup_by_path() {
        let graph = ResolvedGraph::new(m("a"), vec![node("a", &[])]).unwrap();
        assert_eq!(graph.by_path("a").unwrap().module.version, "1.0");
        assert!(graph.by_path("b").is_none());
    }

    #[test]
    fn serializes_in_topo_order() {
        let graph = ResolvedGraph::new(m("a"), vec![node("a", &["b"]), node("b", &[])]).unwrap();
        let json = serde_json::to_value(&graph).unwrap();
        assert_eq!(json["root"]["path"], "a");
        assert_eq!(json["nodes"][0]["module"]["path"], "b");
        assert_eq!(json["nodes"][1]["source"], "dynamic");
    }
}
