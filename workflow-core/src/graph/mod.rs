//! petgraph-based adjacency index over a graph document, plus the scope tree
//! and the structural mutation operations.

pub mod ops;
pub mod scope;

pub use ops::{add_edge, add_node, remove_edge, remove_node, RemovedNodes};
pub use scope::{ancestors_in_scope, scope_levels, ScopeLevel, ScopeTree};

use std::collections::{HashMap, HashSet};

use petgraph::algo::{has_path_connecting, toposort};
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::{Bfs, Reversed};
use petgraph::Direction;

use crate::document::GraphDocument;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EdgeLabel {
    pub id: String,
    pub source_handle: Option<String>,
}

/// Source handle of the edge leaving a Judge through `branch_id`.
pub fn branch_handle(judge_id: &str, branch_id: &str) -> String {
    format!("{}_{}", judge_id, branch_id)
}

/// Source handle of a node's reserved failure edge.
pub fn fail_handle(node_id: &str) -> String {
    format!("{}_fail", node_id)
}

/// Derived index, rebuilt from a document whenever it is needed. Edges whose
/// endpoints are missing are skipped here and reported by validation.
pub struct FlowGraph {
    pub graph: DiGraph<String, EdgeLabel>,
    pub node_indices: HashMap<String, NodeIndex>,
    /// Position of each node in a topological order of the whole document.
    order: HashMap<String, usize>,
}

impl FlowGraph {
    pub fn build(doc: &GraphDocument) -> Self {
        let mut graph = DiGraph::new();
        let mut node_indices = HashMap::new();

        for node in &doc.nodes {
            let id = node.id().to_string();
            let idx = graph.add_node(id.clone());
            node_indices.insert(id, idx);
        }

        for edge in &doc.edges {
            if let (Some(&s), Some(&t)) = (node_indices.get(&edge.source), node_indices.get(&edge.target)) {
                graph.add_edge(
                    s,
                    t,
                    EdgeLabel {
                        id: edge.id.clone(),
                        source_handle: edge.source_handle.clone(),
                    },
                );
            }
        }

        // A cyclic document (only possible when loaded, never through edits)
        // falls back to document order.
        let order = match toposort(&graph, None) {
            Ok(sorted) => sorted
                .into_iter()
                .enumerate()
                .map(|(i, idx)| (graph[idx].clone(), i))
                .collect(),
            Err(_) => doc
                .nodes
                .iter()
                .enumerate()
                .map(|(i, n)| (n.id().to_string(), i))
                .collect(),
        };

        FlowGraph {
            graph,
            node_indices,
            order,
        }
    }

    pub fn contains(&self, node_id: &str) -> bool {
        self.node_indices.contains_key(node_id)
    }

    pub fn successors(&self, node_id: &str) -> Vec<&str> {
        self.neighbors(node_id, Direction::Outgoing)
    }

    pub fn predecessors(&self, node_id: &str) -> Vec<&str> {
        self.neighbors(node_id, Direction::Incoming)
    }

    fn neighbors(&self, node_id: &str, dir: Direction) -> Vec<&str> {
        let Some(&idx) = self.node_indices.get(node_id) else {
            return vec![];
        };
        self.graph
            .neighbors_directed(idx, dir)
            .map(|n| self.graph[n].as_str())
            .collect()
    }

    /// Every node reachable backward from `node_id`, excluding itself.
    pub fn ancestors(&self, node_id: &str) -> HashSet<String> {
        let Some(&idx) = self.node_indices.get(node_id) else {
            return HashSet::new();
        };
        let reversed = Reversed(&self.graph);
        let mut bfs = Bfs::new(reversed, idx);
        let mut out = HashSet::new();
        while let Some(n) = bfs.next(reversed) {
            if n != idx {
                out.insert(self.graph[n].clone());
            }
        }
        out
    }

    /// Every node reachable forward from `node_id`, excluding itself.
    pub fn descendants(&self, node_id: &str) -> HashSet<String> {
        let Some(&idx) = self.node_indices.get(node_id) else {
            return HashSet::new();
        };
        let mut bfs = Bfs::new(&self.graph, idx);
        let mut out = HashSet::new();
        while let Some(n) = bfs.next(&self.graph) {
            if n != idx {
                out.insert(self.graph[n].clone());
            }
        }
        out
    }

    /// Whether adding `source -> target` would close a cycle.
    pub fn would_create_cycle(&self, source: &str, target: &str) -> bool {
        if source == target {
            return true;
        }
        match (self.node_indices.get(source), self.node_indices.get(target)) {
            (Some(&s), Some(&t)) => has_path_connecting(&self.graph, t, s, None),
            _ => false,
        }
    }

    pub fn is_cyclic(&self) -> bool {
        petgraph::algo::is_cyclic_directed(&self.graph)
    }

    /// Sort ids by topological position; unknown ids go last.
    pub fn sort_topologically(&self, ids: &mut [String]) {
        ids.sort_by_key(|id| self.order.get(id).copied().unwrap_or(usize::MAX));
    }
}
