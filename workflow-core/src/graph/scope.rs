//! Explicit scope tree: root graph plus one child scope per container.

use std::collections::{HashMap, HashSet};

use super::FlowGraph;
use crate::document::{GraphDocument, ScopeId};

#[derive(Debug, Clone, Default)]
pub struct ScopeTree {
    /// Node id -> enclosing container id.
    parents: HashMap<String, Option<String>>,
}

impl ScopeTree {
    pub fn build(doc: &GraphDocument) -> Self {
        let parents = doc
            .nodes
            .iter()
            .map(|n| (n.id().to_string(), n.parent_id().map(String::from)))
            .collect();
        ScopeTree { parents }
    }

    pub fn scope_of(&self, node_id: &str) -> Option<ScopeId> {
        self.parents
            .get(node_id)
            .map(|p| ScopeId::from_parent(p.as_deref()))
    }

    /// Containers around `node_id`, innermost first.
    pub fn enclosing(&self, node_id: &str) -> Vec<String> {
        let mut out = Vec::new();
        let mut seen = HashSet::new();
        let mut current = node_id;
        while let Some(Some(parent)) = self.parents.get(current) {
            if !seen.insert(parent.as_str()) {
                break;
            }
            out.push(parent.clone());
            current = parent;
        }
        out
    }

    /// Whether `node_id` sits anywhere inside `container`'s sub-scope.
    pub fn is_inside(&self, node_id: &str, container: &str) -> bool {
        self.enclosing(node_id).iter().any(|c| c == container)
    }

    /// Nodes directly in `scope`.
    pub fn members(&self, scope: &ScopeId) -> Vec<String> {
        let mut ids: Vec<String> = self
            .parents
            .iter()
            .filter(|(_, p)| ScopeId::from_parent(p.as_deref()) == *scope)
            .map(|(id, _)| id.clone())
            .collect();
        ids.sort();
        ids
    }

    /// Every node nested inside `container`, at any depth.
    pub fn subtree(&self, container: &str) -> Vec<String> {
        let mut ids: Vec<String> = self
            .parents
            .keys()
            .filter(|id| self.is_inside(id, container))
            .cloned()
            .collect();
        ids.sort();
        ids
    }
}

/// One level of a node's scope chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScopeLevel {
    /// Container opening this level, `None` for the root graph.
    pub container: Option<String>,
    /// Backward-reachable nodes at this level, in topological order.
    pub ancestors: Vec<String>,
}

/// Scope chain of `node_id`, outermost level first. At each level the
/// ancestors are those of the node (innermost level) or of the container
/// that encloses the next level down.
pub fn scope_levels(graph: &FlowGraph, scopes: &ScopeTree, node_id: &str) -> Vec<ScopeLevel> {
    let mut levels = Vec::new();
    let mut current = node_id.to_string();
    let mut seen = HashSet::new();
    while let Some(scope) = scopes.scope_of(&current) {
        if !seen.insert(current.clone()) {
            break;
        }
        let mut ancestors: Vec<String> = graph
            .ancestors(&current)
            .into_iter()
            .filter(|a| scopes.scope_of(a).as_ref() == Some(&scope))
            .collect();
        graph.sort_topologically(&mut ancestors);
        let container = scope.container().map(String::from);
        levels.push(ScopeLevel {
            container: container.clone(),
            ancestors,
        });
        match container {
            None => break,
            Some(c) => current = c,
        }
    }
    levels.reverse();
    levels
}

/// Nodes whose outputs `node_id` may refer to: backward-reachable nodes in
/// its own scope, then those of each enclosing container in the container's
/// scope. Outer scopes come first.
pub fn ancestors_in_scope(graph: &FlowGraph, scopes: &ScopeTree, node_id: &str) -> Vec<String> {
    scope_levels(graph, scopes, node_id)
        .into_iter()
        .flat_map(|l| l.ancestors)
        .collect()
}
