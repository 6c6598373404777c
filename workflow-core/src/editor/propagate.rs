//! Which nodes must be re-resolved and re-validated after an edit.

use std::collections::BTreeSet;

use crate::document::GraphDocument;
use crate::graph::{FlowGraph, ScopeTree};
use crate::validate::referenced_nodes;

/// What an edit touched, as reported by the operation that made it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Touched {
    /// Nodes whose outputs, inputs or incoming edges changed.
    pub seeds: Vec<String>,
    /// Nodes that no longer exist.
    pub removed: Vec<String>,
    /// Global or session variables changed; every node is affected.
    pub global: bool,
}

impl Touched {
    pub fn node(id: impl Into<String>) -> Self {
        Touched {
            seeds: vec![id.into()],
            ..Touched::default()
        }
    }

    pub fn global() -> Self {
        Touched {
            global: true,
            ..Touched::default()
        }
    }

    pub fn with_seeds(mut self, ids: impl IntoIterator<Item = String>) -> Self {
        self.seeds.extend(ids);
        self
    }

    pub fn with_removed(mut self, ids: impl IntoIterator<Item = String>) -> Self {
        self.removed.extend(ids);
        self
    }
}

/// Surviving nodes affected by an edit, in topological order.
///
/// The closure is: the seeds, everything downstream of them, the bodies of
/// affected containers, every container enclosing an affected node, and
/// every node referring to a seed or a removed node.
pub fn affected_nodes(doc: &GraphDocument, graph: &FlowGraph, scopes: &ScopeTree, touched: &Touched) -> Vec<String> {
    if touched.global {
        return doc.nodes.iter().map(|n| n.id().to_string()).collect();
    }

    let mut set: BTreeSet<String> = BTreeSet::new();
    for seed in touched.seeds.iter().filter(|id| doc.contains(id)) {
        set.insert(seed.clone());
        set.extend(graph.descendants(seed));
    }

    let containers: Vec<String> = set
        .iter()
        .filter(|id| doc.node(id).is_some_and(|n| n.is_container()))
        .cloned()
        .collect();
    for container in containers {
        for member in scopes.subtree(&container) {
            set.extend(graph.descendants(&member));
            set.insert(member);
        }
    }

    let enclosing: Vec<String> = set.iter().flat_map(|id| scopes.enclosing(id)).collect();
    set.extend(enclosing);

    let changed: BTreeSet<&str> = touched
        .seeds
        .iter()
        .chain(&touched.removed)
        .map(String::as_str)
        .collect();
    for node in &doc.nodes {
        if referenced_nodes(node).iter().any(|id| changed.contains(id.as_str())) {
            set.insert(node.id().to_string());
        }
    }

    let mut affected: Vec<String> = set.into_iter().filter(|id| doc.contains(id)).collect();
    graph.sort_topologically(&mut affected);
    affected
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::*;
    use crate::graph::{add_edge, add_node};
    use crate::schema::default_node;

    fn doc() -> GraphDocument {
        let mut doc = GraphDocument::default();
        for (ty, id) in [
            (NodeType::Start, "start"),
            (NodeType::Llm, "llm"),
            (NodeType::Iterator, "it"),
            (NodeType::Output, "side"),
            (NodeType::End, "end"),
        ] {
            add_node(&mut doc, default_node(ty, id), ScopeId::Root).unwrap();
        }
        add_node(&mut doc, default_node(NodeType::Script, "inner"), ScopeId::Container("it".into())).unwrap();
        add_edge(&mut doc, WorkflowEdge::new("start", "llm")).unwrap();
        add_edge(&mut doc, WorkflowEdge::new("llm", "it")).unwrap();
        add_edge(&mut doc, WorkflowEdge::new("it", "end")).unwrap();
        add_edge(&mut doc, WorkflowEdge::new("start", "side")).unwrap();
        add_edge(&mut doc, WorkflowEdge::new("it-start", "inner")).unwrap();
        add_edge(&mut doc, WorkflowEdge::new("inner", "it-end")).unwrap();
        doc
    }

    fn affected(doc: &GraphDocument, touched: &Touched) -> Vec<String> {
        let graph = FlowGraph::build(doc);
        let scopes = ScopeTree::build(doc);
        affected_nodes(doc, &graph, &scopes, touched)
    }

    #[test]
    fn downstream_and_container_bodies() {
        let doc = doc();
        let ids = affected(&doc, &Touched::node("llm"));
        for id in ["llm", "it", "it-start", "inner", "it-end", "end"] {
            assert!(ids.contains(&id.to_string()), "missing {}", id);
        }
        assert!(!ids.contains(&"side".to_string()));
        assert!(!ids.contains(&"start".to_string()));
    }

    #[test]
    fn inner_change_reaches_enclosing_container() {
        let doc = doc();
        let ids = affected(&doc, &Touched::node("inner"));
        assert!(ids.contains(&"it".to_string()));
        assert!(!ids.contains(&"end".to_string()));
    }

    #[test]
    fn referrers_of_removed_nodes_are_affected() {
        let mut doc = doc();
        if let Some(WorkflowNode::Output(n)) = doc.node_mut("side") {
            n.data.node_param.output = "${gone.text}".into();
        }
        let ids = affected(&doc, &Touched::default().with_removed(["gone".to_string()]));
        assert_eq!(ids, ["side"]);
    }

    #[test]
    fn global_change_touches_everything() {
        let doc = doc();
        assert_eq!(affected(&doc, &Touched::global()).len(), doc.nodes.len());
    }
}
