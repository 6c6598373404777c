//! Structural mutations on a graph document.
//!
//! Every operation checks all of its preconditions before touching the
//! document, so an `Err` always means the document is unchanged.

use std::collections::HashSet;

use tracing::debug;

use super::{branch_handle, fail_handle, FlowGraph, ScopeTree};
use crate::document::*;
use crate::error::{EditError, StructuralError};
use crate::schema::{default_node, schema};

/// Outcome of `remove_node`.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RemovedNodes {
    /// The node itself plus its whole sub-scope when it is a container.
    pub removed: Vec<String>,
    pub removed_edges: Vec<WorkflowEdge>,
    /// Surviving nodes that were downstream of anything removed.
    pub downstream: Vec<String>,
}

/// Insert `node` into `scope`. Containers get their boundary pair created
/// alongside. Returns the ids of every node inserted.
pub fn add_node(doc: &mut GraphDocument, mut node: WorkflowNode, scope: ScopeId) -> Result<Vec<String>, EditError> {
    let node_type = node.node_type();
    let id = node.id().to_string();

    if node_type.is_boundary() {
        return Err(EditError::unsupported(format!(
            "{} nodes are created together with their container",
            node_type
        )));
    }
    if doc.contains(&id) {
        return Err(StructuralError::DuplicateId(id).into());
    }
    if let ScopeId::Container(container) = &scope {
        let parent = doc
            .node(container)
            .ok_or_else(|| StructuralError::UnknownNode(container.clone()))?;
        if !parent.is_container() || matches!(node_type, NodeType::Start | NodeType::End) {
            return Err(StructuralError::InvalidScope(container.clone()).into());
        }
    }
    if matches!(node_type, NodeType::Start | NodeType::End) && doc.nodes.iter().any(|n| n.node_type() == node_type) {
        return Err(EditError::unsupported(format!("a workflow has exactly one {} node", node_type)));
    }

    let mut created = vec![id.clone()];
    let mut boundary = Vec::new();
    if let Some((start_type, end_type)) = node_type.boundary_pair() {
        for (t, suffix) in [(start_type, "start"), (end_type, "end")] {
            let boundary_id = format!("{}-{}", id, suffix);
            if doc.contains(&boundary_id) {
                return Err(StructuralError::DuplicateId(boundary_id).into());
            }
            let mut b = default_node(t, &boundary_id);
            b.set_parent_id(Some(id.clone()));
            created.push(boundary_id);
            boundary.push(b);
        }
    }

    node.set_parent_id(scope.container().map(String::from));
    doc.nodes.push(node);
    doc.nodes.extend(boundary);
    debug!(node_id = %id, %node_type, %scope, "node added");
    Ok(created)
}

/// Remove a node, its incident edges and, for containers, the entire
/// sub-scope.
pub fn remove_node(doc: &mut GraphDocument, id: &str) -> Result<RemovedNodes, StructuralError> {
    let node = doc
        .node(id)
        .ok_or_else(|| StructuralError::UnknownNode(id.to_string()))?;
    if !schema(node.node_type()).deletable {
        return Err(StructuralError::NotDeletable(id.to_string()));
    }

    let scopes = ScopeTree::build(doc);
    let graph = FlowGraph::build(doc);

    let mut removed = vec![id.to_string()];
    removed.extend(scopes.subtree(id));
    let gone: HashSet<&str> = removed.iter().map(String::as_str).collect();

    let mut downstream: Vec<String> = removed
        .iter()
        .flat_map(|r| graph.descendants(r))
        .filter(|d| !gone.contains(d.as_str()))
        .collect::<HashSet<_>>()
        .into_iter()
        .collect();
    graph.sort_topologically(&mut downstream);

    let (removed_edges, kept): (Vec<_>, Vec<_>) = doc
        .edges
        .drain(..)
        .partition(|e| gone.contains(e.source.as_str()) || gone.contains(e.target.as_str()));
    doc.edges = kept;
    doc.nodes.retain(|n| !gone.contains(n.id()));

    debug!(node_id = id, removed = removed.len(), edges = removed_edges.len(), "node removed");
    Ok(RemovedNodes {
        removed,
        removed_edges,
        downstream,
    })
}

/// Connect two nodes of the same scope.
pub fn add_edge(doc: &mut GraphDocument, mut edge: WorkflowEdge) -> Result<(), StructuralError> {
    let invalid = |reason: &str| StructuralError::invalid_edge(&edge.source, &edge.target, reason);

    let source = doc.node(&edge.source).ok_or_else(|| invalid("unknown source node"))?;
    let target = doc.node(&edge.target).ok_or_else(|| invalid("unknown target node"))?;

    if schema(source.node_type()).disable_connect_source {
        return Err(invalid(&format!("{} nodes have no outgoing edges", source.node_type())));
    }
    if schema(target.node_type()).disable_connect_target {
        return Err(invalid(&format!("{} nodes have no incoming edges", target.node_type())));
    }
    if source.scope() != target.scope() {
        return Err(invalid("endpoints are in different scopes"));
    }

    let handle = edge.source_handle.as_deref();
    let exclusive = match source {
        WorkflowNode::Judge(n) => {
            let known = n
                .data
                .node_param
                .branches
                .iter()
                .any(|b| handle == Some(branch_handle(&n.id, &b.id).as_str()));
            if !known {
                return Err(invalid("a Judge edge must leave through one of its branches"));
            }
            true
        }
        _ if handle == Some(fail_handle(&edge.source).as_str()) => {
            let fail_enabled = source
                .try_catch()
                .is_some_and(|tc| tc.strategy == ErrorStrategy::FailBranch);
            if !fail_enabled {
                return Err(invalid("the fail handle requires the failBranch error strategy"));
            }
            true
        }
        _ if handle.is_some_and(|h| h != edge.source) => return Err(invalid("unknown source handle")),
        _ => false,
    };

    if exclusive && doc.edges.iter().any(|e| e.source == edge.source && e.source_handle == edge.source_handle) {
        return Err(invalid("this handle is already connected"));
    }
    if doc
        .edges
        .iter()
        .any(|e| e.source == edge.source && e.target == edge.target && e.source_handle == edge.source_handle)
    {
        return Err(invalid("duplicate edge"));
    }
    if FlowGraph::build(doc).would_create_cycle(&edge.source, &edge.target) {
        return Err(StructuralError::Cycle {
            source_id: edge.source.clone(),
            target: edge.target.clone(),
        });
    }

    if edge.id.is_empty() || doc.edges.iter().any(|e| e.id == edge.id) {
        edge.id = unique_edge_id(doc, &edge);
    }
    debug!(edge_id = %edge.id, source = %edge.source, target = %edge.target, "edge added");
    doc.edges.push(edge);
    Ok(())
}

fn unique_edge_id(doc: &GraphDocument, edge: &WorkflowEdge) -> String {
    let base = match &edge.source_handle {
        Some(h) => format!("{}-{}-{}", edge.source, h, edge.target),
        None => format!("{}-{}", edge.source, edge.target),
    };
    let mut candidate = base.clone();
    let mut n = 1;
    while doc.edges.iter().any(|e| e.id == candidate) {
        n += 1;
        candidate = format!("{}-{}", base, n);
    }
    candidate
}

pub fn remove_edge(doc: &mut GraphDocument, edge_id: &str) -> Option<WorkflowEdge> {
    let pos = doc.edges.iter().position(|e| e.id == edge_id)?;
    let edge = doc.edges.remove(pos);
    debug!(edge_id, "edge removed");
    Some(edge)
}

/// Remove every edge leaving `source` through `handle`.
pub fn remove_edges_by_handle(doc: &mut GraphDocument, source: &str, handle: &str) -> Vec<WorkflowEdge> {
    let (removed, kept): (Vec<_>, Vec<_>) = doc
        .edges
        .drain(..)
        .partition(|e| e.source == source && e.source_handle.as_deref() == Some(handle));
    doc.edges = kept;
    removed
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc_with(types: &[(NodeType, &str)]) -> GraphDocument {
        let mut doc = GraphDocument::default();
        for (t, id) in types {
            add_node(&mut doc, default_node(*t, id), ScopeId::Root).unwrap();
        }
        doc
    }

    #[test]
    fn container_brings_boundary_pair() {
        let mut doc = GraphDocument::default();
        let created = add_node(&mut doc, default_node(NodeType::Iterator, "it"), ScopeId::Root).unwrap();
        assert_eq!(created, ["it", "it-start", "it-end"]);
        assert_eq!(doc.node("it-start").unwrap().scope(), ScopeId::Container("it".into()));
    }

    #[test]
    fn ids_are_unique_across_scopes() {
        let mut doc = doc_with(&[(NodeType::Iterator, "it")]);
        add_node(&mut doc, default_node(NodeType::Llm, "llm"), ScopeId::Container("it".into())).unwrap();
        let err = add_node(&mut doc, default_node(NodeType::Output, "llm"), ScopeId::Root).unwrap_err();
        assert!(matches!(err, EditError::Structural(StructuralError::DuplicateId(id)) if id == "llm"));
    }

    #[test]
    fn non_container_scope_rejected() {
        let mut doc = doc_with(&[(NodeType::Llm, "llm")]);
        let err = add_node(&mut doc, default_node(NodeType::Output, "o"), ScopeId::Container("llm".into()))
            .unwrap_err();
        assert!(matches!(err, EditError::Structural(StructuralError::InvalidScope(_))));
    }

    #[test]
    fn edge_rules() {
        let mut doc = doc_with(&[(NodeType::Start, "start"), (NodeType::Output, "out"), (NodeType::End, "end")]);
        add_edge(&mut doc, WorkflowEdge::new("start", "out")).unwrap();
        add_edge(&mut doc, WorkflowEdge::new("out", "end")).unwrap();

        let into_start = add_edge(&mut doc, WorkflowEdge::new("out", "start")).unwrap_err();
        assert!(matches!(into_start, StructuralError::InvalidEdge { .. }));
        let from_end = add_edge(&mut doc, WorkflowEdge::new("end", "out")).unwrap_err();
        assert!(matches!(from_end, StructuralError::InvalidEdge { .. }));
        let dup = add_edge(&mut doc, WorkflowEdge::new("start", "out")).unwrap_err();
        assert!(matches!(dup, StructuralError::InvalidEdge { reason, .. } if reason == "duplicate edge"));
        assert_eq!(doc.edges.len(), 2);
    }

    #[test]
    fn cross_scope_edge_rejected() {
        let mut doc = doc_with(&[(NodeType::Start, "start"), (NodeType::Iterator, "it")]);
        add_node(&mut doc, default_node(NodeType::Output, "inner"), ScopeId::Container("it".into())).unwrap();
        let err = add_edge(&mut doc, WorkflowEdge::new("start", "inner")).unwrap_err();
        assert!(matches!(err, StructuralError::InvalidEdge { .. }));
    }

    #[test]
    fn removing_container_cascades() {
        let mut doc = doc_with(&[(NodeType::Start, "start"), (NodeType::Iterator, "it"), (NodeType::End, "end")]);
        add_node(&mut doc, default_node(NodeType::Output, "inner"), ScopeId::Container("it".into())).unwrap();
        add_edge(&mut doc, WorkflowEdge::new("start", "it")).unwrap();
        add_edge(&mut doc, WorkflowEdge::new("it", "end")).unwrap();
        add_edge(&mut doc, WorkflowEdge::new("it-start", "inner")).unwrap();

        let out = remove_node(&mut doc, "it").unwrap();
        assert_eq!(out.removed, ["it", "inner", "it-end", "it-start"]);
        assert_eq!(out.downstream, ["end"]);
        assert_eq!(out.removed_edges.len(), 3);
        assert!(doc.edges.is_empty());
        assert_eq!(doc.nodes.len(), 2);
    }

    #[test]
    fn system_nodes_cannot_be_removed() {
        let mut doc = doc_with(&[(NodeType::Start, "start"), (NodeType::Iterator, "it")]);
        assert_eq!(remove_node(&mut doc, "start"), Err(StructuralError::NotDeletable("start".into())));
        assert_eq!(remove_node(&mut doc, "it-end"), Err(StructuralError::NotDeletable("it-end".into())));
        assert_eq!(remove_node(&mut doc, "nope"), Err(StructuralError::UnknownNode("nope".into())));
    }
}
