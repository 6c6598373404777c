//! Scope containment of resolvable variables and cycle rejection.

mod helpers;

use std::collections::HashSet;

use helpers::*;
use workflow_core::document::*;
use workflow_core::error::{EditError, StructuralError};
use workflow_core::graph::{add_edge, add_node, ancestors_in_scope, FlowGraph, ScopeTree};
use workflow_core::value::ValueType;
use workflow_core::variable::GroupKind;

/// Root: `start -> a -> par -> end`, `start -> side`, `start -> other`.
/// `par` body: `par-start -> inner -> par-end`.
/// `other` body: `other-start -> hidden`.
fn nested() -> GraphDocument {
    let mut doc = GraphDocument::default();
    add_node(&mut doc, workflow_core::schema::default_node(NodeType::Start, "start"), ScopeId::Root).unwrap();
    add_node(&mut doc, script("side", "y", ValueType::String, None), ScopeId::Root).unwrap();
    add_node(&mut doc, script("a", "x", ValueType::array_of(ValueType::String), None), ScopeId::Root).unwrap();
    add_node(&mut doc, workflow_core::schema::default_node(NodeType::Parallel, "par"), ScopeId::Root).unwrap();
    add_node(&mut doc, workflow_core::schema::default_node(NodeType::Iterator, "other"), ScopeId::Root).unwrap();
    add_node(&mut doc, workflow_core::schema::default_node(NodeType::End, "end"), ScopeId::Root).unwrap();

    let body = ScopeId::Container("par".into());
    add_node(&mut doc, script("inner", "z", ValueType::String, None), body).unwrap();
    add_node(
        &mut doc,
        script("hidden", "secret", ValueType::String, None),
        ScopeId::Container("other".into()),
    )
    .unwrap();

    for (s, t) in [
        ("start", "side"),
        ("start", "a"),
        ("a", "par"),
        ("par", "end"),
        ("start", "other"),
        ("par-start", "inner"),
        ("inner", "par-end"),
        ("other-start", "hidden"),
    ] {
        add_edge(&mut doc, WorkflowEdge::new(s, t)).unwrap();
    }
    doc
}

#[test]
fn container_body_sees_only_its_ancestor_chain() {
    let doc = nested();
    let allowed: HashSet<&str> = ["global", "sys", "start", "a", "par", "inner"].into_iter().collect();
    let mut registry = registry(doc.clone());

    for node in doc.nodes.iter().filter(|n| n.parent_id() == Some("par")) {
        for group in registry.resolvable_variables(node.id()) {
            assert!(
                allowed.contains(group.node_id.as_str()),
                "{} sees {}",
                node.id(),
                group.node_id
            );
        }
    }

    let groups = registry.resolvable_variables("inner");
    let par = groups.iter().find(|g| g.node_id == "par").unwrap();
    assert_eq!(par.kind, GroupKind::Container);
    assert!(groups.iter().all(|g| g.node_id != "side" && g.node_id != "hidden"));
}

#[test]
fn ancestors_in_scope_walk_outwards() {
    let doc = nested();
    let graph = FlowGraph::build(&doc);
    let scopes = ScopeTree::build(&doc);
    assert_eq!(ancestors_in_scope(&graph, &scopes, "inner"), ["start", "a", "par-start"]);
    assert!(ancestors_in_scope(&graph, &scopes, "hidden").iter().all(|id| id != "a"));
}

#[test]
fn edge_closing_a_cycle_is_rejected_without_change() {
    let mut doc = chain(&["a", "b", "c"]);
    let before = doc.clone();

    let err = add_edge(&mut doc, WorkflowEdge::new("c", "a")).unwrap_err();
    assert!(matches!(err, StructuralError::Cycle { .. }), "{:?}", err);
    assert_eq!(doc, before);

    let err = add_edge(&mut doc, WorkflowEdge::new("b", "b")).unwrap_err();
    assert!(matches!(err, StructuralError::Cycle { .. }), "{:?}", err);
    assert_eq!(doc, before);
}

#[test]
fn session_rejects_cycle_and_keeps_version() {
    let mut editor = workflow_core::Editor::new(chain(&["a", "b"]), Default::default());
    let version = editor.version();
    let edges = editor.document().edges.clone();

    let err = editor.add_edge(WorkflowEdge::new("b", "a")).unwrap_err();
    assert!(matches!(err, EditError::Structural(StructuralError::Cycle { .. })));
    assert_eq!(editor.version(), version);
    assert_eq!(editor.document().edges, edges);
    assert!(!editor.can_undo());
}

#[test]
fn edges_may_not_cross_scopes() {
    let mut doc = nested();
    let err = add_edge(&mut doc, WorkflowEdge::new("a", "inner")).unwrap_err();
    assert!(matches!(err, StructuralError::InvalidEdge { .. }));

    let err = add_edge(&mut doc, WorkflowEdge::new("inner", "end")).unwrap_err();
    assert!(matches!(err, StructuralError::InvalidEdge { .. }));
}

#[test]
fn duplicate_ids_are_rejected_graph_wide() {
    let mut doc = nested();
    let err = add_node(
        &mut doc,
        script("inner", "w", ValueType::String, None),
        ScopeId::Container("other".into()),
    )
    .unwrap_err();
    assert!(matches!(err, EditError::Structural(StructuralError::DuplicateId(ref id)) if id == "inner"));
}
