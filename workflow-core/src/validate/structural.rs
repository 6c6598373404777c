//! Document-level structural rules (S001–S011).
//!
//! Edits made through the graph operations can never produce these; they
//! catch documents that were loaded or hand-edited.

use std::collections::HashSet;

use petgraph::algo::is_cyclic_directed;

use crate::document::*;
use crate::error::ValidationIssue;
use crate::graph::{branch_handle, fail_handle, FlowGraph};
use crate::schema::schema;

/// Run all structural rules. Returns every finding.
pub fn validate_structural(doc: &GraphDocument, graph: &FlowGraph) -> Vec<ValidationIssue> {
    let mut issues = Vec::new();

    s001_exactly_one_start(doc, &mut issues);
    s002_exactly_one_end(doc, &mut issues);
    s003_edges_reference_existing_nodes(doc, &mut issues);
    s004_unique_node_ids(doc, &mut issues);
    s005_no_duplicate_edges(doc, &mut issues);
    s006_no_cycles(graph, &mut issues);
    s007_edges_stay_in_scope(doc, &mut issues);
    s008_source_handles_exist(doc, &mut issues);
    s009_parents_are_containers(doc, &mut issues);
    s010_containers_have_boundaries(doc, &mut issues);
    s011_connect_flags(doc, &mut issues);

    issues
}

fn s001_exactly_one_start(doc: &GraphDocument, issues: &mut Vec<ValidationIssue>) {
    let count = doc.nodes.iter().filter(|n| n.node_type() == NodeType::Start).count();
    if count != 1 {
        issues.push(ValidationIssue::structural(
            "S001",
            None,
            format!("Workflow must have exactly 1 Start node, found {}", count),
        ));
    }
}

fn s002_exactly_one_end(doc: &GraphDocument, issues: &mut Vec<ValidationIssue>) {
    let count = doc.nodes.iter().filter(|n| n.node_type() == NodeType::End).count();
    if count != 1 {
        issues.push(ValidationIssue::structural(
            "S002",
            None,
            format!("Workflow must have exactly 1 End node, found {}", count),
        ));
    }
}

fn s003_edges_reference_existing_nodes(doc: &GraphDocument, issues: &mut Vec<ValidationIssue>) {
    for edge in &doc.edges {
        for (end, id) in [("source", &edge.source), ("target", &edge.target)] {
            if !doc.contains(id) {
                issues.push(ValidationIssue::structural(
                    "S003",
                    None,
                    format!("Edge '{}' references unknown {} node '{}'", edge.id, end, id),
                ));
            }
        }
    }
}

fn s004_unique_node_ids(doc: &GraphDocument, issues: &mut Vec<ValidationIssue>) {
    let mut seen = HashSet::new();
    for node in &doc.nodes {
        if !seen.insert(node.id()) {
            issues.push(ValidationIssue::structural(
                "S004",
                Some(node.id()),
                format!("Node id '{}' is used more than once", node.id()),
            ));
        }
    }
}

fn s005_no_duplicate_edges(doc: &GraphDocument, issues: &mut Vec<ValidationIssue>) {
    let mut seen = HashSet::new();
    for edge in &doc.edges {
        if !seen.insert((&edge.source, &edge.target, &edge.source_handle)) {
            issues.push(ValidationIssue::structural(
                "S005",
                Some(&edge.source),
                format!("Duplicate edge from '{}' to '{}'", edge.source, edge.target),
            ));
        }
    }
}

fn s006_no_cycles(graph: &FlowGraph, issues: &mut Vec<ValidationIssue>) {
    if is_cyclic_directed(&graph.graph) {
        issues.push(ValidationIssue::structural("S006", None, "Workflow graph contains a cycle"));
    }
}

fn s007_edges_stay_in_scope(doc: &GraphDocument, issues: &mut Vec<ValidationIssue>) {
    for edge in &doc.edges {
        let (Some(s), Some(t)) = (doc.node(&edge.source), doc.node(&edge.target)) else {
            continue;
        };
        if s.scope() != t.scope() {
            issues.push(ValidationIssue::structural(
                "S007",
                Some(&edge.source),
                format!(
                    "Edge '{}' connects scope '{}' to scope '{}'",
                    edge.id,
                    s.scope(),
                    t.scope()
                ),
            ));
        }
    }
}

fn s008_source_handles_exist(doc: &GraphDocument, issues: &mut Vec<ValidationIssue>) {
    for edge in &doc.edges {
        let Some(source) = doc.node(&edge.source) else { continue };
        let handle = edge.source_handle.as_deref();
        let ok = match source {
            WorkflowNode::Judge(n) => n
                .data
                .node_param
                .branches
                .iter()
                .any(|b| handle == Some(branch_handle(&n.id, &b.id).as_str())),
            _ if handle == Some(fail_handle(source.id()).as_str()) => source
                .try_catch()
                .is_some_and(|tc| tc.strategy == ErrorStrategy::FailBranch),
            _ => handle.is_none_or(|h| h == source.id()),
        };
        if !ok {
            issues.push(ValidationIssue::structural(
                "S008",
                Some(source.id()),
                format!(
                    "Edge '{}' leaves '{}' through unknown handle '{}'",
                    edge.id,
                    source.id(),
                    handle.unwrap_or("")
                ),
            ));
        }
    }
}

fn s009_parents_are_containers(doc: &GraphDocument, issues: &mut Vec<ValidationIssue>) {
    for node in &doc.nodes {
        let Some(parent) = node.parent_id() else { continue };
        let valid = doc.node(parent).is_some_and(|p| p.is_container());
        if !valid {
            issues.push(ValidationIssue::structural(
                "S009",
                Some(node.id()),
                format!("Node '{}' is placed in '{}', which is not a container", node.id(), parent),
            ));
        }
    }
}

fn s010_containers_have_boundaries(doc: &GraphDocument, issues: &mut Vec<ValidationIssue>) {
    for node in doc.nodes.iter().filter(|n| n.is_container()) {
        let Some((start, end)) = node.node_type().boundary_pair() else { continue };
        let scope = node_scope(node);
        for wanted in [start, end] {
            let count = doc.nodes_in_scope(&scope).filter(|n| n.node_type() == wanted).count();
            if count != 1 {
                issues.push(ValidationIssue::structural(
                    "S010",
                    Some(node.id()),
                    format!("Container '{}' must hold exactly 1 {} node, found {}", node.id(), wanted, count),
                ));
            }
        }
    }
}

fn node_scope(container: &WorkflowNode) -> ScopeId {
    ScopeId::Container(container.id().to_string())
}

fn s011_connect_flags(doc: &GraphDocument, issues: &mut Vec<ValidationIssue>) {
    for edge in &doc.edges {
        if let Some(s) = doc.node(&edge.source) {
            if schema(s.node_type()).disable_connect_source {
                issues.push(ValidationIssue::structural(
                    "S011",
                    Some(s.id()),
                    format!("{} node '{}' must not have outgoing edges", s.node_type(), s.id()),
                ));
            }
        }
        if let Some(t) = doc.node(&edge.target) {
            if schema(t.node_type()).disable_connect_target {
                issues.push(ValidationIssue::structural(
                    "S011",
                    Some(t.id()),
                    format!("{} node '{}' must not have incoming edges", t.node_type(), t.id()),
                ));
            }
        }
    }
}
