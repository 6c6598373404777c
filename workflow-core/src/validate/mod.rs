//! Validation phase: node rules, reference resolution, document structure
//! and publish gating.

pub mod references;
pub mod structural;

use std::collections::{HashSet, VecDeque};

use serde::Serialize;
use tracing::info;

use crate::config::EditorConfig;
use crate::document::*;
use crate::error::{IssueKind, ValidationIssue};
use crate::error_policy::missing_fail_edges;
use crate::schema::{check_valid, rules::check_global_variables};
use crate::variable::VariableRegistry;

pub use references::{check_refs, collect_refs, referenced_nodes, RefSite};
pub use structural::validate_structural;

/// Rules and references of a single node. Empty for unknown ids.
pub fn validate_node(registry: &mut VariableRegistry, node_id: &str) -> Vec<ValidationIssue> {
    let doc = registry.shared();
    let Some(node) = doc.node(node_id) else {
        return Vec::new();
    };

    let mut issues: Vec<ValidationIssue> = check_valid(node)
        .into_iter()
        .map(|e| ValidationIssue::new(e.code, e.kind, Some(node_id), e.label, e.error))
        .collect();
    issues.extend(check_refs(registry, node));

    if missing_fail_edges(&doc).contains(&node_id) {
        issues.push(ValidationIssue::required(
            "N015",
            node_id,
            "Exception Handling",
            "Fail branch is not connected",
        ));
    }
    issues
}

/// Full scan: structural rules, every node, global variables.
pub fn validate_document(registry: &mut VariableRegistry) -> Vec<ValidationIssue> {
    let doc = registry.shared();
    let mut issues = validate_structural(&doc, registry.graph());

    for node in &doc.nodes {
        issues.extend(validate_node(registry, node.id()));
    }
    issues.extend(
        check_global_variables(doc.global_variables())
            .into_iter()
            .map(|e| ValidationIssue::new(e.code, e.kind, None, e.label, e.error)),
    );
    issues
}

/// Outcome of the pre-publish scan.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PublishVerdict {
    pub allowed: bool,
    /// Issues that refuse publishing.
    pub blocking: Vec<ValidationIssue>,
    /// Everything else found by the scan.
    pub warnings: Vec<ValidationIssue>,
}

/// Run the full scan and decide whether the document may be published.
///
/// Structural findings always block. Otherwise an issue blocks when it sits
/// on a node reachable from Start and its kind blocks publishing (any kind
/// under `strict_publish`). Global-variable findings count as reachable.
pub fn check_publish(registry: &mut VariableRegistry, config: &EditorConfig) -> PublishVerdict {
    let issues = validate_document(registry);
    let reachable = reachable_nodes(registry.document());

    let (blocking, warnings): (Vec<_>, Vec<_>) = issues.into_iter().partition(|issue| {
        if issue.is_structural() {
            return true;
        }
        let on_reachable = issue.node_id.as_deref().is_none_or(|id| reachable.contains(id));
        on_reachable && (config.strict_publish || issue.kind.blocks_publish())
    });

    let allowed = blocking.is_empty();
    info!(
        allowed,
        blocking = blocking.len(),
        warnings = warnings.len(),
        "publish check"
    );
    PublishVerdict {
        allowed,
        blocking,
        warnings,
    }
}

/// Nodes reached from Start along edges. Entering a container also enters
/// its body through the container's start boundary.
pub fn reachable_nodes(doc: &GraphDocument) -> HashSet<String> {
    let mut seen = HashSet::new();
    let mut queue: VecDeque<&str> = doc
        .nodes
        .iter()
        .filter(|n| n.node_type() == NodeType::Start)
        .map(|n| n.id())
        .collect();

    while let Some(id) = queue.pop_front() {
        if !seen.insert(id.to_string()) {
            continue;
        }
        queue.extend(doc.edges.iter().filter(|e| e.source == id).map(|e| e.target.as_str()));

        if doc.node(id).is_some_and(|n| n.is_container()) {
            queue.extend(
                doc.nodes
                    .iter()
                    .filter(|n| n.parent_id() == Some(id))
                    .filter(|n| matches!(n.node_type(), NodeType::IteratorStart | NodeType::ParallelStart))
                    .map(|n| n.id()),
            );
        }
    }
    seen
}

/// Issues of `kind` only.
pub fn of_kind(issues: &[ValidationIssue], kind: IssueKind) -> Vec<&ValidationIssue> {
    issues.iter().filter(|i| i.kind == kind).collect()
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::graph::{add_edge, add_node};
    use crate::schema::default_node;

    fn linear() -> GraphDocument {
        let mut doc = GraphDocument::default();
        for (ty, id) in [(NodeType::Start, "start"), (NodeType::Output, "out"), (NodeType::End, "end")] {
            add_node(&mut doc, default_node(ty, id), ScopeId::Root).unwrap();
        }
        add_edge(&mut doc, WorkflowEdge::new("start", "out")).unwrap();
        add_edge(&mut doc, WorkflowEdge::new("out", "end")).unwrap();
        if let Some(WorkflowNode::End(n)) = doc.node_mut("end") {
            n.data.node_param.text_template = "Hello ${start.name}".into();
        }
        doc
    }

    #[test]
    fn empty_output_content_blocks_publish() {
        let mut registry = VariableRegistry::new(Arc::new(linear()));
        let verdict = check_publish(&mut registry, &EditorConfig::default());
        assert!(!verdict.allowed);
        assert!(verdict.blocking.iter().any(|i| i.node_id.as_deref() == Some("out")));
    }

    #[test]
    fn unreachable_nodes_do_not_block() {
        let mut doc = linear();
        if let Some(WorkflowNode::Output(n)) = doc.node_mut("out") {
            n.data.node_param.output = "${start.name}".into();
        }
        add_node(&mut doc, default_node(NodeType::Output, "island"), ScopeId::Root).unwrap();

        let mut registry = VariableRegistry::new(Arc::new(doc));
        let verdict = check_publish(&mut registry, &EditorConfig::default());
        assert!(verdict.allowed, "{:?}", verdict.blocking);
        assert!(verdict.warnings.iter().any(|i| i.node_id.as_deref() == Some("island")));

        let strict = EditorConfig {
            strict_publish: true,
            ..EditorConfig::default()
        };
        assert!(check_publish(&mut registry, &strict).allowed);
    }

    #[test]
    fn container_body_is_reachable_through_its_start() {
        let mut doc = linear();
        add_node(&mut doc, default_node(NodeType::Iterator, "it"), ScopeId::Root).unwrap();
        add_node(&mut doc, default_node(NodeType::Output, "inner"), ScopeId::Container("it".into())).unwrap();
        add_edge(&mut doc, WorkflowEdge::new("start", "it")).unwrap();
        add_edge(&mut doc, WorkflowEdge::new("it-start", "inner")).unwrap();

        let reachable = reachable_nodes(&doc);
        assert!(reachable.contains("inner"));
        assert!(reachable.contains("it-start"));
        assert!(!reachable.contains("it-end"));
    }

    #[test]
    fn stale_reference_reported_on_node() {
        let mut doc = linear();
        if let Some(WorkflowNode::Output(n)) = doc.node_mut("out") {
            n.data.node_param.output = "${ghost.text}".into();
        }
        let mut registry = VariableRegistry::new(Arc::new(doc));
        let issues = validate_node(&mut registry, "out");
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].code, "R001");
        assert_eq!(issues[0].kind, IssueKind::TargetRemoved);
    }
}
