#![allow(dead_code)]

use std::sync::Arc;

use workflow_core::document::*;
use workflow_core::error::ValidationIssue;
use workflow_core::schema::default_node;
use workflow_core::variable::VariableRegistry;
use workflow_core::{Editor, EditorConfig};

// =============================================================================
// Fixtures
// =============================================================================

pub const ITERATOR_PIPELINE: &str = include_str!("../fixtures/iterator_pipeline.json");
pub const JUDGE_FLOW: &str = include_str!("../fixtures/judge_flow.json");
pub const BROKEN_STRUCTURE: &str = include_str!("../fixtures/broken_structure.json");

pub fn load(json: &str) -> GraphDocument {
    workflow_core::document::parse(json).expect("fixture should parse")
}

pub fn editor(json: &str) -> Editor {
    Editor::new(load(json), EditorConfig::default())
}

pub fn registry(doc: GraphDocument) -> VariableRegistry {
    VariableRegistry::new(Arc::new(doc))
}

// =============================================================================
// Document builders
// =============================================================================

/// `start -> <ids...> -> end`, all at the root, each middle node an Output
/// with non-empty content.
pub fn chain(ids: &[&str]) -> GraphDocument {
    let mut doc = GraphDocument::default();
    let mut previous = "start".to_string();
    push(&mut doc, default_node(NodeType::Start, "start"));
    for id in ids {
        let mut node = default_node(NodeType::Output, id);
        if let WorkflowNode::Output(n) = &mut node {
            n.data.node_param.output = format!("from {}", id);
        }
        push(&mut doc, node);
        doc.edges.push(WorkflowEdge::new(previous.as_str(), *id));
        previous = id.to_string();
    }
    let mut end = default_node(NodeType::End, "end");
    if let WorkflowNode::End(n) = &mut end {
        n.data.node_param.text_template = "done".into();
    }
    push(&mut doc, end);
    doc.edges.push(WorkflowEdge::new(previous.as_str(), "end"));
    doc
}

pub fn push(doc: &mut GraphDocument, node: WorkflowNode) {
    doc.nodes.push(node);
}

/// Script node declaring one output `key: ty` and reading `input` from
/// `path`.
pub fn script(id: &str, key: &str, ty: workflow_core::value::ValueType, path: Option<&str>) -> WorkflowNode {
    let mut node = default_node(NodeType::Script, id);
    if let WorkflowNode::Script(n) = &mut node {
        n.data.node_param.script_content = "def main(): pass".into();
        n.data.output_params = vec![VariableDecl::new(key, ty)];
        n.data.input_params = vec![VariableRef::refer(
            "input1",
            path.map(String::from),
            workflow_core::value::ValueType::String,
        )];
    }
    node
}

// =============================================================================
// Assertions
// =============================================================================

pub fn codes(issues: &[ValidationIssue]) -> Vec<&str> {
    issues.iter().map(|i| i.code.as_str()).collect()
}

pub fn has_code(issues: &[ValidationIssue], code: &str) -> bool {
    issues.iter().any(|i| i.code == code)
}
