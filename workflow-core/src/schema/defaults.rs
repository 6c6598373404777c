//! Default node construction and outputs derived from node parameters.

use crate::document::*;
use crate::value::ValueType;

fn decl(key: &str, ty: ValueType, desc: &str) -> VariableDecl {
    let mut d = VariableDecl::new(key, ty);
    d.desc = Some(desc.to_string());
    d
}

fn chunk_list() -> VariableDecl {
    decl("chunk_list", ValueType::array_of(ValueType::Object), "Recalled chunks").with_properties(vec![
        VariableDecl::new("doc_id", ValueType::String),
        VariableDecl::new("doc_name", ValueType::String),
        VariableDecl::new("title", ValueType::String),
        VariableDecl::new("text", ValueType::String),
        VariableDecl::new("score", ValueType::Number),
        VariableDecl::new("page_number", ValueType::Number),
        VariableDecl::new("chunk_id", ValueType::String),
    ])
}

fn base<P: Default>(id: &str, node_type: NodeType) -> NodeBase<P> {
    NodeBase::new(id, super::schema(node_type).title)
}

/// A fresh node of `node_type` carrying the catalogue defaults.
pub fn default_node(node_type: NodeType, id: &str) -> WorkflowNode {
    let empty_refer = |key: &str, ty: ValueType| VariableRef::refer(key, None, ty);
    match node_type {
        NodeType::Start => {
            let mut n: NodeBase<EmptyParam> = base(id, node_type);
            n.data.output_params = vec![
                decl("name", ValueType::String, "Name"),
                decl("age", ValueType::Number, "Age"),
            ];
            WorkflowNode::Start(n)
        }
        NodeType::End => {
            let mut n: NodeBase<EndParam> = base(id, node_type);
            n.data.node_param.json_params = vec![empty_refer("output", ValueType::String)];
            WorkflowNode::End(n)
        }
        NodeType::Input => {
            let mut n: NodeBase<EmptyParam> = base(id, node_type);
            n.data.output_params = vec![decl("input", ValueType::String, "User input")];
            WorkflowNode::Input(n)
        }
        NodeType::Output => WorkflowNode::Output(base(id, node_type)),
        NodeType::Llm => {
            let mut n: NodeBase<LlmParam> = base(id, node_type);
            n.data.output_params = vec![decl("output", ValueType::String, "Text Output")];
            WorkflowNode::Llm(n)
        }
        NodeType::Script => {
            let mut n: NodeBase<ScriptParam> = base(id, node_type);
            n.data.input_params = vec![empty_refer("input1", ValueType::String)];
            n.data.output_params = vec![decl("output", ValueType::String, "Script result")];
            WorkflowNode::Script(n)
        }
        NodeType::Judge => {
            let mut n: NodeBase<JudgeParam> = base(id, node_type);
            n.data.node_param.branches = vec![Branch {
                id: "default".into(),
                label: "Default Condition".into(),
                condition: None,
            }];
            WorkflowNode::Judge(n)
        }
        NodeType::Iterator => {
            let mut n: NodeBase<IteratorParam> = base(id, node_type);
            n.data.input_params = vec![empty_refer("item", ValueType::array_of(ValueType::String))];
            WorkflowNode::Iterator(n)
        }
        NodeType::Parallel => {
            let mut n: NodeBase<ParallelParam> = base(id, node_type);
            n.data.input_params = vec![empty_refer("item", ValueType::array_of(ValueType::String))];
            WorkflowNode::Parallel(n)
        }
        NodeType::IteratorStart => WorkflowNode::IteratorStart(base(id, node_type)),
        NodeType::IteratorEnd => WorkflowNode::IteratorEnd(base(id, node_type)),
        NodeType::ParallelStart => WorkflowNode::ParallelStart(base(id, node_type)),
        NodeType::ParallelEnd => WorkflowNode::ParallelEnd(base(id, node_type)),
        NodeType::Retrieval => {
            let mut n: NodeBase<RetrievalParam> = base(id, node_type);
            n.data.input_params = vec![empty_refer("input", ValueType::String)];
            n.data.output_params = vec![chunk_list()];
            WorkflowNode::Retrieval(n)
        }
        NodeType::VariableHandle => {
            let mut n: NodeBase<VariableHandleParam> = base(id, node_type);
            n.data.node_param.groups = vec![VariableGroup {
                group_id: "group_1".into(),
                group_name: "Group1".into(),
                output_type: ValueType::String,
                group_strategy: GroupStrategy::FirstNotNull,
                variables: vec![empty_refer("", ValueType::String)],
            }];
            let mut node = WorkflowNode::VariableHandle(n);
            if let Some(outputs) = derived_outputs(&node) {
                *node.output_params_mut() = outputs;
            }
            node
        }
        NodeType::ParameterExtractor => {
            let mut n: NodeBase<ParameterExtractorParam> = base(id, node_type);
            n.data.input_params = vec![empty_refer("input", ValueType::String)];
            n.data.node_param.extract_params = vec![
                ExtractParam {
                    key: "city".into(),
                    value_type: ValueType::String,
                    desc: "City".into(),
                    required: true,
                },
                ExtractParam {
                    key: "date".into(),
                    value_type: ValueType::String,
                    desc: "Date".into(),
                    required: true,
                },
            ];
            let mut node = WorkflowNode::ParameterExtractor(n);
            if let Some(outputs) = derived_outputs(&node) {
                *node.output_params_mut() = outputs;
            }
            node
        }
    }
}

/// Outputs that follow from a node's parameters rather than being edited
/// directly. `None` for node types whose outputs are user-declared.
pub fn derived_outputs(node: &WorkflowNode) -> Option<Vec<VariableDecl>> {
    match node {
        WorkflowNode::VariableHandle(n) => {
            let p = &n.data.node_param;
            Some(match p.mode {
                VariableHandleMode::Group => p
                    .groups
                    .iter()
                    .map(|g| VariableDecl::new(g.group_name.clone(), g.output_type.clone()))
                    .collect(),
                VariableHandleMode::Json => p
                    .json_params
                    .iter()
                    .map(|r| VariableDecl::new(r.key.clone(), r.value_type.clone()))
                    .collect(),
                VariableHandleMode::Template => vec![VariableDecl::new("output", ValueType::String)],
            })
        }
        WorkflowNode::ParameterExtractor(n) => {
            let mut outputs: Vec<VariableDecl> = n
                .data
                .node_param
                .extract_params
                .iter()
                .map(|p| {
                    let mut d = VariableDecl::new(p.key.clone(), p.value_type.clone());
                    if !p.desc.is_empty() {
                        d.desc = Some(p.desc.clone());
                    }
                    d
                })
                .collect();
            outputs.push(decl("_is_completed", ValueType::Boolean, "Whether parsing is complete"));
            outputs.push(decl("_reason", ValueType::String, "Reason for unsuccessful parsing"));
            Some(outputs)
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn judge_starts_with_default_branch_only() {
        let node = default_node(NodeType::Judge, "j");
        let branches = node.branches().unwrap();
        assert_eq!(branches.len(), 1);
        assert!(branches[0].is_default());
        assert_eq!(branches[0].id, "default");
    }

    #[test]
    fn retrieval_declares_chunk_list() {
        let node = default_node(NodeType::Retrieval, "r");
        let out = &node.output_params()[0];
        assert_eq!(out.key, "chunk_list");
        assert_eq!(out.value_type.to_string(), "Array<Object>");
        let keys: Vec<_> = out.properties.iter().map(|p| p.key.as_str()).collect();
        assert_eq!(keys, ["doc_id", "doc_name", "title", "text", "score", "page_number", "chunk_id"]);
        match node {
            WorkflowNode::Retrieval(n) => {
                assert_eq!(n.data.node_param.top_k, 10);
                assert_eq!(n.data.node_param.similarity_threshold, 0.8);
            }
            _ => unreachable!(),
        }
    }

    #[test]
    fn extractor_outputs_follow_extract_params() {
        let mut node = default_node(NodeType::ParameterExtractor, "pe");
        if let WorkflowNode::ParameterExtractor(n) = &mut node {
            n.data.node_param.extract_params.truncate(1);
        }
        let keys: Vec<_> = derived_outputs(&node)
            .unwrap()
            .into_iter()
            .map(|d| d.key)
            .collect();
        assert_eq!(keys, ["city", "_is_completed", "_reason"]);
    }

    #[test]
    fn variable_handle_template_mode_has_single_output() {
        let mut node = default_node(NodeType::VariableHandle, "vh");
        assert_eq!(node.output_params()[0].key, "Group1");
        if let WorkflowNode::VariableHandle(n) = &mut node {
            n.data.node_param.mode = VariableHandleMode::Template;
        }
        let outputs = derived_outputs(&node).unwrap();
        assert_eq!(outputs.len(), 1);
        assert_eq!(outputs[0].key, "output");
    }
}
