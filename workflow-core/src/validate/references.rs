//! Reference collection per node type and resolution against the registry
//! (R001 TargetRemoved, R002 TypeMismatch, R003 OutOfScope).

use std::collections::BTreeSet;

use crate::document::*;
use crate::error::ValidationIssue;
use crate::value::ValueType;
use crate::variable::{template_refs, RefStatus, StaleReason, VarPath, VariableRegistry, View};

/// One place in a node where a variable is consumed.
#[derive(Debug, Clone, PartialEq)]
pub struct RefSite {
    /// Field the reference is displayed under.
    pub label: String,
    pub path: String,
    /// `None` for text template placeholders.
    pub expected: Option<ValueType>,
    pub view: View,
}

struct Collector<'a> {
    node_id: &'a str,
    sites: Vec<RefSite>,
}

impl<'a> Collector<'a> {
    fn refer(&mut self, label: &str, r: &VariableRef, expected: Option<ValueType>, inner: bool) {
        if !r.is_refer() || r.is_empty() {
            return;
        }
        if let Some(path) = r.value.as_deref() {
            self.push(label, path.trim().to_string(), expected, inner);
        }
    }

    fn refs(&mut self, label: &str, refs: &[VariableRef]) {
        for r in refs {
            self.refer(label, r, Some(r.value_type.clone()), false);
        }
    }

    fn text(&mut self, label: &str, text: &str) {
        for path in template_refs(text) {
            self.push(label, path.to_string(), None, false);
        }
    }

    fn branches(&mut self, label: &str, branches: &[Branch], inner: bool) {
        for branch in branches {
            if let Some(tree) = &branch.condition {
                self.tree(label, tree, inner);
            }
        }
    }

    fn tree(&mut self, label: &str, tree: &PredicateTree, inner: bool) {
        for predicate in &tree.conditions {
            match predicate {
                Predicate::Group(g) => self.tree(label, g, inner),
                Predicate::Compare(c) => {
                    self.refer(label, &c.left, Some(c.left.value_type.clone()), inner);
                    if let Some(right) = &c.right {
                        let expected = c.operator.right_operand_type(&c.left.value_type);
                        self.refer(label, right, expected, inner);
                    }
                }
            }
        }
    }

    fn memory(&mut self, memory: &ShortMemoryConfig) {
        if memory.enabled && memory.source == MemorySource::Custom {
            self.refer("Memory", &memory.param, Some(memory.param.value_type.clone()), false);
        }
    }

    fn vision(&mut self, model: &ModelConfig) {
        if model.vision_config.enable {
            self.refs("Vision", &model.vision_config.params);
        }
    }

    /// Container outputs collect one value per round into an array.
    fn container_outputs(&mut self, outputs: &[VariableDecl]) {
        for decl in outputs {
            let Some(path) = decl.value.as_deref().filter(|v| !v.trim().is_empty()) else {
                continue;
            };
            let expected = decl.value_type.element().cloned().unwrap_or_else(|| decl.value_type.clone());
            self.push("Output", path.trim().to_string(), Some(expected), true);
        }
    }

    fn push(&mut self, label: &str, path: String, expected: Option<ValueType>, inner: bool) {
        let view = if inner {
            View::Inner(self.node_id.to_string())
        } else {
            View::Node(self.node_id.to_string())
        };
        self.sites.push(RefSite {
            label: label.to_string(),
            path,
            expected,
            view,
        });
    }
}

/// Every variable `node` consumes.
pub fn collect_refs(node: &WorkflowNode) -> Vec<RefSite> {
    let mut c = Collector {
        node_id: node.id(),
        sites: Vec::new(),
    };
    match node {
        WorkflowNode::Start(_)
        | WorkflowNode::Input(_)
        | WorkflowNode::IteratorStart(_)
        | WorkflowNode::IteratorEnd(_)
        | WorkflowNode::ParallelStart(_)
        | WorkflowNode::ParallelEnd(_) => {}
        WorkflowNode::End(n) => match n.data.node_param.output_type {
            EndOutputType::Text => c.text("Text Template", &n.data.node_param.text_template),
            EndOutputType::Json => c.refs("Output", &n.data.node_param.json_params),
        },
        WorkflowNode::Output(n) => c.text("Output Content", &n.data.node_param.output),
        WorkflowNode::Llm(n) => {
            let p = &n.data.node_param;
            c.refs("Input", &n.data.input_params);
            c.text("Prompt", &p.sys_prompt_content);
            c.text("User Prompt", &p.prompt_content);
            c.vision(&p.model_config);
            c.memory(&p.short_memory);
        }
        WorkflowNode::Script(n) => c.refs("Input", &n.data.input_params),
        WorkflowNode::Judge(n) => c.branches("Condition", &n.data.node_param.branches, false),
        WorkflowNode::Iterator(n) => {
            let p = &n.data.node_param;
            if p.iterator_type == IteratorType::ByArray {
                c.refs("Iteration Array", &n.data.input_params);
            }
            for var in &p.variable_parameters {
                c.refer("Intermediate Variable", var, Some(var.value_type.clone()), true);
            }
            c.branches("Termination Condition", &p.terminations, true);
            c.container_outputs(&n.data.output_params);
        }
        WorkflowNode::Parallel(n) => {
            c.refs("Batch Array", &n.data.input_params);
            c.container_outputs(&n.data.output_params);
        }
        WorkflowNode::Retrieval(n) => c.refs("Input", &n.data.input_params),
        WorkflowNode::VariableHandle(n) => {
            let p = &n.data.node_param;
            match p.mode {
                VariableHandleMode::Group => {
                    for group in &p.groups {
                        for var in &group.variables {
                            c.refer("Variable Groups", var, Some(group.output_type.clone()), false);
                        }
                    }
                }
                VariableHandleMode::Template => c.text("Template", &p.template_content),
                VariableHandleMode::Json => c.refs("Output", &p.json_params),
            }
        }
        WorkflowNode::ParameterExtractor(n) => {
            let p = &n.data.node_param;
            c.refs("Input", &n.data.input_params);
            c.text("Instruction", &p.instruction);
            c.vision(&p.model_config);
            c.memory(&p.short_memory);
        }
    }
    c.sites
}

/// Owner ids of every variable `node` consumes, excluding `global`/`sys`.
pub fn referenced_nodes(node: &WorkflowNode) -> BTreeSet<String> {
    collect_refs(node)
        .into_iter()
        .filter_map(|site| VarPath::parse(&site.path))
        .filter(|p| !p.is_global() && !p.is_sys())
        .map(|p| p.node_id)
        .collect()
}

/// Resolve every reference of `node`; one issue per stale reference.
pub fn check_refs(registry: &mut VariableRegistry, node: &WorkflowNode) -> Vec<ValidationIssue> {
    let mut issues = Vec::new();
    for site in collect_refs(node) {
        let RefStatus::Stale(reason) = registry.revalidate_path(&site.view, &site.path, site.expected.as_ref()) else {
            continue;
        };
        let (code, message) = match reason {
            StaleReason::TargetRemoved => ("R001", format!("'{}' refers to a variable that no longer exists", site.path)),
            StaleReason::TypeMismatch => (
                "R002",
                format!(
                    "'{}' no longer has type {}",
                    site.path,
                    site.expected.as_ref().map(ToString::to_string).unwrap_or_default()
                ),
            ),
            StaleReason::OutOfScope => ("R003", format!("'{}' is not visible from this node", site.path)),
        };
        issues.push(ValidationIssue::new(code, reason.issue_kind(), Some(node.id()), site.label, message));
    }
    issues
}
