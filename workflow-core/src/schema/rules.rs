//! `check_valid` rules run before publish, one set per node type.
//!
//! Rules look only at the node's own data. Reference resolution against the
//! rest of the graph lives in `validate::references`.

use std::collections::HashSet;

use serde::Serialize;

use crate::document::*;
use crate::branch::default_count;
use crate::error::IssueKind;
use crate::schema::bounds::out_of_range;

/// One finding of a node rule, displayed next to `label`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub code: &'static str,
    pub kind: IssueKind,
    pub label: String,
    pub error: String,
}

impl FieldError {
    fn required(code: &'static str, label: &str, error: &str) -> Self {
        FieldError {
            code,
            kind: IssueKind::RequiredFieldEmpty,
            label: label.to_string(),
            error: error.to_string(),
        }
    }

    fn invalid(code: &'static str, label: &str, error: impl Into<String>) -> Self {
        FieldError {
            code,
            kind: IssueKind::InvalidValue,
            label: label.to_string(),
            error: error.into(),
        }
    }
}

const CANNOT_BE_EMPTY: &str = "Cannot be empty";

/// Run every rule registered for the node's type.
pub fn check_valid(node: &WorkflowNode) -> Vec<FieldError> {
    let mut errors = Vec::new();
    match node {
        WorkflowNode::Start(n) => {
            check_params(
                &decl_items(&n.data.output_params),
                &mut errors,
                ParamCheck::new("Input").allow_empty_list(),
            );
        }
        WorkflowNode::Input(n) => {
            check_params(&decl_items(&n.data.output_params), &mut errors, ParamCheck::new("Input"));
        }
        WorkflowNode::End(n) => check_end(&n.data.node_param, &mut errors),
        WorkflowNode::Output(n) => {
            if n.data.node_param.output.trim().is_empty() {
                errors.push(FieldError::required("N001", "Output Content", CANNOT_BE_EMPTY));
            }
        }
        WorkflowNode::Llm(n) => {
            let p = &n.data.node_param;
            check_model(&p.model_config, &mut errors);
            if p.sys_prompt_content.trim().is_empty() {
                errors.push(FieldError::required("N001", "Prompt", CANNOT_BE_EMPTY));
            }
            if p.prompt_content.trim().is_empty() {
                errors.push(FieldError::required("N001", "User Prompt", CANNOT_BE_EMPTY));
            }
            check_try_catch(&p.try_catch_config, &mut errors);
            check_short_memory(&p.short_memory, &mut errors);
        }
        WorkflowNode::Script(n) => {
            let p = &n.data.node_param;
            check_params(
                &ref_items(&n.data.input_params),
                &mut errors,
                ParamCheck::new("Input").allow_empty_list(),
            );
            if p.script_content.trim().is_empty() {
                errors.push(FieldError::required("N001", "Script", CANNOT_BE_EMPTY));
            }
            check_try_catch(&p.try_catch_config, &mut errors);
        }
        WorkflowNode::Judge(n) => {
            let branches = &n.data.node_param.branches;
            let defaults = default_count(branches);
            if defaults != 1 {
                errors.push(FieldError::invalid(
                    "N017",
                    "Condition",
                    format!("Exactly one default branch is required, found {}", defaults),
                ));
            }
            check_branches(branches, "Condition", &mut errors);
        }
        WorkflowNode::Iterator(n) => {
            let p = &n.data.node_param;
            if p.iterator_type == IteratorType::ByArray {
                check_params(&ref_items(&n.data.input_params), &mut errors, ParamCheck::new("Iteration Array"));
            }
            check_params(
                &ref_items(&p.variable_parameters),
                &mut errors,
                ParamCheck::new("Intermediate Variable").allow_empty_list(),
            );
            check_params(
                &decl_items(&n.data.output_params),
                &mut errors,
                ParamCheck::new("Output").allow_empty_list().with_value(),
            );
            check_branches(&p.terminations, "Termination Condition", &mut errors);
        }
        WorkflowNode::Parallel(n) => {
            check_params(&ref_items(&n.data.input_params), &mut errors, ParamCheck::new("Batch Array"));
            check_params(
                &decl_items(&n.data.output_params),
                &mut errors,
                ParamCheck::new("Output").with_value(),
            );
        }
        WorkflowNode::Retrieval(n) => {
            let p = &n.data.node_param;
            if n.data.input_params.first().is_none_or(|r| r.is_empty()) {
                errors.push(FieldError::required("N001", "Input", CANNOT_BE_EMPTY));
            }
            if p.knowledge_base_ids.is_empty() {
                errors.push(FieldError::required("N013", "Knowledge Base", "Select at least one knowledge base"));
            }
            check_try_catch(&p.try_catch_config, &mut errors);
        }
        WorkflowNode::VariableHandle(n) => check_variable_handle(&n.data.node_param, &mut errors),
        WorkflowNode::ParameterExtractor(n) => {
            let p = &n.data.node_param;
            check_model(&p.model_config, &mut errors);
            if n.data.input_params.first().is_none_or(|r| r.is_empty()) {
                errors.push(FieldError::required("N001", "Input", CANNOT_BE_EMPTY));
            }
            let items: Vec<ParamItem> = p
                .extract_params
                .iter()
                .map(|e| ParamItem { key: &e.key, value: None })
                .collect();
            check_params(&items, &mut errors, ParamCheck::new("Extract Parameters"));
            check_try_catch(&p.try_catch_config, &mut errors);
            check_short_memory(&p.short_memory, &mut errors);
        }
        WorkflowNode::IteratorStart(_)
        | WorkflowNode::IteratorEnd(_)
        | WorkflowNode::ParallelStart(_)
        | WorkflowNode::ParallelEnd(_) => {}
    }
    for (bound, value) in out_of_range(node) {
        errors.push(FieldError::invalid(
            "N016",
            bound.field,
            format!("{} is outside [{}, {}]", value, bound.min, bound.max),
        ));
    }
    errors
}

/// Global variable declarations: JS-style identifiers, unique keys.
pub fn check_global_variables(vars: &[GlobalVariable]) -> Vec<FieldError> {
    let mut errors = Vec::new();
    let mut seen = HashSet::new();
    for var in vars {
        if !is_identifier(&var.key) {
            errors.push(FieldError::invalid(
                "N014",
                "Global Variable",
                format!("'{}' must start with a letter, '_' or '$' and contain only letters, digits, '_' or '$'", var.key),
            ));
        } else if !seen.insert(var.key.as_str()) {
            errors.push(FieldError::invalid(
                "N005",
                "Global Variable",
                format!("Variable name '{}' cannot be duplicated", var.key),
            ));
        }
    }
    errors
}

fn is_identifier(key: &str) -> bool {
    let mut chars = key.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' || c == '$' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$')
}

// =============================================================================
// PARAM LIST CHECKS
// =============================================================================

struct ParamItem<'a> {
    key: &'a str,
    value: Option<&'a str>,
}

fn decl_items(decls: &[VariableDecl]) -> Vec<ParamItem<'_>> {
    decls
        .iter()
        .map(|d| ParamItem {
            key: &d.key,
            value: d.value.as_deref(),
        })
        .collect()
}

fn ref_items(refs: &[VariableRef]) -> Vec<ParamItem<'_>> {
    refs.iter()
        .map(|r| ParamItem {
            key: &r.key,
            value: r.value.as_deref(),
        })
        .collect()
}

#[derive(Clone, Copy)]
struct ParamCheck<'a> {
    label: &'a str,
    check_value: bool,
    allow_empty_list: bool,
}

impl<'a> ParamCheck<'a> {
    fn new(label: &'a str) -> Self {
        ParamCheck {
            label,
            check_value: false,
            allow_empty_list: false,
        }
    }

    fn with_value(mut self) -> Self {
        self.check_value = true;
        self
    }

    fn allow_empty_list(mut self) -> Self {
        self.allow_empty_list = true;
        self
    }
}

/// Key/value list rules. Each kind of problem is reported once per list.
fn check_params(items: &[ParamItem], errors: &mut Vec<FieldError>, opts: ParamCheck) {
    if items.is_empty() && !opts.allow_empty_list {
        errors.push(FieldError::required("N002", opts.label, CANNOT_BE_EMPTY));
    }

    let mut keys = HashSet::new();
    let (mut empty_key, mut invalid_key, mut duplicate_key, mut empty_value) = (false, false, false, false);
    for item in items {
        if item.key.is_empty() {
            empty_key = true;
            continue;
        }
        if opts.check_value && item.value.is_none_or(|v| v.trim().is_empty()) {
            empty_value = true;
            continue;
        }
        if !item.key.chars().all(|c| c.is_ascii_alphanumeric()) {
            invalid_key = true;
            continue;
        }
        if !keys.insert(item.key) {
            duplicate_key = true;
        }
    }

    if duplicate_key {
        errors.push(FieldError::invalid("N005", opts.label, "Variable name cannot be duplicated"));
    }
    if empty_value {
        errors.push(FieldError::required("N006", opts.label, "Value cannot be empty"));
    }
    if empty_key {
        errors.push(FieldError::required("N003", opts.label, "Variable name cannot be empty"));
    }
    if invalid_key {
        errors.push(FieldError::invalid(
            "N004",
            opts.label,
            "Variable name can only contain letters and numbers",
        ));
    }
}

// =============================================================================
// SHARED BLOCK CHECKS
// =============================================================================

fn check_model(model: &ModelConfig, errors: &mut Vec<FieldError>) {
    if model.model_id.trim().is_empty() {
        errors.push(FieldError::required("N007", "Model Selection", CANNOT_BE_EMPTY));
    }
}

fn check_try_catch(config: &TryCatchConfig, errors: &mut Vec<FieldError>) {
    if config.strategy != ErrorStrategy::DefaultValue {
        return;
    }
    let missing = match &config.default_values {
        None => true,
        Some(values) => values
            .iter()
            .any(|v| v.value.as_deref().is_none_or(|s| s.trim().is_empty())),
    };
    if missing {
        errors.push(FieldError::required("N008", "Exception Handling", "Default value cannot be empty"));
    }
}

fn check_short_memory(memory: &ShortMemoryConfig, errors: &mut Vec<FieldError>) {
    if !memory.enabled || memory.source == MemorySource::Own {
        return;
    }
    if memory.param.is_empty() {
        errors.push(FieldError::required("N009", "Memory", "Context variable cannot be empty"));
    }
}

fn check_end(p: &EndParam, errors: &mut Vec<FieldError>) {
    match p.output_type {
        EndOutputType::Json => check_params(&ref_items(&p.json_params), errors, ParamCheck::new("Output")),
        EndOutputType::Text => {
            if p.text_template.trim().is_empty() {
                errors.push(FieldError::required("N001", "Text Template", CANNOT_BE_EMPTY));
            }
        }
    }
}

fn check_branches(branches: &[Branch], label: &str, errors: &mut Vec<FieldError>) {
    for branch in branches {
        let Some(tree) = &branch.condition else { continue };
        if tree.conditions.is_empty() {
            errors.push(FieldError::required(
                "N010",
                label,
                &format!("Branch '{}' needs at least one condition", branch.label),
            ));
            continue;
        }
        check_predicates(tree, &branch.label, label, errors);
    }
}

fn check_predicates(tree: &PredicateTree, branch: &str, label: &str, errors: &mut Vec<FieldError>) {
    for predicate in &tree.conditions {
        match predicate {
            Predicate::Group(inner) => check_predicates(inner, branch, label, errors),
            Predicate::Compare(cond) => {
                if cond.left.is_empty() {
                    errors.push(FieldError::required(
                        "N012",
                        label,
                        &format!("Branch '{}' has a condition without a variable", branch),
                    ));
                    continue;
                }
                if !cond.operator.applies_to(&cond.left.value_type) {
                    errors.push(FieldError::invalid(
                        "N011",
                        label,
                        format!(
                            "Operator '{}' does not apply to {}",
                            cond.operator, cond.left.value_type
                        ),
                    ));
                }
                let needs_right = !cond.operator.is_unary();
                if needs_right && cond.right.as_ref().is_none_or(|r| r.is_empty()) {
                    errors.push(FieldError::required(
                        "N012",
                        label,
                        &format!("Branch '{}' has a condition without a comparison value", branch),
                    ));
                }
            }
        }
    }
}

fn check_variable_handle(p: &VariableHandleParam, errors: &mut Vec<FieldError>) {
    match p.mode {
        VariableHandleMode::Group => {
            if p.groups.is_empty() {
                errors.push(FieldError::required("N002", "Variable Groups", CANNOT_BE_EMPTY));
            }
            let mut names = HashSet::new();
            for group in &p.groups {
                if group.group_name.trim().is_empty() {
                    errors.push(FieldError::required("N003", "Variable Groups", "Group name cannot be empty"));
                } else if !names.insert(group.group_name.as_str()) {
                    errors.push(FieldError::invalid(
                        "N005",
                        "Variable Groups",
                        format!("Group name '{}' cannot be duplicated", group.group_name),
                    ));
                }
                if group.variables.is_empty() || group.variables.iter().any(VariableRef::is_empty) {
                    errors.push(FieldError::required(
                        "N006",
                        "Variable Groups",
                        &format!("Group '{}' has an empty variable", group.group_name),
                    ));
                }
            }
        }
        VariableHandleMode::Template => {
            if p.template_content.trim().is_empty() {
                errors.push(FieldError::required("N001", "Template", CANNOT_BE_EMPTY));
            }
        }
        VariableHandleMode::Json => {
            check_params(&ref_items(&p.json_params), errors, ParamCheck::new("Output").with_value())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::default_node;
    use crate::value::{Operator, ValueType};

    fn codes(errors: &[FieldError]) -> Vec<&'static str> {
        errors.iter().map(|e| e.code).collect()
    }

    #[test]
    fn output_requires_content() {
        let node = default_node(NodeType::Output, "out");
        let errors = check_valid(&node);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].kind, IssueKind::RequiredFieldEmpty);
        assert_eq!(errors[0].label, "Output Content");
    }

    #[test]
    fn start_param_list_problems_reported_once_each() {
        let mut node = default_node(NodeType::Start, "start");
        node.output_params_mut().extend([
            VariableDecl::new("name", ValueType::String),
            VariableDecl::new("bad-key", ValueType::String),
            VariableDecl::new("", ValueType::String),
            VariableDecl::new("", ValueType::Number),
        ]);
        assert_eq!(codes(&check_valid(&node)), ["N005", "N003", "N004"]);
    }

    #[test]
    fn default_start_is_valid() {
        assert!(check_valid(&default_node(NodeType::Start, "start")).is_empty());
    }

    #[test]
    fn start_without_inputs_is_valid() {
        let mut node = default_node(NodeType::Start, "start");
        node.output_params_mut().clear();
        assert!(check_valid(&node).is_empty());
    }

    #[test]
    fn loaded_out_of_range_values_are_reported() {
        let mut node = default_node(NodeType::Parallel, "par");
        if let WorkflowNode::Parallel(n) = &mut node {
            n.data.input_params[0].value = Some("${start.items}".into());
            n.data.output_params =
                vec![VariableDecl::new("results", ValueType::array_of(ValueType::String)).bound_to("${inner.output}")];
            n.data.node_param.batch_size = 999;
        }
        let errors = check_valid(&node);
        assert_eq!(codes(&errors), ["N016"]);
        assert_eq!(errors[0].kind, IssueKind::InvalidValue);
        assert_eq!(errors[0].label, "batch_size");
        assert_eq!(errors[0].error, "999 is outside [1, 200]");
    }

    #[test]
    fn judge_needs_exactly_one_default_branch() {
        let mut node = default_node(NodeType::Judge, "j");
        assert!(check_valid(&node).is_empty());

        node.branches_mut().unwrap().clear();
        assert_eq!(codes(&check_valid(&node)), ["N017"]);

        let default = Branch {
            id: "default".into(),
            label: "Default".into(),
            condition: None,
        };
        node.branches_mut().unwrap().extend([default.clone(), default]);
        assert_eq!(codes(&check_valid(&node)), ["N017"]);
    }

    #[test]
    fn llm_reports_model_and_prompts() {
        let node = default_node(NodeType::Llm, "llm");
        assert_eq!(codes(&check_valid(&node)), ["N007", "N001", "N001"]);
    }

    #[test]
    fn default_value_strategy_needs_values() {
        let mut node = default_node(NodeType::Script, "s");
        if let WorkflowNode::Script(n) = &mut node {
            n.data.node_param.script_content = "def main(): pass".into();
            n.data.input_params[0].value = Some("${start.name}".into());
        }
        let tc = node.try_catch_mut().unwrap();
        tc.strategy = ErrorStrategy::DefaultValue;
        tc.default_values = Some(vec![DefaultValue {
            key: "output".into(),
            value_type: ValueType::String,
            value: None,
        }]);
        assert_eq!(codes(&check_valid(&node)), ["N008"]);
    }

    #[test]
    fn judge_condition_checks() {
        let mut node = default_node(NodeType::Judge, "j");
        node.branches_mut().unwrap().insert(
            0,
            Branch {
                id: "branch_1".into(),
                label: "Is adult".into(),
                condition: Some(PredicateTree {
                    logic: Logic::And,
                    conditions: vec![Predicate::Compare(Condition {
                        left: VariableRef::refer("", Some("${start.name}".into()), ValueType::String),
                        operator: Operator::Greater,
                        right: None,
                    })],
                }),
            },
        );
        assert_eq!(codes(&check_valid(&node)), ["N011", "N012"]);
    }

    #[test]
    fn global_variable_keys() {
        let var = |key: &str| GlobalVariable {
            key: key.into(),
            value_type: ValueType::String,
            desc: String::new(),
            default_value: None,
        };
        let errors = check_global_variables(&[var("user_name"), var("$ok"), var("1st"), var("user_name")]);
        assert_eq!(codes(&errors), ["N014", "N005"]);
    }
}
