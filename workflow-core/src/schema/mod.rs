//! Per-node-type registry: palette flags, default parameters, derived
//! outputs and `check_valid` rules.
//!
//! The table is an exhaustive match over `NodeType`, so a new node type does
//! not compile until it has an entry here.

pub mod bounds;
pub mod defaults;
pub mod rules;

pub use bounds::{apply_bounds, out_of_range, Bound};
pub use defaults::{default_node, derived_outputs};
pub use rules::{check_valid, FieldError};

use serde::Serialize;

use crate::document::NodeType;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct NodeSchema {
    pub node_type: NodeType,
    pub title: &'static str,
    /// Palette group.
    pub group: &'static str,
    pub is_system: bool,
    pub hide_in_menu: bool,
    pub allow_single_test: bool,
    pub deletable: bool,
    /// Owns a nested sub-graph.
    pub is_group: bool,
    /// No outgoing edges allowed.
    pub disable_connect_source: bool,
    /// No incoming edges allowed.
    pub disable_connect_target: bool,
    pub has_error_policy: bool,
    pub has_retry: bool,
}

impl NodeSchema {
    const fn base(node_type: NodeType, title: &'static str, group: &'static str) -> Self {
        NodeSchema {
            node_type,
            title,
            group,
            is_system: false,
            hide_in_menu: false,
            allow_single_test: false,
            deletable: true,
            is_group: false,
            disable_connect_source: false,
            disable_connect_target: false,
            has_error_policy: false,
            has_retry: false,
        }
    }

    /// Start/End style node: created by the system, never deleted.
    const fn system(mut self) -> Self {
        self.is_system = true;
        self.hide_in_menu = true;
        self.deletable = false;
        self
    }

    const fn testable(mut self) -> Self {
        self.allow_single_test = true;
        self
    }

    const fn guarded(mut self) -> Self {
        self.has_error_policy = true;
        self.has_retry = true;
        self
    }

    const fn no_source(mut self) -> Self {
        self.disable_connect_source = true;
        self
    }

    const fn no_target(mut self) -> Self {
        self.disable_connect_target = true;
        self
    }

    const fn group_node(mut self) -> Self {
        self.is_group = true;
        self
    }
}

pub fn schema(node_type: NodeType) -> NodeSchema {
    use NodeType::*;
    match node_type {
        Start => NodeSchema::base(Start, "Start", "Basic").system().no_target(),
        End => NodeSchema::base(End, "End", "Basic").system().no_source(),
        Input => NodeSchema::base(Input, "Process Input", "Interaction"),
        Output => NodeSchema::base(Output, "Process Output", "Interaction"),
        Llm => NodeSchema::base(Llm, "Large Model", "Basic").testable().guarded(),
        Script => NodeSchema::base(Script, "Script", "Basic").testable().guarded(),
        Judge => NodeSchema::base(Judge, "Condition Judgment", "Logic"),
        Iterator => NodeSchema::base(Iterator, "Iteration", "Logic").testable().group_node(),
        IteratorStart => NodeSchema::base(IteratorStart, "Iterator Start", "Logic").system().no_target(),
        IteratorEnd => NodeSchema::base(IteratorEnd, "Iteration End", "Logic").system().no_source(),
        Parallel => NodeSchema::base(Parallel, "Batch Processing", "Logic").testable().group_node(),
        ParallelStart => NodeSchema::base(ParallelStart, "Parallel Start", "Logic").system().no_target(),
        ParallelEnd => NodeSchema::base(ParallelEnd, "Parallel End", "Logic").system().no_source(),
        Retrieval => NodeSchema::base(Retrieval, "Knowledge Base", "Basic").testable().guarded(),
        VariableHandle => NodeSchema::base(VariableHandle, "Variable Aggregation", "Variable"),
        ParameterExtractor => {
            NodeSchema::base(ParameterExtractor, "Parameter Extraction", "Variable").testable().guarded()
        }
    }
}

/// Node types offered in the palette, in catalogue order.
pub fn palette() -> Vec<NodeSchema> {
    NodeType::ALL
        .iter()
        .map(|t| schema(*t))
        .filter(|s| !s.hide_in_menu)
        .collect()
}
