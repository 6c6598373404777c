//! Serde model of the persisted graph document.
//!
//! `GraphDocument` is the single source of truth for a workflow draft: nodes,
//! edges and global config. Everything else in the crate (scope tree,
//! adjacency index, variable registry, validation issues) is derived from it.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::params::*;
use crate::value::{Operator, ValueType};

// =============================================================================
// TOP-LEVEL DOCUMENT
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct GraphDocument {
    #[serde(default)]
    pub nodes: Vec<WorkflowNode>,
    #[serde(default)]
    pub edges: Vec<WorkflowEdge>,
    #[serde(default)]
    pub global_config: GlobalConfig,
}

/// Directed edge. Direction is an execution-order hint; data moves through
/// variable references, never through edges.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WorkflowEdge {
    pub id: String,
    pub source: String,
    pub target: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_handle: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_handle: Option<String>,
}

impl WorkflowEdge {
    pub fn new(source: impl Into<String>, target: impl Into<String>) -> Self {
        let source = source.into();
        let target = target.into();
        WorkflowEdge {
            id: format!("{}-{}", source, target),
            source,
            target,
            source_handle: None,
            target_handle: None,
        }
    }

    pub fn with_source_handle(mut self, handle: impl Into<String>) -> Self {
        let handle = handle.into();
        self.id = format!("{}-{}-{}", self.source, handle, self.target);
        self.source_handle = Some(handle);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct GlobalConfig {
    #[serde(default)]
    pub variable_config: VariableConfig,
    #[serde(default)]
    pub history_config: HistoryConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct VariableConfig {
    #[serde(default)]
    pub conversation_params: Vec<GlobalVariable>,
}

/// App-level variable, resolvable from every node as `${global.<key>}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GlobalVariable {
    pub key: String,
    #[serde(rename = "type")]
    pub value_type: ValueType,
    #[serde(default)]
    pub desc: String,
    #[serde(default)]
    pub default_value: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryConfig {
    pub history_switch: bool,
    pub history_max_round: u32,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        HistoryConfig {
            history_switch: true,
            history_max_round: 3,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

// =============================================================================
// VARIABLES
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueFrom {
    Refer,
    Input,
}

/// Consumption side of a variable: either a `${node.key}` reference or a
/// literal typed in by the user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariableRef {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub key: String,
    pub value_from: ValueFrom,
    #[serde(default)]
    pub value: Option<String>,
    #[serde(rename = "type")]
    pub value_type: ValueType,
}

impl VariableRef {
    pub fn refer(key: impl Into<String>, path: Option<String>, value_type: ValueType) -> Self {
        VariableRef {
            key: key.into(),
            value_from: ValueFrom::Refer,
            value: path,
            value_type,
        }
    }

    pub fn literal(key: impl Into<String>, value: impl Into<String>, value_type: ValueType) -> Self {
        VariableRef {
            key: key.into(),
            value_from: ValueFrom::Input,
            value: Some(value.into()),
            value_type,
        }
    }

    pub fn is_refer(&self) -> bool {
        self.value_from == ValueFrom::Refer
    }

    /// Empty when nothing was selected or typed.
    pub fn is_empty(&self) -> bool {
        self.value.as_deref().is_none_or(|v| v.trim().is_empty())
    }
}

/// Declaration side of a variable, owned by exactly one node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariableDecl {
    pub key: String,
    #[serde(rename = "type")]
    pub value_type: ValueType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub desc: Option<String>,
    /// Child fields of `Object` / `Array<Object>` values.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub properties: Vec<VariableDecl>,
    /// Container outputs only: the inner variable collected into this output.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
}

impl VariableDecl {
    pub fn new(key: impl Into<String>, value_type: ValueType) -> Self {
        VariableDecl {
            key: key.into(),
            value_type,
            desc: None,
            properties: Vec::new(),
            value: None,
        }
    }

    pub fn with_properties(mut self, properties: Vec<VariableDecl>) -> Self {
        self.properties = properties;
        self
    }

    pub fn bound_to(mut self, path: impl Into<String>) -> Self {
        self.value = Some(path.into());
        self
    }
}

// =============================================================================
// BRANCHES
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Logic {
    #[default]
    And,
    Or,
}

/// Judge branch. Exactly one branch per Judge carries no condition and acts
/// as the fallback.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Branch {
    pub id: String,
    pub label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<PredicateTree>,
}

impl Branch {
    pub fn is_default(&self) -> bool {
        self.condition.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct PredicateTree {
    pub logic: Logic,
    pub conditions: Vec<Predicate>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Predicate {
    Group(PredicateTree),
    Compare(Condition),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Condition {
    pub left: VariableRef,
    pub operator: Operator,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub right: Option<VariableRef>,
}

// =============================================================================
// NODES
// =============================================================================

/// Scope a node lives in: the top-level graph or a container's body.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ScopeId {
    Root,
    Container(String),
}

impl ScopeId {
    pub fn from_parent(parent_id: Option<&str>) -> Self {
        match parent_id {
            Some(id) => ScopeId::Container(id.to_string()),
            None => ScopeId::Root,
        }
    }

    pub fn container(&self) -> Option<&str> {
        match self {
            ScopeId::Root => None,
            ScopeId::Container(id) => Some(id),
        }
    }
}

impl fmt::Display for ScopeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScopeId::Root => write!(f, "<root>"),
            ScopeId::Container(id) => write!(f, "{}", id),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(bound(deserialize = "P: Deserialize<'de> + Default"))]
pub struct NodeData<P> {
    pub label: String,
    #[serde(default)]
    pub input_params: Vec<VariableRef>,
    #[serde(default)]
    pub output_params: Vec<VariableDecl>,
    #[serde(default)]
    pub node_param: P,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(bound(deserialize = "P: Deserialize<'de> + Default"))]
pub struct NodeBase<P> {
    pub id: String,
    /// Enclosing container, absent for top-level nodes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<Position>,
    pub data: NodeData<P>,
}

impl<P: Default> NodeBase<P> {
    pub fn new(id: impl Into<String>, label: impl Into<String>) -> Self {
        NodeBase {
            id: id.into(),
            parent_id: None,
            position: None,
            data: NodeData {
                label: label.into(),
                input_params: Vec::new(),
                output_params: Vec::new(),
                node_param: P::default(),
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeType {
    Start,
    End,
    Input,
    Output,
    #[serde(rename = "LLM")]
    Llm,
    Script,
    Judge,
    Iterator,
    IteratorStart,
    IteratorEnd,
    Parallel,
    ParallelStart,
    ParallelEnd,
    Retrieval,
    VariableHandle,
    ParameterExtractor,
}

impl NodeType {
    pub const ALL: [NodeType; 16] = [
        NodeType::Start,
        NodeType::End,
        NodeType::Input,
        NodeType::Output,
        NodeType::Llm,
        NodeType::Script,
        NodeType::Judge,
        NodeType::Iterator,
        NodeType::IteratorStart,
        NodeType::IteratorEnd,
        NodeType::Parallel,
        NodeType::ParallelStart,
        NodeType::ParallelEnd,
        NodeType::Retrieval,
        NodeType::VariableHandle,
        NodeType::ParameterExtractor,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            NodeType::Start => "Start",
            NodeType::End => "End",
            NodeType::Input => "Input",
            NodeType::Output => "Output",
            NodeType::Llm => "LLM",
            NodeType::Script => "Script",
            NodeType::Judge => "Judge",
            NodeType::Iterator => "Iterator",
            NodeType::IteratorStart => "IteratorStart",
            NodeType::IteratorEnd => "IteratorEnd",
            NodeType::Parallel => "Parallel",
            NodeType::ParallelStart => "ParallelStart",
            NodeType::ParallelEnd => "ParallelEnd",
            NodeType::Retrieval => "Retrieval",
            NodeType::VariableHandle => "VariableHandle",
            NodeType::ParameterExtractor => "ParameterExtractor",
        }
    }

    pub fn is_container(self) -> bool {
        matches!(self, NodeType::Iterator | NodeType::Parallel)
    }

    /// Start/End pseudo-nodes auto-created inside a container.
    pub fn is_boundary(self) -> bool {
        self.boundary_owner().is_some()
    }

    /// Container type a boundary node belongs to.
    pub fn boundary_owner(self) -> Option<NodeType> {
        match self {
            NodeType::IteratorStart | NodeType::IteratorEnd => Some(NodeType::Iterator),
            NodeType::ParallelStart | NodeType::ParallelEnd => Some(NodeType::Parallel),
            _ => None,
        }
    }

    /// Boundary node types created together with a container.
    pub fn boundary_pair(self) -> Option<(NodeType, NodeType)> {
        match self {
            NodeType::Iterator => Some((NodeType::IteratorStart, NodeType::IteratorEnd)),
            NodeType::Parallel => Some((NodeType::ParallelStart, NodeType::ParallelEnd)),
            _ => None,
        }
    }
}

impl fmt::Display for NodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// WORKFLOW NODE: tagged union over node types
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum WorkflowNode {
    Start(NodeBase<EmptyParam>),
    End(NodeBase<EndParam>),
    Input(NodeBase<EmptyParam>),
    Output(NodeBase<OutputParam>),
    #[serde(rename = "LLM")]
    Llm(NodeBase<LlmParam>),
    Script(NodeBase<ScriptParam>),
    Judge(NodeBase<JudgeParam>),
    Iterator(NodeBase<IteratorParam>),
    IteratorStart(NodeBase<EmptyParam>),
    IteratorEnd(NodeBase<EmptyParam>),
    Parallel(NodeBase<ParallelParam>),
    ParallelStart(NodeBase<EmptyParam>),
    ParallelEnd(NodeBase<EmptyParam>),
    Retrieval(NodeBase<RetrievalParam>),
    VariableHandle(NodeBase<VariableHandleParam>),
    ParameterExtractor(NodeBase<ParameterExtractorParam>),
}

/// Run `$body` with `$n` bound to the node's `NodeBase`, whatever its params.
macro_rules! with_base {
    ($node:expr, $n:ident => $body:expr) => {
        match $node {
            WorkflowNode::Start($n) => $body,
            WorkflowNode::End($n) => $body,
            WorkflowNode::Input($n) => $body,
            WorkflowNode::Output($n) => $body,
            WorkflowNode::Llm($n) => $body,
            WorkflowNode::Script($n) => $body,
            WorkflowNode::Judge($n) => $body,
            WorkflowNode::Iterator($n) => $body,
            WorkflowNode::IteratorStart($n) => $body,
            WorkflowNode::IteratorEnd($n) => $body,
            WorkflowNode::Parallel($n) => $body,
            WorkflowNode::ParallelStart($n) => $body,
            WorkflowNode::ParallelEnd($n) => $body,
            WorkflowNode::Retrieval($n) => $body,
            WorkflowNode::VariableHandle($n) => $body,
            WorkflowNode::ParameterExtractor($n) => $body,
        }
    };
}

impl WorkflowNode {
    pub fn id(&self) -> &str {
        with_base!(self, n => &n.id)
    }

    pub fn label(&self) -> &str {
        with_base!(self, n => &n.data.label)
    }

    pub fn set_label(&mut self, label: impl Into<String>) {
        let label = label.into();
        with_base!(self, n => n.data.label = label)
    }

    pub fn parent_id(&self) -> Option<&str> {
        with_base!(self, n => n.parent_id.as_deref())
    }

    pub fn set_parent_id(&mut self, parent: Option<String>) {
        with_base!(self, n => n.parent_id = parent)
    }

    pub fn scope(&self) -> ScopeId {
        ScopeId::from_parent(self.parent_id())
    }

    pub fn input_params(&self) -> &[VariableRef] {
        with_base!(self, n => &n.data.input_params)
    }

    pub fn input_params_mut(&mut self) -> &mut Vec<VariableRef> {
        with_base!(self, n => &mut n.data.input_params)
    }

    pub fn output_params(&self) -> &[VariableDecl] {
        with_base!(self, n => &n.data.output_params)
    }

    pub fn output_params_mut(&mut self) -> &mut Vec<VariableDecl> {
        with_base!(self, n => &mut n.data.output_params)
    }

    pub fn node_type(&self) -> NodeType {
        match self {
            WorkflowNode::Start(_) => NodeType::Start,
            WorkflowNode::End(_) => NodeType::End,
            WorkflowNode::Input(_) => NodeType::Input,
            WorkflowNode::Output(_) => NodeType::Output,
            WorkflowNode::Llm(_) => NodeType::Llm,
            WorkflowNode::Script(_) => NodeType::Script,
            WorkflowNode::Judge(_) => NodeType::Judge,
            WorkflowNode::Iterator(_) => NodeType::Iterator,
            WorkflowNode::IteratorStart(_) => NodeType::IteratorStart,
            WorkflowNode::IteratorEnd(_) => NodeType::IteratorEnd,
            WorkflowNode::Parallel(_) => NodeType::Parallel,
            WorkflowNode::ParallelStart(_) => NodeType::ParallelStart,
            WorkflowNode::ParallelEnd(_) => NodeType::ParallelEnd,
            WorkflowNode::Retrieval(_) => NodeType::Retrieval,
            WorkflowNode::VariableHandle(_) => NodeType::VariableHandle,
            WorkflowNode::ParameterExtractor(_) => NodeType::ParameterExtractor,
        }
    }

    pub fn is_container(&self) -> bool {
        self.node_type().is_container()
    }

    pub fn try_catch(&self) -> Option<&TryCatchConfig> {
        match self {
            WorkflowNode::Llm(n) => Some(&n.data.node_param.try_catch_config),
            WorkflowNode::Script(n) => Some(&n.data.node_param.try_catch_config),
            WorkflowNode::Retrieval(n) => Some(&n.data.node_param.try_catch_config),
            WorkflowNode::ParameterExtractor(n) => Some(&n.data.node_param.try_catch_config),
            _ => None,
        }
    }

    pub fn try_catch_mut(&mut self) -> Option<&mut TryCatchConfig> {
        match self {
            WorkflowNode::Llm(n) => Some(&mut n.data.node_param.try_catch_config),
            WorkflowNode::Script(n) => Some(&mut n.data.node_param.try_catch_config),
            WorkflowNode::Retrieval(n) => Some(&mut n.data.node_param.try_catch_config),
            WorkflowNode::ParameterExtractor(n) => Some(&mut n.data.node_param.try_catch_config),
            _ => None,
        }
    }

    pub fn retry(&self) -> Option<&RetryConfig> {
        match self {
            WorkflowNode::Llm(n) => Some(&n.data.node_param.retry_config),
            WorkflowNode::Script(n) => Some(&n.data.node_param.retry_config),
            WorkflowNode::Retrieval(n) => Some(&n.data.node_param.retry_config),
            WorkflowNode::ParameterExtractor(n) => Some(&n.data.node_param.retry_config),
            _ => None,
        }
    }

    pub fn retry_mut(&mut self) -> Option<&mut RetryConfig> {
        match self {
            WorkflowNode::Llm(n) => Some(&mut n.data.node_param.retry_config),
            WorkflowNode::Script(n) => Some(&mut n.data.node_param.retry_config),
            WorkflowNode::Retrieval(n) => Some(&mut n.data.node_param.retry_config),
            WorkflowNode::ParameterExtractor(n) => Some(&mut n.data.node_param.retry_config),
            _ => None,
        }
    }

    /// Judge branches. `None` for every other node type.
    pub fn branches(&self) -> Option<&[Branch]> {
        match self {
            WorkflowNode::Judge(n) => Some(&n.data.node_param.branches),
            _ => None,
        }
    }

    pub fn branches_mut(&mut self) -> Option<&mut Vec<Branch>> {
        match self {
            WorkflowNode::Judge(n) => Some(&mut n.data.node_param.branches),
            _ => None,
        }
    }
}

// =============================================================================
// DOCUMENT QUERIES
// =============================================================================

impl GraphDocument {
    pub fn node(&self, id: &str) -> Option<&WorkflowNode> {
        self.nodes.iter().find(|n| n.id() == id)
    }

    pub fn node_mut(&mut self, id: &str) -> Option<&mut WorkflowNode> {
        self.nodes.iter_mut().find(|n| n.id() == id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.node(id).is_some()
    }

    /// Nodes directly inside `scope`, in document order.
    pub fn nodes_in_scope<'a>(&'a self, scope: &'a ScopeId) -> impl Iterator<Item = &'a WorkflowNode> + 'a {
        self.nodes.iter().filter(move |n| n.scope() == *scope)
    }

    pub fn edges_from<'a>(&'a self, id: &'a str) -> impl Iterator<Item = &'a WorkflowEdge> + 'a {
        self.edges.iter().filter(move |e| e.source == id)
    }

    pub fn global_variables(&self) -> &[GlobalVariable] {
        &self.global_config.variable_config.conversation_params
    }
}
