//! Derived index of resolvable variables.
//!
//! The registry never owns workflow data. It holds the current document
//! version plus a per-view cache of resolvable variable groups; a cache entry
//! is dropped when its node is marked dirty and rebuilt on the next query.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use tracing::trace;

use super::reference::{VarPath, GLOBAL_NODE, SYS_NODE};
use crate::document::*;
use crate::error::IssueKind;
use crate::graph::{scope_levels, FlowGraph, ScopeLevel, ScopeTree};
use crate::value::{is_assignable, ValueType};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum GroupKind {
    Global,
    System,
    /// Variables a container exposes to its own body.
    Container,
    Node,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VariableEntry {
    pub key: String,
    /// Reference string to store in a `refer` value.
    pub path: String,
    pub value_type: ValueType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub desc: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub properties: Vec<VariableDecl>,
}

impl VariableEntry {
    fn new(owner: &str, key: &str, value_type: ValueType) -> Self {
        VariableEntry {
            key: key.to_string(),
            path: VarPath::new(owner, key).to_string(),
            value_type,
            desc: None,
            properties: Vec::new(),
        }
    }

    fn from_decl(owner: &str, decl: &VariableDecl) -> Self {
        VariableEntry {
            desc: decl.desc.clone(),
            properties: decl.properties.clone(),
            ..VariableEntry::new(owner, &decl.key, decl.value_type.clone())
        }
    }

    /// Type at `fields` below this entry. `Ok(None)` when the path walks
    /// into an object without declared properties.
    fn field_type(&self, fields: &[String]) -> Result<Option<ValueType>, ()> {
        let mut ty = self.value_type.clone();
        let mut props = &self.properties;
        for field in fields {
            if props.is_empty() {
                return Ok(None);
            }
            let prop = props.iter().find(|p| p.key == *field).ok_or(())?;
            ty = if ty.is_array() {
                ValueType::array_of(prop.value_type.clone())
            } else {
                prop.value_type.clone()
            };
            props = &prop.properties;
        }
        Ok(Some(ty))
    }
}

/// Variables of one owner, as displayed in a variable picker.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolvableGroup {
    pub node_id: String,
    pub label: String,
    pub kind: GroupKind,
    pub variables: Vec<VariableEntry>,
}

impl fmt::Display for ResolvableGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let vars: Vec<String> = self
            .variables
            .iter()
            .map(|v| format!("{}: {}", v.key, v.value_type))
            .collect();
        write!(f, "{} ({}): {}", self.label, self.node_id, vars.join(", "))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum StaleReason {
    TargetRemoved,
    TypeMismatch,
    OutOfScope,
}

impl StaleReason {
    pub fn issue_kind(self) -> IssueKind {
        match self {
            StaleReason::TargetRemoved => IssueKind::TargetRemoved,
            StaleReason::TypeMismatch => IssueKind::TypeMismatch,
            StaleReason::OutOfScope => IssueKind::OutOfScope,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum RefStatus {
    Valid,
    Stale(StaleReason),
}

impl RefStatus {
    pub fn is_valid(self) -> bool {
        self == RefStatus::Valid
    }
}

/// Variable set a reference is resolved against.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum View {
    /// What a node sees at its own position.
    Node(String),
    /// What is visible at the end of a container's body: used for output
    /// bindings, termination conditions and intermediate variables.
    Inner(String),
}

pub struct VariableRegistry {
    doc: Arc<GraphDocument>,
    graph: FlowGraph,
    scopes: ScopeTree,
    cache: HashMap<View, Vec<ResolvableGroup>>,
}

impl VariableRegistry {
    pub fn new(doc: Arc<GraphDocument>) -> Self {
        VariableRegistry {
            graph: FlowGraph::build(&doc),
            scopes: ScopeTree::build(&doc),
            doc,
            cache: HashMap::new(),
        }
    }

    pub fn document(&self) -> &GraphDocument {
        &self.doc
    }

    /// Handle on the current version, for callers that iterate the document
    /// while querying views.
    pub fn shared(&self) -> Arc<GraphDocument> {
        Arc::clone(&self.doc)
    }

    pub fn graph(&self) -> &FlowGraph {
        &self.graph
    }

    pub fn scopes(&self) -> &ScopeTree {
        &self.scopes
    }

    /// Switch to a new document version. Cached views of `dirty` nodes are
    /// dropped; `None` drops the whole cache.
    pub fn update(&mut self, doc: Arc<GraphDocument>, dirty: Option<&[String]>) {
        self.graph = FlowGraph::build(&doc);
        self.scopes = ScopeTree::build(&doc);
        self.doc = doc;
        match dirty {
            None => self.cache.clear(),
            Some(ids) => self.invalidate(ids),
        }
    }

    /// Drop the cached views of `ids`; they are recomputed on next query.
    pub fn invalidate(&mut self, ids: &[String]) {
        for id in ids {
            self.cache.remove(&View::Node(id.clone()));
            self.cache.remove(&View::Inner(id.clone()));
        }
    }

    pub fn is_cached(&self, node_id: &str) -> bool {
        self.cache.contains_key(&View::Node(node_id.to_string()))
    }

    /// Ordered union of global/system variables and the outputs of every
    /// node in scope, grouped by owner. Empty for unknown nodes.
    pub fn resolvable_variables(&mut self, node_id: &str) -> Vec<ResolvableGroup> {
        if !self.doc.contains(node_id) {
            return Vec::new();
        }
        self.view(&View::Node(node_id.to_string()))
    }

    /// Same as `resolvable_variables`, keeping only variables assignable to
    /// `ty`. Groups left empty are dropped.
    pub fn resolvable_of_type(&mut self, node_id: &str, ty: &ValueType) -> Vec<ResolvableGroup> {
        self.resolvable_variables(node_id)
            .into_iter()
            .filter_map(|mut g| {
                g.variables.retain(|v| is_assignable(&v.value_type, ty));
                (!g.variables.is_empty()).then_some(g)
            })
            .collect()
    }

    pub fn view(&mut self, view: &View) -> Vec<ResolvableGroup> {
        if let Some(groups) = self.cache.get(view) {
            return groups.clone();
        }
        let groups = self.compute(view);
        trace!(?view, groups = groups.len(), "resolved variable view");
        self.cache.insert(view.clone(), groups.clone());
        groups
    }

    /// Status of `r` as consumed by `consumer`.
    pub fn revalidate_ref(&mut self, consumer: &str, r: &VariableRef, expected: Option<&ValueType>) -> RefStatus {
        self.revalidate_in(&View::Node(consumer.to_string()), r, expected)
    }

    pub fn revalidate_in(&mut self, view: &View, r: &VariableRef, expected: Option<&ValueType>) -> RefStatus {
        if !r.is_refer() || r.is_empty() {
            return RefStatus::Valid;
        }
        match r.value.as_deref() {
            Some(raw) => self.revalidate_path(view, raw, expected),
            None => RefStatus::Valid,
        }
    }

    pub fn revalidate_path(&mut self, view: &View, raw: &str, expected: Option<&ValueType>) -> RefStatus {
        let Some(path) = VarPath::parse(raw) else {
            return RefStatus::Stale(StaleReason::TargetRemoved);
        };
        self.revalidate_var(view, &path, expected)
    }

    pub fn revalidate_var(&mut self, view: &View, path: &VarPath, expected: Option<&ValueType>) -> RefStatus {
        let groups = self.view(view);
        let entry = groups
            .iter()
            .filter(|g| g.node_id == path.node_id)
            .flat_map(|g| &g.variables)
            .find(|v| v.key == path.key);

        match entry.map(|e| e.field_type(&path.fields)) {
            Some(Ok(actual)) => match (actual, expected) {
                (Some(actual), Some(expected)) if !is_assignable(&actual, expected) => {
                    RefStatus::Stale(StaleReason::TypeMismatch)
                }
                _ => RefStatus::Valid,
            },
            Some(Err(())) => RefStatus::Stale(StaleReason::TargetRemoved),
            None if path.is_global() || path.is_sys() || !self.declares(path) => {
                RefStatus::Stale(StaleReason::TargetRemoved)
            }
            None => RefStatus::Stale(StaleReason::OutOfScope),
        }
    }

    /// Whether the owner named by `path` still declares its key anywhere,
    /// visible or not.
    fn declares(&self, path: &VarPath) -> bool {
        let Some(node) = self.doc.node(&path.node_id) else {
            return false;
        };
        node.output_params().iter().any(|d| d.key == path.key)
            || container_scope_keys(node).iter().any(|k| *k == path.key)
    }

    // -------------------------------------------------------------------------
    // view construction
    // -------------------------------------------------------------------------

    fn compute(&mut self, view: &View) -> Vec<ResolvableGroup> {
        let levels: Vec<ScopeLevel> = match view {
            View::Node(id) => scope_levels(&self.graph, &self.scopes, id),
            View::Inner(container) => {
                let mut levels = scope_levels(&self.graph, &self.scopes, container);
                let mut members = self.scopes.members(&ScopeId::Container(container.clone()));
                self.graph.sort_topologically(&mut members);
                levels.push(ScopeLevel {
                    container: Some(container.clone()),
                    ancestors: members,
                });
                levels
            }
        };

        let mut groups = self.global_groups();
        for level in levels {
            if let Some(container) = &level.container {
                if let Some(group) = self.container_group(container) {
                    groups.push(group);
                }
            }
            for id in &level.ancestors {
                let Some(node) = self.doc.node(id) else { continue };
                if node.output_params().is_empty() {
                    continue;
                }
                groups.push(ResolvableGroup {
                    node_id: id.clone(),
                    label: node.label().to_string(),
                    kind: GroupKind::Node,
                    variables: node
                        .output_params()
                        .iter()
                        .map(|d| VariableEntry::from_decl(id, d))
                        .collect(),
                });
            }
        }
        groups
    }

    fn global_groups(&self) -> Vec<ResolvableGroup> {
        let mut groups = Vec::new();
        let globals = self.doc.global_variables();
        if !globals.is_empty() {
            groups.push(ResolvableGroup {
                node_id: GLOBAL_NODE.into(),
                label: "Global Variables".into(),
                kind: GroupKind::Global,
                variables: globals
                    .iter()
                    .map(|g| {
                        let mut entry = VariableEntry::new(GLOBAL_NODE, &g.key, g.value_type.clone());
                        if !g.desc.is_empty() {
                            entry.desc = Some(g.desc.clone());
                        }
                        entry
                    })
                    .collect(),
            });
        }

        let mut sys = vec![VariableEntry::new(SYS_NODE, "query", ValueType::String)];
        if self.doc.global_config.history_config.history_switch {
            sys.push(VariableEntry::new(
                SYS_NODE,
                "history_list",
                ValueType::array_of(ValueType::String),
            ));
        }
        groups.push(ResolvableGroup {
            node_id: SYS_NODE.into(),
            label: "System Variables".into(),
            kind: GroupKind::System,
            variables: sys,
        });
        groups
    }

    /// Scope variables `container` exposes to its body: `index`, one element
    /// variable per iterated input and the iterator's intermediate variables.
    fn container_group(&mut self, container: &str) -> Option<ResolvableGroup> {
        let node = self.doc.node(container)?.clone();
        let mut variables = vec![VariableEntry::new(container, "index", ValueType::Number)];

        let iterated: &[VariableRef] = match &node {
            WorkflowNode::Iterator(n) if n.data.node_param.iterator_type == IteratorType::ByArray => {
                &n.data.input_params
            }
            WorkflowNode::Parallel(n) => &n.data.input_params,
            WorkflowNode::Iterator(_) => &[],
            _ => return None,
        };
        for input in iterated.iter().filter(|r| !r.key.is_empty()) {
            let source = self.resolved_type(&View::Node(container.to_string()), input);
            let element = source.element().cloned().unwrap_or(source);
            variables.push(VariableEntry::new(container, &input.key, element));
        }

        if let WorkflowNode::Iterator(n) = &node {
            for var in n.data.node_param.variable_parameters.iter().filter(|r| !r.key.is_empty()) {
                variables.push(VariableEntry::new(container, &var.key, var.value_type.clone()));
            }
        }

        Some(ResolvableGroup {
            node_id: container.to_string(),
            label: node.label().to_string(),
            kind: GroupKind::Container,
            variables,
        })
    }

    /// Actual type behind a reference when it resolves, else its recorded
    /// type.
    fn resolved_type(&mut self, view: &View, r: &VariableRef) -> ValueType {
        if r.is_refer() {
            if let Some(path) = r.value.as_deref().and_then(VarPath::parse) {
                let groups = self.view(view);
                let found = groups
                    .iter()
                    .filter(|g| g.node_id == path.node_id)
                    .flat_map(|g| &g.variables)
                    .find(|v| v.key == path.key)
                    .and_then(|v| v.field_type(&path.fields).ok().flatten());
                if let Some(ty) = found {
                    return ty;
                }
            }
        }
        r.value_type.clone()
    }
}

/// Keys a container declares for its body.
fn container_scope_keys(node: &WorkflowNode) -> Vec<&str> {
    let mut keys = vec!["index"];
    match node {
        WorkflowNode::Iterator(n) => {
            if n.data.node_param.iterator_type == IteratorType::ByArray {
                keys.extend(n.data.input_params.iter().map(|r| r.key.as_str()));
            }
            keys.extend(n.data.node_param.variable_parameters.iter().map(|r| r.key.as_str()));
        }
        WorkflowNode::Parallel(n) => keys.extend(n.data.input_params.iter().map(|r| r.key.as_str())),
        _ => return Vec::new(),
    }
    keys
}
