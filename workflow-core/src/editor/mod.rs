//! Editing session: versioned document, undo/redo, incremental
//! re-validation and change notification.
//!
//! Every operation runs against a copy of the current version and commits
//! only if it succeeds, so a rejected edit leaves the session untouched.
//! After a commit the affected nodes are re-resolved and re-validated
//! before listeners are called and the operation returns.

pub mod history;
pub mod propagate;

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, warn};

use crate::branch::{self, BranchIdAllocator};
use crate::config::EditorConfig;
use crate::document::*;
use crate::error::{EditError, StructuralError, ValidationIssue};
use crate::error_policy;
use crate::external::{KnowledgeCache, KnowledgeMeta};
use crate::graph::{self, fail_handle, ops::remove_edges_by_handle};
use crate::schema::{apply_bounds, bounds::apply_history_bounds, default_node, derived_outputs};
use crate::validate::{self, PublishVerdict};
use crate::value::ValueType;
use crate::variable::{self, RefStatus, ResolvableGroup, VariableRegistry};

pub use history::History;
pub use propagate::{affected_nodes, Touched};

/// What a committed edit changed, handed to listeners and returned to the
/// caller.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChangeSet {
    pub version: u64,
    /// Surviving nodes that were re-resolved and re-validated.
    pub affected: Vec<String>,
    pub removed: Vec<String>,
    /// Fresh issues of every affected node.
    pub issues: BTreeMap<String, Vec<ValidationIssue>>,
}

pub type Listener = Box<dyn FnMut(&ChangeSet)>;

pub struct Editor {
    config: EditorConfig,
    history: History,
    registry: VariableRegistry,
    branch_ids: BranchIdAllocator,
    knowledge: KnowledgeCache,
    issues: BTreeMap<String, Vec<ValidationIssue>>,
    listeners: Vec<Listener>,
    version: u64,
}

impl Editor {
    /// Open a session on `doc` and run a full scan.
    pub fn new(doc: GraphDocument, config: EditorConfig) -> Self {
        let doc = Arc::new(doc);
        let mut branch_ids = BranchIdAllocator::new();
        branch_ids.observe(&doc);
        let mut editor = Editor {
            history: History::new(Arc::clone(&doc), config.history_limit),
            registry: VariableRegistry::new(doc),
            config,
            branch_ids,
            knowledge: KnowledgeCache::new(),
            issues: BTreeMap::new(),
            listeners: Vec::new(),
            version: 0,
        };
        editor.full_scan();
        editor
    }

    pub fn load(json: &str, config: EditorConfig) -> Result<Self, EditError> {
        Ok(Self::new(crate::document::parse(json)?, config))
    }

    pub fn document(&self) -> &GraphDocument {
        self.registry.document()
    }

    /// Current version, shareable with readers outside the session.
    pub fn snapshot(&self) -> Arc<GraphDocument> {
        self.registry.shared()
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn config(&self) -> &EditorConfig {
        &self.config
    }

    pub fn registry_mut(&mut self) -> &mut VariableRegistry {
        &mut self.registry
    }

    pub fn subscribe(&mut self, listener: impl FnMut(&ChangeSet) + 'static) {
        self.listeners.push(Box::new(listener));
    }

    /// Current issues of `node_id`.
    pub fn issues(&self, node_id: &str) -> &[ValidationIssue] {
        self.issues.get(node_id).map(Vec::as_slice).unwrap_or_default()
    }

    pub fn all_issues(&self) -> impl Iterator<Item = &ValidationIssue> {
        self.issues.values().flatten()
    }

    // -------------------------------------------------------------------------
    // Graph
    // -------------------------------------------------------------------------

    /// Insert a node of `node_type` with its default parameters.
    pub fn insert_node(&mut self, node_type: NodeType, id: &str, scope: ScopeId) -> Result<ChangeSet, EditError> {
        self.add_node(default_node(node_type, id), scope)
    }

    /// Insert `node` into `scope`. Numeric parameters go through the range
    /// policy first.
    pub fn add_node(&mut self, mut node: WorkflowNode, scope: ScopeId) -> Result<ChangeSet, EditError> {
        let policy = self.config.range_policy;
        self.edit("add_node", |doc, alloc| {
            apply_bounds(&mut node, policy)?;
            branch::ensure_single_default(&node)?;
            if let Some(branches) = node.branches() {
                alloc.observe_branches(branches);
            }
            let ids = graph::add_node(doc, node, scope)?;
            Ok(((), Touched::default().with_seeds(ids)))
        })
        .map(|(_, change)| change)
    }

    /// Remove a node, its edges and, for containers, its whole sub-scope.
    pub fn remove_node(&mut self, id: &str) -> Result<ChangeSet, EditError> {
        self.edit("remove_node", |doc, _| {
            let removed = graph::remove_node(doc, id)?;
            Ok(((), Touched::default().with_seeds(removed.downstream).with_removed(removed.removed)))
        })
        .map(|(_, change)| change)
    }

    pub fn add_edge(&mut self, edge: WorkflowEdge) -> Result<ChangeSet, EditError> {
        self.edit("add_edge", |doc, _| {
            let touched = edge_touched(&edge);
            graph::add_edge(doc, edge)?;
            Ok(((), touched))
        })
        .map(|(_, change)| change)
    }

    pub fn remove_edge(&mut self, edge_id: &str) -> Result<ChangeSet, EditError> {
        self.edit("remove_edge", |doc, _| {
            let edge = graph::remove_edge(doc, edge_id)
                .ok_or_else(|| EditError::unsupported(format!("no edge '{}'", edge_id)))?;
            Ok(((), edge_touched(&edge)))
        })
        .map(|(_, change)| change)
    }

    // -------------------------------------------------------------------------
    // Node content
    // -------------------------------------------------------------------------

    pub fn declare_outputs(&mut self, node_id: &str, decls: Vec<VariableDecl>) -> Result<ChangeSet, EditError> {
        self.edit("declare_outputs", |doc, _| {
            variable::declare_outputs(doc, node_id, decls)?;
            Ok(((), Touched::node(node_id)))
        })
        .map(|(_, change)| change)
    }

    /// Replace a node's content. Identity and placement are kept from the
    /// current version; numeric parameters go through the range policy and
    /// derived outputs are recomputed. A Judge must keep exactly one default
    /// branch. Edges left without a branch or fail
    /// handle are removed.
    pub fn update_node(&mut self, mut node: WorkflowNode) -> Result<ChangeSet, EditError> {
        let policy = self.config.range_policy;
        self.edit("update_node", |doc, alloc| {
            let id = node.id().to_string();
            let current = doc
                .node(&id)
                .ok_or_else(|| StructuralError::UnknownNode(id.clone()))?;
            if current.node_type() != node.node_type() {
                return Err(EditError::unsupported(format!(
                    "node '{}' cannot change type from {} to {}",
                    id,
                    current.node_type(),
                    node.node_type()
                )));
            }
            let parent = current.parent_id().map(String::from);
            let old_handles = source_handles(current);

            node.set_parent_id(parent);
            apply_bounds(&mut node, policy)?;
            branch::ensure_single_default(&node)?;
            if let Some(outputs) = derived_outputs(&node) {
                *node.output_params_mut() = outputs;
            }
            error_policy::sync_default_values(&mut node);
            let new_handles = source_handles(&node);

            let Some(slot) = doc.node_mut(&id) else {
                return Err(StructuralError::UnknownNode(id).into());
            };
            *slot = node;
            if let Some(branches) = slot.branches() {
                alloc.observe_branches(branches);
            }

            let mut touched = Touched::node(id.clone());
            for handle in old_handles.iter().filter(|h| !new_handles.contains(h)) {
                let removed = remove_edges_by_handle(doc, &id, handle);
                touched = touched.with_seeds(removed.into_iter().map(|e| e.target));
            }
            Ok(((), touched))
        })
        .map(|(_, change)| change)
    }

    pub fn set_label(&mut self, node_id: &str, label: &str) -> Result<ChangeSet, EditError> {
        self.edit("set_label", |doc, _| {
            let node = doc
                .node_mut(node_id)
                .ok_or_else(|| StructuralError::UnknownNode(node_id.to_string()))?;
            node.set_label(label);
            Ok(((), Touched::node(node_id)))
        })
        .map(|(_, change)| change)
    }

    pub fn set_error_strategy(&mut self, node_id: &str, strategy: ErrorStrategy) -> Result<ChangeSet, EditError> {
        self.edit("set_error_strategy", |doc, _| {
            let removed = error_policy::set_strategy(doc, node_id, strategy)?;
            Ok(((), Touched::node(node_id).with_seeds(removed.into_iter().map(|e| e.target))))
        })
        .map(|(_, change)| change)
    }

    // -------------------------------------------------------------------------
    // Judge branches
    // -------------------------------------------------------------------------

    /// Add a guarded branch; returns its freshly allocated id.
    pub fn add_branch(
        &mut self,
        judge_id: &str,
        label: &str,
        condition: PredicateTree,
    ) -> Result<(String, ChangeSet), EditError> {
        self.edit("add_branch", |doc, alloc| {
            let id = branch::add_branch(doc, alloc, judge_id, label, condition)?;
            Ok((id, Touched::node(judge_id)))
        })
    }

    pub fn remove_branch(&mut self, judge_id: &str, branch_id: &str) -> Result<ChangeSet, EditError> {
        self.edit("remove_branch", |doc, _| {
            let removed = branch::remove_branch(doc, judge_id, branch_id)?;
            Ok(((), Touched::node(judge_id).with_seeds(removed.into_iter().map(|e| e.target))))
        })
        .map(|(_, change)| change)
    }

    pub fn update_branch(
        &mut self,
        judge_id: &str,
        branch_id: &str,
        label: &str,
        condition: PredicateTree,
    ) -> Result<ChangeSet, EditError> {
        self.edit("update_branch", |doc, _| {
            branch::update_branch(doc, judge_id, branch_id, label, condition)?;
            Ok(((), Touched::node(judge_id)))
        })
        .map(|(_, change)| change)
    }

    pub fn move_branch(&mut self, judge_id: &str, branch_id: &str, index: usize) -> Result<ChangeSet, EditError> {
        self.edit("move_branch", |doc, _| {
            branch::move_branch(doc, judge_id, branch_id, index)?;
            Ok(((), Touched::node(judge_id)))
        })
        .map(|(_, change)| change)
    }

    // -------------------------------------------------------------------------
    // Global configuration
    // -------------------------------------------------------------------------

    pub fn set_global_variables(&mut self, vars: Vec<GlobalVariable>) -> Result<ChangeSet, EditError> {
        self.edit("set_global_variables", |doc, _| {
            doc.global_config.variable_config.conversation_params = vars;
            Ok(((), Touched::global()))
        })
        .map(|(_, change)| change)
    }

    pub fn set_history_config(&mut self, mut history: HistoryConfig) -> Result<ChangeSet, EditError> {
        let policy = self.config.range_policy;
        self.edit("set_history_config", |doc, _| {
            apply_history_bounds(&mut history, policy)?;
            doc.global_config.history_config = history;
            Ok(((), Touched::global()))
        })
        .map(|(_, change)| change)
    }

    // -------------------------------------------------------------------------
    // History
    // -------------------------------------------------------------------------

    pub fn can_undo(&self) -> bool {
        self.history.can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.history.can_redo()
    }

    pub fn undo(&mut self) -> Option<ChangeSet> {
        let doc = self.history.undo()?;
        Some(self.restore(doc))
    }

    pub fn redo(&mut self) -> Option<ChangeSet> {
        let doc = self.history.redo()?;
        Some(self.restore(doc))
    }

    // -------------------------------------------------------------------------
    // Queries
    // -------------------------------------------------------------------------

    pub fn resolvable_variables(&mut self, node_id: &str) -> Vec<ResolvableGroup> {
        self.registry.resolvable_variables(node_id)
    }

    pub fn resolvable_of_type(&mut self, node_id: &str, ty: &ValueType) -> Vec<ResolvableGroup> {
        self.registry.resolvable_of_type(node_id, ty)
    }

    pub fn revalidate_ref(&mut self, consumer: &str, r: &VariableRef, expected: Option<&ValueType>) -> RefStatus {
        self.registry.revalidate_ref(consumer, r, expected)
    }

    /// Re-validate every node and refresh the stored issues.
    pub fn full_scan(&mut self) -> Vec<ValidationIssue> {
        let issues = validate::validate_document(&mut self.registry);
        self.issues = BTreeMap::new();
        for node in &self.registry.document().nodes {
            self.issues.insert(node.id().to_string(), Vec::new());
        }
        for issue in &issues {
            if let Some(id) = &issue.node_id {
                if let Some(list) = self.issues.get_mut(id) {
                    list.push(issue.clone());
                }
            }
        }
        issues
    }

    /// Full scan and publish gating under the session's configuration.
    pub fn check_publish(&mut self) -> PublishVerdict {
        self.full_scan();
        validate::check_publish(&mut self.registry, &self.config)
    }

    // -------------------------------------------------------------------------
    // Knowledge bases
    // -------------------------------------------------------------------------

    /// Feed a knowledge-base lookup result back in. Results for nodes that
    /// were removed in the meantime are ignored.
    pub fn apply_knowledge_list<E: std::fmt::Display>(
        &mut self,
        node_id: &str,
        result: Result<Vec<KnowledgeMeta>, E>,
    ) -> bool {
        let doc = self.registry.shared();
        self.knowledge.apply_knowledge_list(&doc, node_id, result)
    }

    pub fn knowledge_list(&self, node_id: &str) -> &[KnowledgeMeta] {
        self.knowledge.get(node_id)
    }

    // -------------------------------------------------------------------------
    // Commit
    // -------------------------------------------------------------------------

    fn edit<T, F>(&mut self, op: &'static str, f: F) -> Result<(T, ChangeSet), EditError>
    where
        F: FnOnce(&mut GraphDocument, &mut BranchIdAllocator) -> Result<(T, Touched), EditError>,
    {
        let mut doc = self.registry.document().clone();
        let (value, touched) = match f(&mut doc, &mut self.branch_ids) {
            Ok(done) => done,
            Err(err) => {
                warn!(op, %err, "edit rejected");
                return Err(err);
            }
        };
        let doc = Arc::new(doc);
        self.history.push(Arc::clone(&doc));
        let change = self.commit(doc, touched);
        debug!(op, version = change.version, affected = change.affected.len(), "edit committed");
        Ok((value, change))
    }

    fn restore(&mut self, doc: Arc<GraphDocument>) -> ChangeSet {
        self.branch_ids.observe(&doc);
        let removed = self
            .registry
            .document()
            .nodes
            .iter()
            .filter(|n| !doc.contains(n.id()))
            .map(|n| n.id().to_string())
            .collect::<Vec<_>>();
        self.commit(doc, Touched::global().with_removed(removed))
    }

    fn commit(&mut self, doc: Arc<GraphDocument>, touched: Touched) -> ChangeSet {
        self.registry.update(doc, Some(&[][..]));
        let affected = affected_nodes(
            self.registry.document(),
            self.registry.graph(),
            self.registry.scopes(),
            &touched,
        );
        if touched.global {
            self.registry.update(self.registry.shared(), None);
        } else {
            let mut dirty = affected.clone();
            dirty.extend(touched.removed.iter().cloned());
            self.registry.invalidate(&dirty);
        }

        for id in &touched.removed {
            self.issues.remove(id);
        }
        self.knowledge.retain_existing(self.registry.document());

        let mut issues = BTreeMap::new();
        for id in &affected {
            let found = validate::validate_node(&mut self.registry, id);
            self.issues.insert(id.clone(), found.clone());
            issues.insert(id.clone(), found);
        }

        self.version += 1;
        let change = ChangeSet {
            version: self.version,
            affected,
            removed: touched.removed,
            issues,
        };
        for listener in &mut self.listeners {
            listener(&change);
        }
        change
    }
}

/// The target, plus the source when the edge uses a branch or fail handle.
fn edge_touched(edge: &WorkflowEdge) -> Touched {
    let touched = Touched::node(edge.target.clone());
    match edge.source_handle {
        Some(_) => touched.with_seeds([edge.source.clone()]),
        None => touched,
    }
}

/// Handles `node` owns: one per Judge branch, plus the fail handle while
/// its strategy is `failBranch`.
fn source_handles(node: &WorkflowNode) -> Vec<String> {
    let mut handles: Vec<String> = node
        .branches()
        .unwrap_or_default()
        .iter()
        .map(|b| graph::branch_handle(node.id(), &b.id))
        .collect();
    if node
        .try_catch()
        .is_some_and(|tc| tc.strategy == ErrorStrategy::FailBranch)
    {
        handles.push(fail_handle(node.id()));
    }
    handles
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use super::*;
    use crate::config::RangePolicy;
    use crate::error::IssueKind;

    fn editor() -> Editor {
        let mut editor = Editor::new(GraphDocument::default(), EditorConfig::default());
        editor.insert_node(NodeType::Start, "start", ScopeId::Root).unwrap();
        editor.insert_node(NodeType::Llm, "llm", ScopeId::Root).unwrap();
        editor.insert_node(NodeType::End, "end", ScopeId::Root).unwrap();
        editor.add_edge(WorkflowEdge::new("start", "llm")).unwrap();
        editor.add_edge(WorkflowEdge::new("llm", "end")).unwrap();
        editor
    }

    #[test]
    fn rejected_edit_leaves_session_untouched() {
        let mut editor = editor();
        let version = editor.version();
        let err = editor.add_edge(WorkflowEdge::new("llm", "start")).unwrap_err();
        assert!(matches!(err, EditError::Structural(_)));
        assert_eq!(editor.version(), version);
        assert_eq!(editor.document().edges.len(), 2);
    }

    #[test]
    fn listeners_see_every_commit() {
        let mut editor = editor();
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        editor.subscribe(move |change| sink.borrow_mut().push(change.version));

        editor.set_label("llm", "Writer").unwrap();
        editor.remove_node("llm").unwrap();
        assert_eq!(seen.borrow().len(), 2);
    }

    #[test]
    fn removing_a_producer_flags_its_consumer() {
        let mut editor = editor();
        let mut end = editor.document().node("end").cloned().unwrap();
        if let WorkflowNode::End(n) = &mut end {
            n.data.node_param.text_template = "${llm.output}".into();
        }
        editor.update_node(end).unwrap();
        assert!(editor.issues("end").is_empty());

        let change = editor.remove_node("llm").unwrap();
        assert_eq!(change.removed, ["llm"]);
        assert!(change.affected.contains(&"end".to_string()));
        assert_eq!(editor.issues("end")[0].kind, IssueKind::TargetRemoved);
        assert!(editor.issues("llm").is_empty());
    }

    #[test]
    fn undo_restores_previous_version() {
        let mut editor = editor();
        editor.remove_node("llm").unwrap();
        assert!(!editor.document().contains("llm"));

        editor.undo().unwrap();
        assert!(editor.document().contains("llm"));
        assert_eq!(editor.document().edges.len(), 2);

        let change = editor.redo().unwrap();
        assert_eq!(change.removed, ["llm"]);
        assert!(editor.redo().is_none());
    }

    #[test]
    fn update_node_keeps_placement_and_clamps() {
        let mut editor = editor();
        editor.insert_node(NodeType::Parallel, "par", ScopeId::Root).unwrap();
        let mut par = editor.document().node("par").cloned().unwrap();
        if let WorkflowNode::Parallel(n) = &mut par {
            n.data.node_param.batch_size = 999;
            n.parent_id = Some("elsewhere".into());
        }
        editor.update_node(par).unwrap();
        match editor.document().node("par") {
            Some(WorkflowNode::Parallel(n)) => {
                assert_eq!(n.data.node_param.batch_size, 200);
                assert_eq!(n.parent_id, None);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    fn oversized_parallel() -> WorkflowNode {
        let mut node = default_node(NodeType::Parallel, "par");
        if let WorkflowNode::Parallel(n) = &mut node {
            n.data.node_param.batch_size = 999;
            n.data.node_param.concurrent_size = 0;
        }
        node
    }

    fn parallel_sizes(editor: &Editor) -> Option<(u32, u32)> {
        match editor.document().node("par") {
            Some(WorkflowNode::Parallel(n)) => Some((n.data.node_param.batch_size, n.data.node_param.concurrent_size)),
            _ => None,
        }
    }

    #[test]
    fn add_node_rejects_out_of_range_under_reject_policy() {
        let config = EditorConfig {
            range_policy: RangePolicy::Reject,
            ..EditorConfig::default()
        };
        let mut editor = Editor::new(editor().document().clone(), config);
        let version = editor.version();

        let err = editor.add_node(oversized_parallel(), ScopeId::Root).unwrap_err();
        assert!(matches!(err, EditError::OutOfRange { .. }));
        assert!(!editor.document().contains("par"));
        assert_eq!(editor.version(), version);
    }

    #[test]
    fn add_node_clamps_out_of_range_by_default() {
        let mut editor = editor();
        editor.add_node(oversized_parallel(), ScopeId::Root).unwrap();
        assert_eq!(parallel_sizes(&editor), Some((200, 1)));
        assert!(!editor.issues("par").iter().any(|i| i.code == "N016"));
    }

    #[test]
    fn loaded_out_of_range_values_are_flagged() {
        let mut doc = editor().document().clone();
        graph::add_node(&mut doc, oversized_parallel(), ScopeId::Root).unwrap();

        let mut editor = Editor::new(doc, EditorConfig::default());
        assert_eq!(parallel_sizes(&editor), Some((999, 0)));
        let flagged: Vec<&str> = editor
            .issues("par")
            .iter()
            .filter(|i| i.code == "N016")
            .map(|i| i.label.as_str())
            .collect();
        assert_eq!(flagged, ["batch_size", "concurrent_size"]);
        assert!(editor.check_publish().warnings.iter().any(|i| i.code == "N016"));
    }

    #[test]
    fn judge_must_keep_one_default_branch() {
        let mut editor = editor();
        editor.insert_node(NodeType::Judge, "judge", ScopeId::Root).unwrap();
        let original = editor.document().node("judge").cloned().unwrap();

        let mut emptied = original.clone();
        if let Some(branches) = emptied.branches_mut() {
            branches.clear();
        }
        assert!(matches!(editor.update_node(emptied), Err(EditError::Unsupported(_))));

        let mut doubled = original.clone();
        if let Some(branches) = doubled.branches_mut() {
            let extra = branches[0].clone();
            branches.push(extra);
        }
        assert!(matches!(editor.update_node(doubled), Err(EditError::Unsupported(_))));
        assert_eq!(editor.document().node("judge"), Some(&original));
    }

    #[test]
    fn loaded_judge_without_default_is_flagged() {
        let mut doc = editor().document().clone();
        let mut judge = default_node(NodeType::Judge, "judge");
        if let Some(branches) = judge.branches_mut() {
            branches.clear();
        }
        graph::add_node(&mut doc, judge, ScopeId::Root).unwrap();

        let editor = Editor::new(doc, EditorConfig::default());
        assert!(editor.issues("judge").iter().any(|i| i.code == "N017"));
    }

    #[test]
    fn update_node_drops_edges_of_vanished_branches() {
        let mut editor = editor();
        editor.insert_node(NodeType::Judge, "judge", ScopeId::Root).unwrap();
        editor.insert_node(NodeType::Output, "yes", ScopeId::Root).unwrap();
        let (branch_id, _) = editor
            .add_branch("judge", "Yes", PredicateTree::default())
            .unwrap();
        editor
            .add_edge(WorkflowEdge::new("judge", "yes").with_source_handle(graph::branch_handle("judge", &branch_id)))
            .unwrap();

        let mut judge = editor.document().node("judge").cloned().unwrap();
        if let Some(branches) = judge.branches_mut() {
            branches.retain(|b| b.is_default());
        }
        editor.update_node(judge).unwrap();
        assert!(editor.document().edges.iter().all(|e| e.source != "judge"));
    }

    #[test]
    fn global_change_revalidates_everything() {
        let mut editor = editor();
        let change = editor
            .set_global_variables(vec![GlobalVariable {
                key: "city".into(),
                value_type: ValueType::String,
                desc: String::new(),
                default_value: None,
            }])
            .unwrap();
        assert_eq!(change.affected.len(), 3);
        assert!(editor
            .resolvable_variables("llm")
            .iter()
            .any(|g| g.node_id == variable::GLOBAL_NODE));
    }
}
