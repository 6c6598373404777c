//! Contracts with the collaborators around the editor: app persistence,
//! knowledge-base lookup, the publish diff and test-run snapshots.

use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::document::{self, GraphDocument, WorkflowEdge, WorkflowNode};
use crate::error::{EditError, StructuralError};
use crate::schema::schema;
use crate::validate::collect_refs;
use crate::value::ValueType;
use crate::variable::{RefStatus, VariableRegistry};

// =============================================================================
// PERSISTENCE
// =============================================================================

/// Where graph documents are saved between sessions.
pub trait AppStore {
    fn save_app(&mut self, app_id: &str, doc: &GraphDocument) -> Result<(), EditError>;
    fn load_app(&self, app_id: &str) -> Result<GraphDocument, EditError>;
}

/// In-process store keeping the serialized form, so a load goes through
/// the same JSON encoding a remote store would.
#[derive(Debug, Default, Clone)]
pub struct MemoryAppStore {
    apps: HashMap<String, String>,
}

impl MemoryAppStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl AppStore for MemoryAppStore {
    fn save_app(&mut self, app_id: &str, doc: &GraphDocument) -> Result<(), EditError> {
        let json = document::to_json(doc)?;
        debug!(app_id, bytes = json.len(), "app saved");
        self.apps.insert(app_id.to_string(), json);
        Ok(())
    }

    fn load_app(&self, app_id: &str) -> Result<GraphDocument, EditError> {
        let json = self
            .apps
            .get(app_id)
            .ok_or_else(|| EditError::UnknownApp(app_id.to_string()))?;
        document::parse(json)
    }
}

// =============================================================================
// KNOWLEDGE BASES
// =============================================================================

/// Display data of a knowledge base bound to a Retrieval node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KnowledgeMeta {
    pub kb_id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
}

pub trait KnowledgeBaseLookup {
    type Error: fmt::Display;

    fn knowledge_by_codes(&self, ids: &[String]) -> Result<Vec<KnowledgeMeta>, Self::Error>;
}

/// Knowledge-base display data per Retrieval node.
#[derive(Debug, Default, Clone)]
pub struct KnowledgeCache {
    entries: HashMap<String, Vec<KnowledgeMeta>>,
}

impl KnowledgeCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, node_id: &str) -> &[KnowledgeMeta] {
        self.entries.get(node_id).map(Vec::as_slice).unwrap_or_default()
    }

    /// Store a lookup result for `node_id`. Responses for nodes that are no
    /// longer Retrieval nodes of `doc` are dropped; a failed lookup leaves
    /// the node's list empty. Returns whether the result was applied.
    pub fn apply_knowledge_list<E: fmt::Display>(
        &mut self,
        doc: &GraphDocument,
        node_id: &str,
        result: Result<Vec<KnowledgeMeta>, E>,
    ) -> bool {
        let Some(WorkflowNode::Retrieval(node)) = doc.node(node_id) else {
            warn!(node_id, "knowledge list for a node that no longer exists");
            return false;
        };
        let list = match result {
            Ok(list) => {
                let bound = &node.data.node_param.knowledge_base_ids;
                list.into_iter().filter(|kb| bound.contains(&kb.kb_id)).collect()
            }
            Err(err) => {
                warn!(node_id, %err, "knowledge lookup failed");
                Vec::new()
            }
        };
        self.entries.insert(node_id.to_string(), list);
        true
    }

    /// Synchronous lookup followed by `apply_knowledge_list`.
    pub fn refresh<L: KnowledgeBaseLookup>(&mut self, lookup: &L, doc: &GraphDocument, node_id: &str) -> bool {
        let ids = match doc.node(node_id) {
            Some(WorkflowNode::Retrieval(n)) => n.data.node_param.knowledge_base_ids.clone(),
            _ => return false,
        };
        if ids.is_empty() {
            self.entries.insert(node_id.to_string(), Vec::new());
            return true;
        }
        self.apply_knowledge_list(doc, node_id, lookup.knowledge_by_codes(&ids))
    }

    /// Forget entries of nodes missing from `doc`.
    pub fn retain_existing(&mut self, doc: &GraphDocument) {
        self.entries.retain(|id, _| doc.contains(id));
    }
}

// =============================================================================
// PUBLISH DIFF
// =============================================================================

/// Difference between the last published document and the draft.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ConfigDiff {
    pub added_nodes: Vec<String>,
    pub removed_nodes: Vec<String>,
    /// Nodes present in both whose content differs.
    pub changed_nodes: Vec<String>,
    pub added_edges: Vec<String>,
    pub removed_edges: Vec<String>,
    pub global_config_changed: bool,
}

impl ConfigDiff {
    pub fn between(published: &GraphDocument, draft: &GraphDocument) -> Self {
        let mut diff = ConfigDiff::default();
        for node in &draft.nodes {
            match published.node(node.id()) {
                None => diff.added_nodes.push(node.id().to_string()),
                Some(old) if old != node => diff.changed_nodes.push(node.id().to_string()),
                Some(_) => {}
            }
        }
        diff.removed_nodes = published
            .nodes
            .iter()
            .filter(|n| !draft.contains(n.id()))
            .map(|n| n.id().to_string())
            .collect();

        let old_edges: BTreeSet<String> = published.edges.iter().map(edge_key).collect();
        let new_edges: BTreeSet<String> = draft.edges.iter().map(edge_key).collect();
        diff.added_edges = new_edges.difference(&old_edges).cloned().collect();
        diff.removed_edges = old_edges.difference(&new_edges).cloned().collect();
        diff.global_config_changed = published.global_config != draft.global_config;
        diff
    }

    pub fn is_empty(&self) -> bool {
        self.added_nodes.is_empty()
            && self.removed_nodes.is_empty()
            && self.changed_nodes.is_empty()
            && self.added_edges.is_empty()
            && self.removed_edges.is_empty()
            && !self.global_config_changed
    }
}

/// Edges are compared by endpoints and handle, not by generated id.
fn edge_key(edge: &WorkflowEdge) -> String {
    match &edge.source_handle {
        Some(handle) if handle != &edge.source => format!("{}[{}] -> {}", edge.source, handle, edge.target),
        _ => format!("{} -> {}", edge.source, edge.target),
    }
}

// =============================================================================
// TEST RUNS
// =============================================================================

/// One consumed variable as seen at snapshot time.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolvedBinding {
    pub node_id: String,
    pub label: String,
    pub path: String,
    pub expected: Option<ValueType>,
    pub status: RefStatus,
}

/// Read-only view handed to the test-run component.
#[derive(Debug, Clone, Serialize)]
pub struct TestRunSnapshot {
    pub document: Arc<GraphDocument>,
    /// Node under test, `None` for a whole-graph run.
    pub node_id: Option<String>,
    pub bindings: Vec<ResolvedBinding>,
}

impl TestRunSnapshot {
    /// Snapshot for a whole-graph run.
    pub fn for_graph(registry: &mut VariableRegistry) -> Self {
        let doc = registry.shared();
        let bindings = doc.nodes.iter().flat_map(|n| resolve_bindings(registry, n)).collect();
        TestRunSnapshot {
            document: doc,
            node_id: None,
            bindings,
        }
    }

    /// Snapshot for a single-node run. Only node types that allow single
    /// tests qualify.
    pub fn for_node(registry: &mut VariableRegistry, node_id: &str) -> Result<Self, EditError> {
        let doc = registry.shared();
        let node = doc
            .node(node_id)
            .ok_or_else(|| StructuralError::UnknownNode(node_id.to_string()))?;
        if !schema(node.node_type()).allow_single_test {
            return Err(EditError::unsupported(format!(
                "{} nodes cannot be tested on their own",
                node.node_type()
            )));
        }
        let bindings = resolve_bindings(registry, node);
        Ok(TestRunSnapshot {
            node_id: Some(node_id.to_string()),
            document: Arc::clone(&doc),
            bindings,
        })
    }
}

fn resolve_bindings(registry: &mut VariableRegistry, node: &WorkflowNode) -> Vec<ResolvedBinding> {
    collect_refs(node)
        .into_iter()
        .map(|site| {
            let status = registry.revalidate_path(&site.view, &site.path, site.expected.as_ref());
            ResolvedBinding {
                node_id: node.id().to_string(),
                label: site.label,
                path: site.path,
                expected: site.expected,
                status,
            }
        })
        .collect()
}
