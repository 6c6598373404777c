//! Per-node exception strategy and its edge bookkeeping.

use tracing::debug;

use crate::document::*;
use crate::error::{EditError, StructuralError};
use crate::graph::{fail_handle, ops::remove_edges_by_handle};

/// Switch a node's error strategy. Leaving `failBranch` removes the node's
/// `<id>_fail` edge; entering `defaultValue` creates one default entry per
/// declared output. Entering `failBranch` leaves edge creation to the caller.
pub fn set_strategy(
    doc: &mut GraphDocument,
    node_id: &str,
    strategy: ErrorStrategy,
) -> Result<Vec<WorkflowEdge>, EditError> {
    let node = doc
        .node_mut(node_id)
        .ok_or_else(|| StructuralError::UnknownNode(node_id.to_string()))?;
    let node_type = node.node_type();
    let Some(config) = node.try_catch_mut() else {
        return Err(EditError::unsupported(format!("{} nodes have no error handling", node_type)));
    };

    let previous = config.strategy;
    config.strategy = strategy;
    if strategy != ErrorStrategy::DefaultValue {
        config.default_values = None;
    }
    sync_default_values(node);

    let removed = if previous == ErrorStrategy::FailBranch && strategy != ErrorStrategy::FailBranch {
        remove_edges_by_handle(doc, node_id, &fail_handle(node_id))
    } else {
        Vec::new()
    };
    debug!(node_id, ?previous, ?strategy, removed_edges = removed.len(), "error strategy changed");
    Ok(removed)
}

/// Keep default-value entries aligned with the node's outputs: one entry
/// per output key, existing values kept, entries for removed keys dropped.
/// No-op unless the strategy is `defaultValue`.
pub fn sync_default_values(node: &mut WorkflowNode) {
    let outputs: Vec<(String, crate::value::ValueType)> = node
        .output_params()
        .iter()
        .map(|d| (d.key.clone(), d.value_type.clone()))
        .collect();
    let Some(config) = node.try_catch_mut() else { return };
    if config.strategy != ErrorStrategy::DefaultValue {
        return;
    }

    let previous = config.default_values.take().unwrap_or_default();
    let synced = outputs
        .into_iter()
        .map(|(key, value_type)| {
            let value = previous
                .iter()
                .find(|d| d.key == key && d.value_type == value_type)
                .and_then(|d| d.value.clone());
            DefaultValue { key, value_type, value }
        })
        .collect();
    config.default_values = Some(synced);
}

/// Nodes whose strategy is `failBranch` but that have no fail edge yet.
pub fn missing_fail_edges(doc: &GraphDocument) -> Vec<&str> {
    doc.nodes
        .iter()
        .filter(|n| n.try_catch().is_some_and(|tc| tc.strategy == ErrorStrategy::FailBranch))
        .filter(|n| {
            let handle = fail_handle(n.id());
            !doc
                .edges_from(n.id())
                .any(|e| e.source_handle.as_deref() == Some(handle.as_str()))
        })
        .map(|n| n.id())
        .collect()
}
