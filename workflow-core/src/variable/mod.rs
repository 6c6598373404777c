//! Variable registry: declarations, references and their resolution.

pub mod reference;
pub mod registry;

pub use reference::{template_refs, VarPath, GLOBAL_NODE, SYS_NODE};
pub use registry::{
    GroupKind, RefStatus, ResolvableGroup, StaleReason, VariableEntry, VariableRegistry, View,
};

use std::collections::HashSet;

use tracing::debug;

use crate::document::{GraphDocument, VariableDecl};
use crate::error::{EditError, StructuralError};

/// Replace a node's declared outputs. Keys must be unique within the node.
/// Default-value entries of the node's error policy follow the new set.
pub fn declare_outputs(doc: &mut GraphDocument, node_id: &str, decls: Vec<VariableDecl>) -> Result<(), EditError> {
    let duplicate = {
        let mut seen = HashSet::new();
        decls
            .iter()
            .find(|d| !d.key.is_empty() && !seen.insert(d.key.as_str()))
            .map(|d| d.key.clone())
    };
    if let Some(key) = duplicate {
        return Err(EditError::DuplicateKey {
            node_id: node_id.to_string(),
            key,
        });
    }
    let node = doc
        .node_mut(node_id)
        .ok_or_else(|| StructuralError::UnknownNode(node_id.to_string()))?;
    *node.output_params_mut() = decls;
    crate::error_policy::sync_default_values(node);
    debug!(node_id, outputs = node.output_params().len(), "outputs declared");
    Ok(())
}
