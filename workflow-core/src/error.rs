//! Error and issue types shared by every phase.
//!
//! Two families: `StructuralError` / `EditError` reject a mutation outright
//! and leave the document untouched, while `ValidationIssue` is attached to a
//! node and never blocks editing.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StructuralError {
    #[error("node id '{0}' already exists")]
    DuplicateId(String),

    #[error("invalid edge '{source_id}' -> '{target}': {reason}")]
    InvalidEdge {
        source_id: String,
        target: String,
        reason: String,
    },

    #[error("edge '{source_id}' -> '{target}' would create a cycle")]
    Cycle { source_id: String, target: String },

    #[error("node '{0}' not found")]
    UnknownNode(String),

    #[error("node '{0}' cannot be deleted")]
    NotDeletable(String),

    #[error("'{0}' is not a container scope")]
    InvalidScope(String),
}

impl StructuralError {
    pub fn invalid_edge(source: &str, target: &str, reason: impl Into<String>) -> Self {
        StructuralError::InvalidEdge {
            source_id: source.to_string(),
            target: target.to_string(),
            reason: reason.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum EditError {
    #[error(transparent)]
    Structural(#[from] StructuralError),

    #[error("{field} = {value} is outside [{min}, {max}]")]
    OutOfRange {
        field: String,
        value: f64,
        min: f64,
        max: f64,
    },

    #[error("node '{node_id}' already declares '{key}'")]
    DuplicateKey { node_id: String, key: String },

    #[error("unsupported: {0}")]
    Unsupported(String),

    #[error("no saved app '{0}'")]
    UnknownApp(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl EditError {
    pub fn unsupported(message: impl Into<String>) -> Self {
        EditError::Unsupported(message.into())
    }
}

// =============================================================================
// VALIDATION ISSUES
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IssueKind {
    TargetRemoved,
    TypeMismatch,
    OutOfScope,
    RequiredFieldEmpty,
    InvalidValue,
}

impl IssueKind {
    /// Kinds that always block publishing when found on a reachable node.
    pub fn blocks_publish(self) -> bool {
        matches!(self, IssueKind::TargetRemoved | IssueKind::RequiredFieldEmpty)
    }
}

impl fmt::Display for IssueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            IssueKind::TargetRemoved => "TargetRemoved",
            IssueKind::TypeMismatch => "TypeMismatch",
            IssueKind::OutOfScope => "OutOfScope",
            IssueKind::RequiredFieldEmpty => "RequiredFieldEmpty",
            IssueKind::InvalidValue => "InvalidValue",
        };
        f.write_str(s)
    }
}

/// Non-blocking finding attached to a node (or to the document when
/// `node_id` is `None`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationIssue {
    pub code: String,
    pub kind: IssueKind,
    pub node_id: Option<String>,
    /// Field the issue is displayed next to.
    pub label: String,
    pub message: String,
}

impl ValidationIssue {
    pub fn new(
        code: &str,
        kind: IssueKind,
        node_id: Option<&str>,
        label: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        ValidationIssue {
            code: code.into(),
            kind,
            node_id: node_id.map(String::from),
            label: label.into(),
            message: message.into(),
        }
    }

    pub fn required(code: &str, node_id: &str, label: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(code, IssueKind::RequiredFieldEmpty, Some(node_id), label, message)
    }

    pub fn invalid(code: &str, node_id: &str, label: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(code, IssueKind::InvalidValue, Some(node_id), label, message)
    }

    /// Document-level structural finding.
    pub fn structural(code: &str, node_id: Option<&str>, message: impl Into<String>) -> Self {
        Self::new(code, IssueKind::InvalidValue, node_id, "graph", message)
    }

    pub fn is_structural(&self) -> bool {
        self.code.starts_with('S')
    }
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.node_id {
            Some(id) => write!(
                f,
                "[{}:{}] {}: {} (node '{}')",
                self.code, self.kind, self.label, self.message, id
            ),
            None => write!(f, "[{}:{}] {}: {}", self.code, self.kind, self.label, self.message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn issue_display_includes_node() {
        let issue = ValidationIssue::required("N001", "out", "output", "Output content is required");
        assert_eq!(
            issue.to_string(),
            "[N001:RequiredFieldEmpty] output: Output content is required (node 'out')"
        );
    }

    #[test]
    fn structural_error_wraps_into_edit_error() {
        let err: EditError = StructuralError::DuplicateId("a".into()).into();
        assert_eq!(err.to_string(), "node id 'a' already exists");
    }
}
