//! Core of a visual workflow editor: typed variables, a scoped workflow
//! graph, node parameter schemas, branch and error-policy handling, and
//! incremental validation of variable references.

pub mod branch;
pub mod config;
pub mod document;
pub mod editor;
pub mod error;
pub mod error_policy;
pub mod external;
pub mod graph;
pub mod schema;
pub mod validate;
pub mod value;
pub mod variable;
pub mod wasm;

pub use config::{EditorConfig, RangePolicy};
pub use document::GraphDocument;
pub use editor::{ChangeSet, Editor};
pub use error::{EditError, IssueKind, StructuralError, ValidationIssue};
