//! Document phase: JSON ⇄ graph document.

pub mod params;
pub mod types;

pub use params::*;
pub use types::*;

use crate::error::EditError;

/// Deserialize a persisted graph document.
pub fn parse(json: &str) -> Result<GraphDocument, EditError> {
    serde_json::from_str::<GraphDocument>(json).map_err(EditError::from)
}

/// Serialize a graph document in the persisted form.
pub fn to_json(doc: &GraphDocument) -> Result<String, EditError> {
    serde_json::to_string(doc).map_err(EditError::from)
}
