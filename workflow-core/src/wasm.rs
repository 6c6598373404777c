//! WASM entry points for browser use.
//!
//! Each call takes the serialized graph document and returns plain JS
//! values; nothing is kept between calls.

use std::sync::Arc;

use wasm_bindgen::prelude::*;

use crate::config::EditorConfig;
use crate::document::{self, GraphDocument};
use crate::error::{EditError, ValidationIssue};
use crate::external::ConfigDiff;
use crate::schema::palette;
use crate::validate;
use crate::variable::VariableRegistry;

/// Full scan of a document JSON. Returns an array of issues.
#[wasm_bindgen]
pub fn validate_document(json: &str) -> JsValue {
    let result: Vec<IssueDto> = match registry(json) {
        Ok(mut registry) => validate::validate_document(&mut registry)
            .into_iter()
            .map(IssueDto::from)
            .collect(),
        Err(err) => vec![IssueDto::parse_error("document", &err)],
    };
    to_js(&result)
}

/// Issues of one node of a document JSON.
#[wasm_bindgen]
pub fn validate_node(json: &str, node_id: &str) -> JsValue {
    let result: Vec<IssueDto> = match registry(json) {
        Ok(mut registry) => validate::validate_node(&mut registry, node_id)
            .into_iter()
            .map(IssueDto::from)
            .collect(),
        Err(err) => vec![IssueDto::parse_error("document", &err)],
    };
    to_js(&result)
}

/// Variables `node_id` may refer to, grouped by owner.
#[wasm_bindgen]
pub fn resolvable_variables(json: &str, node_id: &str) -> JsValue {
    match registry(json) {
        Ok(mut registry) => to_js(&registry.resolvable_variables(node_id)),
        Err(_) => JsValue::NULL,
    }
}

/// Publish verdict for a document JSON under an editor config JSON
/// (empty string for defaults).
#[wasm_bindgen]
pub fn check_publish(json: &str, config_json: &str) -> JsValue {
    let config = if config_json.trim().is_empty() {
        Ok(EditorConfig::default())
    } else {
        EditorConfig::from_json(config_json)
    };
    let result = match (registry(json), config) {
        (Ok(mut registry), Ok(config)) => PublishDto::Checked {
            verdict: validate::check_publish(&mut registry, &config),
        },
        (Err(err), _) => PublishDto::Failed {
            errors: vec![IssueDto::parse_error("document", &err)],
        },
        (_, Err(err)) => PublishDto::Failed {
            errors: vec![IssueDto::parse_error("config", &err)],
        },
    };
    to_js(&result)
}

/// Difference between the last published document and the draft.
#[wasm_bindgen]
pub fn config_diff(published_json: &str, draft_json: &str) -> JsValue {
    match (document::parse(published_json), document::parse(draft_json)) {
        (Ok(published), Ok(draft)) => to_js(&ConfigDiff::between(&published, &draft)),
        _ => JsValue::NULL,
    }
}

/// Node types offered in the add-node menu.
#[wasm_bindgen]
pub fn node_palette() -> JsValue {
    to_js(&palette())
}

fn registry(json: &str) -> Result<VariableRegistry, EditError> {
    let doc: GraphDocument = document::parse(json)?;
    Ok(VariableRegistry::new(Arc::new(doc)))
}

fn to_js<T: serde::Serialize>(value: &T) -> JsValue {
    serde_wasm_bindgen::to_value(value).unwrap_or(JsValue::NULL)
}

// ---------------------------------------------------------------------------
// DTOs for serialization to JS
// ---------------------------------------------------------------------------

#[derive(serde::Serialize)]
struct IssueDto {
    code: String,
    kind: String,
    label: String,
    message: String,
    node_id: Option<String>,
}

impl IssueDto {
    fn parse_error(label: &str, err: &EditError) -> Self {
        IssueDto {
            code: "P001".into(),
            kind: "InvalidValue".into(),
            label: label.into(),
            message: format!("Failed to parse {} JSON: {}", label, err),
            node_id: None,
        }
    }
}

impl From<ValidationIssue> for IssueDto {
    fn from(issue: ValidationIssue) -> Self {
        IssueDto {
            code: issue.code,
            kind: issue.kind.to_string(),
            label: issue.label,
            message: issue.message,
            node_id: issue.node_id,
        }
    }
}

#[derive(serde::Serialize)]
#[serde(tag = "status")]
enum PublishDto {
    #[serde(rename = "checked")]
    Checked { verdict: validate::PublishVerdict },
    #[serde(rename = "errors")]
    Failed { errors: Vec<IssueDto> },
}
