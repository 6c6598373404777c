//! Editor configuration.

use serde::{Deserialize, Serialize};

use crate::error::EditError;

/// What happens to an out-of-range numeric parameter at input time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RangePolicy {
    #[default]
    Clamp,
    Reject,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EditorConfig {
    /// Document versions retained for undo/redo.
    pub history_limit: usize,
    pub range_policy: RangePolicy,
    /// Refuse publish on any issue of a reachable node.
    pub strict_publish: bool,
}

impl Default for EditorConfig {
    fn default() -> Self {
        EditorConfig {
            history_limit: 50,
            range_policy: RangePolicy::Clamp,
            strict_publish: false,
        }
    }
}

impl EditorConfig {
    pub fn from_json(json: &str) -> Result<Self, EditError> {
        Ok(serde_json::from_str(json)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_fields_fall_back_to_defaults() {
        let config = EditorConfig::from_json(r#"{"range_policy": "reject"}"#).unwrap();
        assert_eq!(config.range_policy, RangePolicy::Reject);
        assert_eq!(config.history_limit, 50);
        assert!(!config.strict_publish);
    }
}
