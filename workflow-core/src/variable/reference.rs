//! `${node.key}` variable paths as stored in references and text templates.

use std::fmt;

/// Owner id of app-level variables (`${global.<key>}`).
pub const GLOBAL_NODE: &str = "global";
/// Owner id of built-in session variables (`${sys.query}`).
pub const SYS_NODE: &str = "sys";

/// A parsed variable address: owner node, output key and optional nested
/// fields into `Object` properties.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VarPath {
    pub node_id: String,
    pub key: String,
    pub fields: Vec<String>,
}

impl VarPath {
    pub fn new(node_id: impl Into<String>, key: impl Into<String>) -> Self {
        VarPath {
            node_id: node_id.into(),
            key: key.into(),
            fields: Vec::new(),
        }
    }

    /// Parse `${node.key[.field...]}`. Surrounding whitespace is allowed,
    /// anything else around the placeholder is not.
    pub fn parse(s: &str) -> Option<Self> {
        let inner = s.trim().strip_prefix("${")?.strip_suffix('}')?;
        Self::parse_inner(inner)
    }

    fn parse_inner(inner: &str) -> Option<Self> {
        let mut parts = inner.split('.').map(str::trim);
        let node_id = parts.next().filter(|p| !p.is_empty())?;
        let key = parts.next().filter(|p| !p.is_empty())?;
        let fields: Vec<String> = parts.map(String::from).collect();
        if fields.iter().any(|f| f.is_empty()) {
            return None;
        }
        Some(VarPath {
            node_id: node_id.to_string(),
            key: key.to_string(),
            fields,
        })
    }

    pub fn is_global(&self) -> bool {
        self.node_id == GLOBAL_NODE
    }

    pub fn is_sys(&self) -> bool {
        self.node_id == SYS_NODE
    }
}

impl fmt::Display for VarPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "${{{}.{}", self.node_id, self.key)?;
        for field in &self.fields {
            write!(f, ".{}", field)?;
        }
        f.write_str("}")
    }
}

/// Every well-formed placeholder in `text`, in order of first appearance.
pub fn template_refs(text: &str) -> Vec<VarPath> {
    let mut out: Vec<VarPath> = Vec::new();
    let mut rest = text;
    while let Some(start) = rest.find("${") {
        let after = &rest[start + 2..];
        let Some(end) = after.find('}') else { break };
        if let Some(path) = VarPath::parse_inner(&after[..end]) {
            if !out.contains(&path) {
                out.push(path);
            }
        }
        rest = &after[end + 1..];
    }
    out
}
