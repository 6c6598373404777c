//! `ValueType` and the assignability rule used by reference validation.
//!
//! Types serialize as the strings the editor stores in the document:
//! `String`, `Number`, `Boolean`, `File`, `Object`, `Array<T>`.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ValueType {
    String,
    Number,
    Boolean,
    File,
    Object,
    Array(Box<ValueType>),
}

impl ValueType {
    pub fn array_of(element: ValueType) -> Self {
        ValueType::Array(Box::new(element))
    }

    pub fn is_array(&self) -> bool {
        matches!(self, ValueType::Array(_))
    }

    /// Element type of an array type, `None` for scalars.
    pub fn element(&self) -> Option<&ValueType> {
        match self {
            ValueType::Array(inner) => Some(inner),
            _ => None,
        }
    }
}

/// Whether a value declared as `from` may be consumed where `to` is expected.
///
/// Only exact matches are assignable. Arrays are invariant in their element
/// type and never convert to or from scalars.
pub fn is_assignable(from: &ValueType, to: &ValueType) -> bool {
    match (from, to) {
        (ValueType::Array(a), ValueType::Array(b)) => a == b,
        (ValueType::Array(_), _) | (_, ValueType::Array(_)) => false,
        (a, b) => a == b,
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValueType::String => write!(f, "String"),
            ValueType::Number => write!(f, "Number"),
            ValueType::Boolean => write!(f, "Boolean"),
            ValueType::File => write!(f, "File"),
            ValueType::Object => write!(f, "Object"),
            ValueType::Array(inner) => write!(f, "Array<{}>", inner),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown value type '{0}'")]
pub struct ParseValueTypeError(pub String);

impl FromStr for ValueType {
    type Err = ParseValueTypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        match trimmed {
            "String" => return Ok(ValueType::String),
            "Number" => return Ok(ValueType::Number),
            "Boolean" => return Ok(ValueType::Boolean),
            "File" => return Ok(ValueType::File),
            "Object" => return Ok(ValueType::Object),
            _ => {}
        }
        let inner = trimmed
            .strip_prefix("Array<")
            .and_then(|rest| rest.strip_suffix('>'))
            .ok_or_else(|| ParseValueTypeError(s.to_string()))?;
        let element = inner
            .parse::<ValueType>()
            .map_err(|_| ParseValueTypeError(s.to_string()))?;
        Ok(ValueType::array_of(element))
    }
}

impl Serialize for ValueType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ValueType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}
