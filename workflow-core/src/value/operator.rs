//! Comparison operators offered by condition editors and their evaluation.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::ValueType;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Operator {
    Equals,
    NotEquals,
    IsNull,
    IsNotNull,
    Greater,
    GreaterAndEqual,
    Less,
    LessAndEqual,
    LengthEquals,
    LengthGreater,
    LengthGreaterAndEqual,
    LengthLess,
    LengthLessAndEqual,
    Contains,
    NotContains,
    IsTrue,
    IsFalse,
}

impl Operator {
    pub fn as_str(self) -> &'static str {
        match self {
            Operator::Equals => "equals",
            Operator::NotEquals => "notEquals",
            Operator::IsNull => "isNull",
            Operator::IsNotNull => "isNotNull",
            Operator::Greater => "greater",
            Operator::GreaterAndEqual => "greaterAndEqual",
            Operator::Less => "less",
            Operator::LessAndEqual => "lessAndEqual",
            Operator::LengthEquals => "lengthEquals",
            Operator::LengthGreater => "lengthGreater",
            Operator::LengthGreaterAndEqual => "lengthGreaterAndEqual",
            Operator::LengthLess => "lengthLess",
            Operator::LengthLessAndEqual => "lengthLessAndEqual",
            Operator::Contains => "contains",
            Operator::NotContains => "notContains",
            Operator::IsTrue => "isTrue",
            Operator::IsFalse => "isFalse",
        }
    }

    /// Whether this operator is offered for a left operand of type `ty`.
    pub fn applies_to(self, ty: &ValueType) -> bool {
        use Operator::*;
        match ty {
            ValueType::String => matches!(
                self,
                Equals
                    | NotEquals
                    | IsNull
                    | IsNotNull
                    | LengthEquals
                    | LengthGreater
                    | LengthGreaterAndEqual
                    | LengthLess
                    | LengthLessAndEqual
                    | Contains
                    | NotContains
            ),
            ValueType::Number => matches!(
                self,
                Equals
                    | NotEquals
                    | IsNull
                    | IsNotNull
                    | Greater
                    | GreaterAndEqual
                    | Less
                    | LessAndEqual
            ),
            ValueType::Boolean => {
                matches!(self, Equals | NotEquals | IsNull | IsNotNull | IsTrue | IsFalse)
            }
            ValueType::File => matches!(self, IsNull | IsNotNull),
            ValueType::Object => matches!(self, IsNull | IsNotNull | Contains | NotContains),
            ValueType::Array(_) => matches!(
                self,
                IsNull
                    | IsNotNull
                    | LengthEquals
                    | LengthGreater
                    | LengthGreaterAndEqual
                    | LengthLess
                    | LengthLessAndEqual
                    | Contains
                    | NotContains
            ),
        }
    }

    /// Unary operators take no right operand.
    pub fn is_unary(self) -> bool {
        matches!(
            self,
            Operator::IsNull | Operator::IsNotNull | Operator::IsTrue | Operator::IsFalse
        )
    }

    /// Type the right operand must have for a left operand of type `left`.
    pub fn right_operand_type(self, left: &ValueType) -> Option<ValueType> {
        use Operator::*;
        match self {
            IsNull | IsNotNull | IsTrue | IsFalse => None,
            LengthEquals | LengthGreater | LengthGreaterAndEqual | LengthLess
            | LengthLessAndEqual => Some(ValueType::Number),
            Contains | NotContains => match left {
                ValueType::Array(inner) => Some((**inner).clone()),
                _ => Some(ValueType::String),
            },
            Equals | NotEquals | Greater | GreaterAndEqual | Less | LessAndEqual => {
                Some(left.clone())
            }
        }
    }

    /// Evaluate against concrete values. `Null`/missing actual values only
    /// satisfy `isNull` and the negated operators.
    pub fn evaluate(self, actual: &Value, expected: Option<&Value>) -> bool {
        use Operator::*;
        let expected = expected.unwrap_or(&Value::Null);
        match self {
            IsNull => is_null(actual),
            IsNotNull => !is_null(actual),
            IsTrue => actual.as_bool() == Some(true),
            IsFalse => actual.as_bool() == Some(false),
            Equals => loose_equal(actual, expected),
            NotEquals => !loose_equal(actual, expected),
            Greater => compare_numbers(actual, expected, |a, b| a > b),
            GreaterAndEqual => compare_numbers(actual, expected, |a, b| a >= b),
            Less => compare_numbers(actual, expected, |a, b| a < b),
            LessAndEqual => compare_numbers(actual, expected, |a, b| a <= b),
            LengthEquals => compare_length(actual, expected, |a, b| a == b),
            LengthGreater => compare_length(actual, expected, |a, b| a > b),
            LengthGreaterAndEqual => compare_length(actual, expected, |a, b| a >= b),
            LengthLess => compare_length(actual, expected, |a, b| a < b),
            LengthLessAndEqual => compare_length(actual, expected, |a, b| a <= b),
            Contains => contains(actual, expected),
            NotContains => !is_null(actual) && !contains(actual, expected),
        }
    }
}

fn is_null(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        Value::Array(arr) => arr.is_empty(),
        Value::Object(obj) => obj.is_empty(),
        _ => false,
    }
}

fn as_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn loose_equal(actual: &Value, expected: &Value) -> bool {
    match (actual, expected) {
        (Value::Number(_), _) | (_, Value::Number(_)) => match (as_f64(actual), as_f64(expected)) {
            (Some(a), Some(b)) => (a - b).abs() < f64::EPSILON,
            _ => false,
        },
        (Value::Bool(b), Value::String(s)) | (Value::String(s), Value::Bool(b)) => {
            match s.as_str() {
                "true" => *b,
                "false" => !*b,
                _ => false,
            }
        }
        _ => actual == expected,
    }
}

fn compare_numbers(actual: &Value, expected: &Value, cmp: fn(f64, f64) -> bool) -> bool {
    match (as_f64(actual), as_f64(expected)) {
        (Some(a), Some(b)) => cmp(a, b),
        _ => false,
    }
}

fn length_of(value: &Value) -> Option<usize> {
    match value {
        Value::String(s) => Some(s.chars().count()),
        Value::Array(arr) => Some(arr.len()),
        _ => None,
    }
}

fn compare_length(actual: &Value, expected: &Value, cmp: fn(f64, f64) -> bool) -> bool {
    match (length_of(actual), as_f64(expected)) {
        (Some(len), Some(b)) => cmp(len as f64, b),
        _ => false,
    }
}

fn contains(actual: &Value, expected: &Value) -> bool {
    match (actual, expected) {
        (Value::String(s), Value::String(t)) => s.contains(t.as_str()),
        (Value::Array(arr), target) => arr.iter().any(|item| loose_equal(item, target)),
        (Value::Object(obj), Value::String(key)) => obj.contains_key(key),
        _ => false,
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn operator_sets_follow_operand_type() {
        assert!(Operator::Greater.applies_to(&ValueType::Number));
        assert!(!Operator::Greater.applies_to(&ValueType::String));
        assert!(Operator::IsTrue.applies_to(&ValueType::Boolean));
        assert!(!Operator::Contains.applies_to(&ValueType::File));
        assert!(Operator::LengthLess.applies_to(&ValueType::array_of(ValueType::Object)));
    }

    #[test]
    fn contains_on_array_expects_element_type() {
        let left = ValueType::array_of(ValueType::Number);
        assert_eq!(Operator::Contains.right_operand_type(&left), Some(ValueType::Number));
        assert_eq!(Operator::LengthEquals.right_operand_type(&left), Some(ValueType::Number));
        assert_eq!(Operator::IsNull.right_operand_type(&left), None);
    }

    #[test]
    fn evaluates_numbers_across_string_encoding() {
        assert!(Operator::Equals.evaluate(&json!(3), Some(&json!("3"))));
        assert!(Operator::Greater.evaluate(&json!(5), Some(&json!(2))));
        assert!(!Operator::Less.evaluate(&json!("abc"), Some(&json!(2))));
    }

    #[test]
    fn evaluates_length_and_membership() {
        assert!(Operator::LengthGreater.evaluate(&json!([1, 2, 3]), Some(&json!(2))));
        assert!(Operator::Contains.evaluate(&json!(["a", "b"]), Some(&json!("b"))));
        assert!(Operator::NotContains.evaluate(&json!("hello"), Some(&json!("z"))));
        assert!(!Operator::NotContains.evaluate(&Value::Null, Some(&json!("z"))));
    }

    #[test]
    fn empty_values_count_as_null() {
        assert!(Operator::IsNull.evaluate(&json!(""), None));
        assert!(Operator::IsNull.evaluate(&json!([]), None));
        assert!(Operator::IsNotNull.evaluate(&json!(false), None));
    }
}
