//! Value-type lattice for workflow variables.

pub mod operator;
pub mod value_type;

pub use operator::Operator;
pub use value_type::{is_assignable, ValueType};
