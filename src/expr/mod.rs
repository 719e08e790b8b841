// ABOUTME: Expression support for steps: path selection and boolean conditions
// ABOUTME: Both compile during validation and evaluate against JSON payloads

pub mod condition;
pub mod error;
pub mod path;

pub use condition::{Condition, ExprValue};
pub use error::{ExprError, Result};
pub use path::PathExpr;
