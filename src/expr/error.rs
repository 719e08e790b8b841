// ABOUTME: Error types for path and condition expression handling
// ABOUTME: Split between compile-time parse errors and evaluation errors

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ExprError {
    #[error("invalid path expression '{path}': {reason}")]
    InvalidPath { path: String, reason: String },

    #[error("path '{path}' not found in payload")]
    PathNotFound { path: String },

    #[error("invalid condition '{condition}': {reason}")]
    InvalidCondition { condition: String, reason: String },

    #[error("condition evaluation failed: {0}")]
    Eval(String),
}

pub type Result<T> = std::result::Result<T, ExprError>;
