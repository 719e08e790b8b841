// ABOUTME: Error types for the workflow model and JSON codec
// ABOUTME: Covers decode failures and unresolved step references

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ModelError {
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("dataflow has no steps")]
    EmptyDataflow,

    #[error("duplicate step id: {id}")]
    DuplicateStep { id: String },

    #[error("step id {id} referenced by {referrer} not found in dataflow")]
    UnresolvedStep { id: String, referrer: String },

    #[error("start step id {id} not found in dataflow")]
    UnresolvedStart { id: String },

    #[error("flow payload is empty")]
    EmptyPayload,

    #[error("flow payload is not valid JSON: {0}")]
    PayloadNotJson(String),

    #[error("flow has no split ancestry")]
    NotSplit,
}

pub type Result<T> = std::result::Result<T, ModelError>;
