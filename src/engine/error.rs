// ABOUTME: Error types for the execution engine and step implementations
// ABOUTME: Distinguishes validation, step, graph and infrastructure failures

use thiserror::Error;

use crate::model::{FlowId, FlowSplitId, ModelError, RunId};

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("dataflow has no steps")]
    EmptyDataflow,

    #[error("invalid step {step_id}: {reason}")]
    InvalidStep { step_id: String, reason: String },

    #[error("dataflow run {id} not found")]
    RunNotFound { id: RunId },

    #[error("flow {id} not found")]
    FlowNotFound { id: FlowId },

    #[error("flow split {id} not found")]
    SplitNotFound { id: FlowSplitId },

    #[error("step {id} not found in dataflow")]
    StepNotFound { id: String },

    #[error("step {id} does not support execution")]
    NoCapability { id: String },

    #[error("step failed: {0}")]
    StepFailed(String),

    #[error("execution cancelled")]
    Cancelled,

    #[error("model error: {0}")]
    Model(#[from] ModelError),

    #[error("expression error: {0}")]
    Expr(#[from] crate::expr::ExprError),

    #[error("storage error: {0}")]
    Storage(#[from] crate::storage::StorageError),

    #[error("queue error: {0}")]
    Queue(#[from] crate::queue::QueueError),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

pub type Result<T> = std::result::Result<T, EngineError>;
