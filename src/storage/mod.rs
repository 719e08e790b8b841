// ABOUTME: Persistence contract for runs, flows, splits and sibling counters
// ABOUTME: Batched retrieval, namespaced keys, and the atomic paired counter

pub mod memory;

use async_trait::async_trait;
use std::collections::HashMap;
use thiserror::Error;

use crate::model::{DataflowRun, Flow, FlowId, FlowSplit, FlowSplitId, RunId};

pub use memory::MemoryStorage;

/// Key prefix for run entries.
pub const RUN_PREFIX: &str = "DataflowRun:";
/// Key prefix for flow entries.
pub const FLOW_PREFIX: &str = "Flow:";
/// Key prefix for flow split entries.
pub const SPLIT_PREFIX: &str = "FlowSplit:";

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("storage backend error: {0}")]
    Backend(String),
}

pub type Result<T> = std::result::Result<T, StorageError>;

/// Persistence for the executor's entities.
///
/// Retrieval is batched and returns a map with missing keys absent. Writes to
/// the same key are serialized by the backend; `increment_with_error` is the
/// only operation that must be strictly atomic across workers: it adds the
/// given increments to the counter pair stored under `key` and returns the
/// pair as of the caller's own increment.
#[async_trait]
pub trait Storage: Send + Sync {
    async fn store_run(&self, run: &DataflowRun) -> Result<()>;
    async fn retrieve_runs(&self, keys: &[RunId]) -> HashMap<RunId, DataflowRun>;
    async fn delete_run(&self, key: &RunId) -> Result<()>;

    async fn store_flow(&self, flow: &Flow) -> Result<()>;
    async fn retrieve_flows(&self, keys: &[FlowId]) -> HashMap<FlowId, Flow>;
    async fn delete_flow(&self, key: &FlowId) -> Result<()>;

    async fn store_flow_split(&self, split: &FlowSplit) -> Result<()>;
    async fn retrieve_flow_splits(&self, keys: &[FlowSplitId])
        -> HashMap<FlowSplitId, FlowSplit>;
    async fn delete_flow_split(&self, key: &FlowSplitId) -> Result<()>;

    /// Atomically add `(incr, err_incr)` to the counter pair under `key` and
    /// return the summed pair. A counter first touched with `(incr, err_incr)`
    /// holds exactly those values.
    async fn increment_with_error(&self, key: &str, incr: i64, err_incr: i64) -> (i64, i64);

    /// Drop a counter. Used when a split's accounting is complete.
    async fn delete_counter(&self, key: &str) -> Result<()>;
}
