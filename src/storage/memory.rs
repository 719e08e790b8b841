// ABOUTME: In-memory storage backend for single-process execution
// ABOUTME: Mutex-guarded maps with counters packed into a single i64

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Mutex, RwLock};
use tracing::debug;

use super::{Result, Storage, FLOW_PREFIX, RUN_PREFIX, SPLIT_PREFIX};
use crate::model::{DataflowRun, Flow, FlowId, FlowSplit, FlowSplitId, RunId};

// Error count lives in the high 32 bits of the packed counter.
const ERR_UNIT: i64 = 1 << 32;
const LOW_MASK: i64 = ERR_UNIT - 1;

/// Storage backend holding everything in process memory.
#[derive(Default)]
pub struct MemoryStorage {
    runs: RwLock<HashMap<String, DataflowRun>>,
    flows: RwLock<HashMap<String, Flow>>,
    splits: RwLock<HashMap<String, FlowSplit>>,
    counters: Mutex<HashMap<String, i64>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of flows currently stored. Used by diagnostics and tests.
    pub fn flow_count(&self) -> usize {
        self.flows.read().unwrap().len()
    }

    /// Flows currently stored, in no particular order.
    pub fn all_flows(&self) -> Vec<Flow> {
        self.flows.read().unwrap().values().cloned().collect()
    }

    /// Number of live counters. Used by tests to check garbage collection.
    pub fn counter_count(&self) -> usize {
        self.counters.lock().unwrap().len()
    }

    pub fn split_count(&self) -> usize {
        self.splits.read().unwrap().len()
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn store_run(&self, run: &DataflowRun) -> Result<()> {
        self.runs
            .write()
            .unwrap()
            .insert(format!("{}{}", RUN_PREFIX, run.id), run.clone());
        Ok(())
    }

    async fn retrieve_runs(&self, keys: &[RunId]) -> HashMap<RunId, DataflowRun> {
        let runs = self.runs.read().unwrap();
        keys.iter()
            .filter_map(|key| {
                runs.get(&format!("{}{}", RUN_PREFIX, key))
                    .map(|run| (key.clone(), run.clone()))
            })
            .collect()
    }

    async fn delete_run(&self, key: &RunId) -> Result<()> {
        self.runs
            .write()
            .unwrap()
            .remove(&format!("{}{}", RUN_PREFIX, key));
        Ok(())
    }

    async fn store_flow(&self, flow: &Flow) -> Result<()> {
        self.flows
            .write()
            .unwrap()
            .insert(format!("{}{}", FLOW_PREFIX, flow.id), flow.clone());
        Ok(())
    }

    async fn retrieve_flows(&self, keys: &[FlowId]) -> HashMap<FlowId, Flow> {
        let flows = self.flows.read().unwrap();
        keys.iter()
            .filter_map(|key| {
                flows
                    .get(&format!("{}{}", FLOW_PREFIX, key))
                    .map(|flow| (key.clone(), flow.clone()))
            })
            .collect()
    }

    async fn delete_flow(&self, key: &FlowId) -> Result<()> {
        self.flows
            .write()
            .unwrap()
            .remove(&format!("{}{}", FLOW_PREFIX, key));
        Ok(())
    }

    async fn store_flow_split(&self, split: &FlowSplit) -> Result<()> {
        self.splits
            .write()
            .unwrap()
            .insert(format!("{}{}", SPLIT_PREFIX, split.id), split.clone());
        Ok(())
    }

    async fn retrieve_flow_splits(
        &self,
        keys: &[FlowSplitId],
    ) -> HashMap<FlowSplitId, FlowSplit> {
        let splits = self.splits.read().unwrap();
        keys.iter()
            .filter_map(|key| {
                splits
                    .get(&format!("{}{}", SPLIT_PREFIX, key))
                    .map(|split| (key.clone(), split.clone()))
            })
            .collect()
    }

    async fn delete_flow_split(&self, key: &FlowSplitId) -> Result<()> {
        self.splits
            .write()
            .unwrap()
            .remove(&format!("{}{}", SPLIT_PREFIX, key));
        Ok(())
    }

    async fn increment_with_error(&self, key: &str, incr: i64, err_incr: i64) -> (i64, i64) {
        let packed = incr + ERR_UNIT * err_incr;
        let mut counters = self.counters.lock().unwrap();
        let entry = counters.entry(key.to_string()).or_insert(0);
        *entry += packed;
        let value = *entry;
        debug!(key, count = value & LOW_MASK, errors = value / ERR_UNIT, "counter incremented");
        (value & LOW_MASK, value / ERR_UNIT)
    }

    async fn delete_counter(&self, key: &str) -> Result<()> {
        self.counters.lock().unwrap().remove(key);
        Ok(())
    }
}
