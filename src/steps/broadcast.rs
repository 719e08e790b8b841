// ABOUTME: Broadcast step: forwards the payload to multiple steps in parallel
// ABOUTME: Children are keyed by their destination step id

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{Splitter, StepBase};
use crate::engine::error::{EngineError, Result};
use crate::engine::Executor;
use crate::model::{Flow, FlowId, FlowSplit, FlowSplitId, FlowState, SplitIndexType};

/// Clones the payload to one child flow per forward-to step. Children are
/// keyed by their destination step id.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BroadcastStep {
    #[serde(flatten)]
    pub base: StepBase,
    #[serde(rename = "forwardTo")]
    pub forward_to: Vec<String>,
}

impl BroadcastStep {
    pub fn validate(&self) -> Vec<EngineError> {
        if self.forward_to.is_empty() {
            return vec![EngineError::InvalidStep {
                step_id: self.base.id.clone(),
                reason: "broadcast has no forward-to steps".to_string(),
            }];
        }
        Vec::new()
    }
}

#[async_trait]
impl Splitter for BroadcastStep {
    async fn split(&self, _exec: &Executor, flow: &Flow) -> Result<(Vec<Flow>, FlowSplit)> {
        let split_id = FlowSplitId::random();
        let mut splits = flow.splits.clone();
        splits.push(split_id.clone());

        let children: Vec<Flow> = self
            .forward_to
            .iter()
            .map(|destination| Flow {
                id: FlowId::random(),
                run_id: flow.run_id.clone(),
                previous_step_id: Some(self.base.id.clone()),
                next_step_id: Some(destination.clone()),
                state: FlowState::Active,
                message: None,
                content_type: flow.content_type.clone(),
                data: flow.data.clone(),
                splits: splits.clone(),
                split_key: Some(destination.clone()),
                split_index: None,
            })
            .collect();

        let split = FlowSplit {
            id: split_id,
            run_id: flow.run_id.clone(),
            split_step_id: self.base.id.clone(),
            parent_flow_id: flow.id.clone(),
            index_type: SplitIndexType::Key,
            flow_ids: children.iter().map(|c| c.id.clone()).collect(),
        };

        Ok((children, split))
    }
}
