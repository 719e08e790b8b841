// ABOUTME: Distribute step: splits a JSON array or object into child flows
// ABOUTME: Array elements are indexed numerically, object entries by key

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{Splitter, StepBase};
use crate::engine::error::{EngineError, Result};
use crate::engine::Executor;
use crate::model::{Flow, FlowData, FlowSplit, FlowSplitId, FlowState, SplitIndexType};

/// Splits the payload element-wise: one child per array element (numerical
/// index) or per object entry (key index). Any other payload is an error.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DistributeStep {
    #[serde(flatten)]
    pub base: StepBase,
}

impl DistributeStep {
    fn child(&self, parent: &Flow, splits: &[FlowSplitId], data: Value) -> Flow {
        Flow {
            id: crate::model::FlowId::random(),
            run_id: parent.run_id.clone(),
            previous_step_id: Some(self.base.id.clone()),
            next_step_id: self.base.next.clone(),
            state: FlowState::Active,
            message: None,
            content_type: Some("application/json".to_string()),
            data: FlowData::Json(data),
            splits: splits.to_vec(),
            split_key: None,
            split_index: None,
        }
    }
}

#[async_trait]
impl Splitter for DistributeStep {
    async fn split(&self, _exec: &Executor, flow: &Flow) -> Result<(Vec<Flow>, FlowSplit)> {
        let payload = flow.data.as_json()?;

        let split_id = FlowSplitId::random();
        let mut splits = flow.splits.clone();
        splits.push(split_id.clone());

        let (index_type, children) = match payload {
            Value::Array(items) => {
                let children: Vec<Flow> = items
                    .into_iter()
                    .enumerate()
                    .map(|(i, item)| {
                        let mut child = self.child(flow, &splits, item);
                        child.split_index = Some(i);
                        child
                    })
                    .collect();
                (SplitIndexType::Numerical, children)
            }
            Value::Object(entries) => {
                let children: Vec<Flow> = entries
                    .into_iter()
                    .map(|(key, value)| {
                        let mut child = self.child(flow, &splits, value);
                        child.split_key = Some(key);
                        child
                    })
                    .collect();
                (SplitIndexType::Key, children)
            }
            _ => {
                return Err(EngineError::StepFailed(
                    "distribute payload is not a JSON array or object".to_string(),
                ))
            }
        };

        let split = FlowSplit {
            id: split_id,
            run_id: flow.run_id.clone(),
            split_step_id: self.base.id.clone(),
            parent_flow_id: flow.id.clone(),
            index_type,
            flow_ids: children.iter().map(|c| c.id.clone()).collect(),
        };

        Ok((children, split))
    }
}
