// ABOUTME: Join step: awaits all siblings of a split and composes their payloads
// ABOUTME: Also hosts the split/parent lookup helpers shared with Race

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{JoinOutcome, Joiner, StepBase};
use crate::engine::error::{EngineError, Result};
use crate::engine::Executor;
use crate::model::{Flow, FlowData, FlowSplit, FlowState, SplitIndexType};
use crate::storage::Storage as _;

/// Load the most recent split of a flow, which must still be retrievable.
pub(crate) async fn load_last_split(exec: &Executor, flow: &Flow) -> Result<FlowSplit> {
    let split_id = flow.last_split_id()?.clone();
    exec.storage()
        .retrieve_flow_splits(std::slice::from_ref(&split_id))
        .await
        .remove(&split_id)
        .ok_or(EngineError::SplitNotFound { id: split_id })
}

/// Load the parent flow of a split, which must still be retrievable.
pub(crate) async fn load_parent(exec: &Executor, split: &FlowSplit) -> Result<Flow> {
    exec.storage()
        .retrieve_flows(std::slice::from_ref(&split.parent_flow_id))
        .await
        .remove(&split.parent_flow_id)
        .ok_or_else(|| EngineError::FlowNotFound {
            id: split.parent_flow_id.clone(),
        })
}

/// Waits for every sibling of the most recent split, then combines their
/// payloads into one result: an object keyed by split key, or an array
/// ordered by split index. Interrupted siblings are excluded from the
/// composition; errored siblings fail the join instead.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JoinStep {
    #[serde(flatten)]
    pub base: StepBase,
}

#[async_trait]
impl Joiner for JoinStep {
    async fn join(&self, exec: &Executor, flow: &Flow) -> Result<JoinOutcome> {
        let split = load_last_split(exec, flow).await?;

        let err_incr = i64::from(flow.state == FlowState::Error);
        let (finish, errors) = exec
            .storage()
            .increment_with_error(split.id.as_str(), 1, err_incr)
            .await;

        if finish < split.flow_ids.len() as i64 {
            return Ok(JoinOutcome::Pending);
        }

        // last sibling: compose, or surface the failure through the parent
        let siblings = exec.storage().retrieve_flows(&split.flow_ids).await;
        let mut parent = load_parent(exec, &split).await?;

        if siblings.len() == split.flow_ids.len() && errors == 0 {
            let mut members: Vec<Flow> = siblings.into_values().collect();
            let composed = match split.index_type {
                SplitIndexType::Key => {
                    let mut object = serde_json::Map::new();
                    for member in members {
                        if member.state != FlowState::Interrupted {
                            object.insert(
                                member.split_key.clone().unwrap_or_default(),
                                member.data.to_json_value(),
                            );
                        }
                    }
                    Value::Object(object)
                }
                SplitIndexType::Numerical => {
                    members.sort_by_key(|m| m.split_index.unwrap_or(0));
                    Value::Array(
                        members
                            .iter()
                            .filter(|m| m.state != FlowState::Interrupted)
                            .map(|m| m.data.to_json_value())
                            .collect(),
                    )
                }
            };
            parent.data = FlowData::Json(composed);
            parent.content_type = Some("application/json".to_string());
            parent.state = FlowState::Active;
            Ok(JoinOutcome::Joined(parent))
        } else if errors > 0 {
            Ok(JoinOutcome::Failed {
                parent,
                reason: "one or more joined flows finished with errors".to_string(),
            })
        } else {
            Ok(JoinOutcome::Failed {
                parent,
                reason: "retrieved flows did not match the split flow count".to_string(),
            })
        }
    }
}
