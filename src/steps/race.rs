// ABOUTME: Race step: forwards the first active sibling, discards the rest
// ABOUTME: Keeps a second counter of active arrivals under <stepId>:<splitId>

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::join::{load_last_split, load_parent};
use super::{JoinOutcome, Joiner, StepBase};
use crate::engine::error::Result;
use crate::engine::Executor;
use crate::model::{Flow, FlowData, FlowState};
use crate::storage::Storage as _;

/// Forwards the payload of the first sibling to arrive in active state.
/// Later siblings are ignored; if no sibling is ever active, the parent is
/// produced interrupted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RaceStep {
    #[serde(flatten)]
    pub base: StepBase,
}

#[async_trait]
impl Joiner for RaceStep {
    async fn join(&self, exec: &Executor, flow: &Flow) -> Result<JoinOutcome> {
        let storage = exec.storage();
        let split = load_last_split(exec, flow).await?;
        let total = split.flow_ids.len() as i64;

        let active_incr = i64::from(flow.state == FlowState::Active);
        let active_key = format!("{}:{}", self.base.id, split.id);
        let (active_count, _) = storage
            .increment_with_error(&active_key, active_incr, 0)
            .await;
        let (finish, _) = storage.increment_with_error(split.id.as_str(), 1, 0).await;

        // the race never composes sibling payloads, so absorbed tokens are
        // dropped as they arrive; errored tokens stay for diagnostics
        if flow.state != FlowState::Error {
            storage.delete_flow(&flow.id).await?;
        }

        // only the first active arrival observes active == 1 with its own
        // increment, so a late winner can never override the decision
        let outcome = if active_count == 1 && active_incr == 1 {
            let mut parent = load_parent(exec, &split).await?;
            debug!("race {} won by flow {}", self.base.id, flow.id);
            parent.data = flow.data.clone();
            parent.content_type = flow.content_type.clone();
            parent.state = FlowState::Active;
            JoinOutcome::Joined(parent)
        } else if active_count == 0 && finish == total {
            let mut parent = load_parent(exec, &split).await?;
            debug!("no flow won race {}; interrupting", self.base.id);
            parent.data = FlowData::Empty;
            parent.content_type = None;
            parent.state = FlowState::Interrupted;
            JoinOutcome::Joined(parent)
        } else {
            JoinOutcome::Pending
        };

        if finish == total {
            // final sibling observed; the race's accounting is complete
            storage.delete_flow_split(&split.id).await?;
            storage.delete_counter(split.id.as_str()).await?;
            storage.delete_counter(&active_key).await?;
        }

        Ok(outcome)
    }
}
