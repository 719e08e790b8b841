// ABOUTME: Conditional step: interrupts the flow when an expression is falsey
// ABOUTME: Variables in the expression are path lookups into the payload

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::info;

use super::{Doer, StepBase};
use crate::engine::error::{EngineError, Result};
use crate::engine::Executor;
use crate::expr::Condition;
use crate::model::{Flow, FlowState};

/// Evaluates a boolean expression against the JSON payload. A falsey result
/// (null, false, zero, empty string) marks the flow interrupted; the advance
/// pipeline decides what that means for the run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConditionalStep {
    #[serde(flatten)]
    pub base: StepBase,
    pub condition: String,
}

impl ConditionalStep {
    pub fn validate(&self) -> Vec<EngineError> {
        if let Err(e) = Condition::compile(&self.condition) {
            return vec![EngineError::InvalidStep {
                step_id: self.base.id.clone(),
                reason: e.to_string(),
            }];
        }
        Vec::new()
    }
}

#[async_trait]
impl Doer for ConditionalStep {
    async fn run(&self, _exec: &Executor, flow: &mut Flow) -> Result<()> {
        let payload = flow.data.as_json()?;
        let condition = Condition::compile(&self.condition)?;
        let result = condition.evaluate(&payload)?;

        if result.is_falsey() {
            info!(
                "condition '{}' evaluated falsey; interrupting flow {}",
                self.condition, flow.id
            );
            flow.state = FlowState::Interrupted;
        } else {
            info!("condition '{}' evaluated truthy; flow continues", self.condition);
        }

        Ok(())
    }
}
