// ABOUTME: Constant step: replaces the flow payload with a configured value
// ABOUTME: The value is a JSON literal fixed in the workflow definition

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use super::{Doer, StepBase};
use crate::engine::error::{EngineError, Result};
use crate::engine::Executor;
use crate::model::{Flow, FlowData};

/// Emits a configured JSON literal as the flow payload.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConstantStep {
    #[serde(flatten)]
    pub base: StepBase,
    pub value: Value,
}

impl ConstantStep {
    pub fn validate(&self) -> Vec<EngineError> {
        if self.value.is_null() {
            return vec![EngineError::InvalidStep {
                step_id: self.base.id.clone(),
                reason: "missing constant value".to_string(),
            }];
        }
        Vec::new()
    }
}

#[async_trait]
impl Doer for ConstantStep {
    async fn run(&self, _exec: &Executor, flow: &mut Flow) -> Result<()> {
        flow.data = FlowData::Json(self.value.clone());
        flow.content_type = Some("application/json".to_string());
        debug!("constant step {} emitted {}", self.base.id, self.value);
        Ok(())
    }
}
