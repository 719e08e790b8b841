// ABOUTME: Select step: applies a path expression to the JSON payload
// ABOUTME: The selection replaces the flow payload

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{Doer, StepBase};
use crate::engine::error::{EngineError, Result};
use crate::engine::Executor;
use crate::expr::PathExpr;
use crate::model::{Flow, FlowData};

/// Replaces the payload with the result of a path selection. The payload
/// must be interpretable as JSON.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SelectStep {
    #[serde(flatten)]
    pub base: StepBase,
    pub selector: String,
}

impl SelectStep {
    pub fn validate(&self) -> Vec<EngineError> {
        if let Err(e) = PathExpr::parse(&self.selector) {
            return vec![EngineError::InvalidStep {
                step_id: self.base.id.clone(),
                reason: e.to_string(),
            }];
        }
        Vec::new()
    }
}

#[async_trait]
impl Doer for SelectStep {
    async fn run(&self, _exec: &Executor, flow: &mut Flow) -> Result<()> {
        let payload = flow.data.as_json()?;
        let selector = PathExpr::parse(&self.selector)?;
        let selected = selector.lookup(&payload)?;
        flow.data = FlowData::Json(selected.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_compiles_selector() {
        let step = SelectStep {
            base: StepBase {
                id: "pick".to_string(),
                description: String::new(),
                next: None,
            },
            selector: "$.a[0]".to_string(),
        };
        assert!(step.validate().is_empty());

        let step = SelectStep {
            selector: "not-a-path".to_string(),
            ..step
        };
        assert_eq!(step.validate().len(), 1);

        let step = SelectStep {
            selector: String::new(),
            ..step
        };
        assert_eq!(step.validate().len(), 1);
    }
}
