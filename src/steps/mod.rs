// ABOUTME: The eight step variants and their Doer/Splitter/Joiner capabilities
// ABOUTME: Steps are an internally tagged enum; dispatch is by variant

pub mod broadcast;
pub mod conditional;
pub mod constant;
pub mod distribute;
pub mod join;
pub mod race;
pub mod select;
pub mod web;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::engine::error::Result;
use crate::engine::Executor;
use crate::model::{Flow, FlowSplit};

pub use broadcast::BroadcastStep;
pub use conditional::ConditionalStep;
pub use constant::ConstantStep;
pub use distribute::DistributeStep;
pub use join::JoinStep;
pub use race::RaceStep;
pub use select::SelectStep;
pub use web::{HttpMethod, WebMethodStep};

/// Attributes shared by every step variant.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StepBase {
    pub id: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    /// Single successor, when the step has one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next: Option<String>,
}

/// Steps that perform an action on the flow's payload.
#[async_trait]
pub trait Doer: Send + Sync {
    async fn run(&self, exec: &Executor, flow: &mut Flow) -> Result<()>;
}

/// Steps that split one flow into child flows. The splitter sets each
/// child's next step; the returned split record lists all children.
#[async_trait]
pub trait Splitter: Send + Sync {
    async fn split(&self, exec: &Executor, flow: &Flow) -> Result<(Vec<Flow>, FlowSplit)>;
}

/// Result of delivering one sibling flow to a joiner.
#[derive(Debug)]
pub enum JoinOutcome {
    /// The sibling was absorbed; the join is not complete yet.
    Pending,
    /// This delivery produced the joined parent flow.
    Joined(Flow),
    /// The join completed but failed; the parent carries the failure upward.
    Failed { parent: Flow, reason: String },
}

/// Steps that merge the siblings of a split back into their parent flow.
#[async_trait]
pub trait Joiner: Send + Sync {
    async fn join(&self, exec: &Executor, flow: &Flow) -> Result<JoinOutcome>;
}

/// A workflow step. The JSON tag selects the variant; each variant declares
/// which capabilities it implements.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum Step {
    Constant(ConstantStep),
    WebMethod(WebMethodStep),
    Select(SelectStep),
    Conditional(ConditionalStep),
    Distribute(DistributeStep),
    Broadcast(BroadcastStep),
    Join(JoinStep),
    Race(RaceStep),
}

impl Step {
    pub fn base(&self) -> &StepBase {
        match self {
            Step::Constant(s) => &s.base,
            Step::WebMethod(s) => &s.base,
            Step::Select(s) => &s.base,
            Step::Conditional(s) => &s.base,
            Step::Distribute(s) => &s.base,
            Step::Broadcast(s) => &s.base,
            Step::Join(s) => &s.base,
            Step::Race(s) => &s.base,
        }
    }

    pub fn id(&self) -> &str {
        &self.base().id
    }

    pub fn next_id(&self) -> Option<&str> {
        self.base().next.as_deref()
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Step::Constant(_) => "constant",
            Step::WebMethod(_) => "web-method",
            Step::Select(_) => "select",
            Step::Conditional(_) => "conditional",
            Step::Distribute(_) => "distribute",
            Step::Broadcast(_) => "broadcast",
            Step::Join(_) => "join",
            Step::Race(_) => "race",
        }
    }

    /// Every step id this step refers to, for decode-time resolution.
    pub fn referenced_ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.next_id().into_iter().collect();
        if let Step::Broadcast(s) = self {
            ids.extend(s.forward_to.iter().map(String::as_str));
        }
        ids
    }

    /// Per-variant structural validation, surfaced from the executor before
    /// any run state is created.
    pub fn validate(&self) -> Vec<crate::engine::error::EngineError> {
        match self {
            Step::Constant(s) => s.validate(),
            Step::WebMethod(s) => s.validate(),
            Step::Select(s) => s.validate(),
            Step::Conditional(s) => s.validate(),
            Step::Broadcast(s) => s.validate(),
            Step::Distribute(_) | Step::Join(_) | Step::Race(_) => Vec::new(),
        }
    }

    pub fn as_doer(&self) -> Option<&dyn Doer> {
        match self {
            Step::Constant(s) => Some(s),
            Step::WebMethod(s) => Some(s),
            Step::Select(s) => Some(s),
            Step::Conditional(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_splitter(&self) -> Option<&dyn Splitter> {
        match self {
            Step::Distribute(s) => Some(s),
            Step::Broadcast(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_joiner(&self) -> Option<&dyn Joiner> {
        match self {
            Step::Join(s) => Some(s),
            Step::Race(s) => Some(s),
            _ => None,
        }
    }

    pub fn is_joiner(&self) -> bool {
        matches!(self, Step::Join(_) | Step::Race(_))
    }
}
