// ABOUTME: Workflow graph definition, JSON codec, and run lifecycle types
// ABOUTME: Dataflow resolves step ids to arena indices at decode time

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use super::error::{ModelError, Result};
use super::flow::RunId;
use crate::steps::Step;

/// A workflow: a directed graph of steps with a designated start.
///
/// Steps are referenced by string id. Ids are resolved to indices into the
/// owning `steps` array when the graph is decoded, so the runtime never
/// chases references at dispatch time.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Dataflow {
    #[serde(default)]
    pub id: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    pub steps: Vec<Step>,
    #[serde(rename = "startAt")]
    pub start_at: String,
    #[serde(skip)]
    index: HashMap<String, usize>,
}

impl Dataflow {
    /// Decode a dataflow from a JSON string, resolving all step references.
    pub fn from_json(content: &str) -> Result<Self> {
        let mut dataflow: Dataflow = serde_json::from_str(content)?;
        dataflow.resolve()?;
        Ok(dataflow)
    }

    /// Decode a dataflow from a JSON file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_json(&content)
    }

    /// Encode the dataflow back to JSON.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Build the id index and check that every referenced step id resolves.
    pub fn resolve(&mut self) -> Result<()> {
        if self.steps.is_empty() {
            return Err(ModelError::EmptyDataflow);
        }

        let mut index = HashMap::with_capacity(self.steps.len());
        for (i, step) in self.steps.iter().enumerate() {
            if index.insert(step.id().to_string(), i).is_some() {
                return Err(ModelError::DuplicateStep {
                    id: step.id().to_string(),
                });
            }
        }

        if !index.contains_key(&self.start_at) {
            return Err(ModelError::UnresolvedStart {
                id: self.start_at.clone(),
            });
        }

        for step in &self.steps {
            for target in step.referenced_ids() {
                if !index.contains_key(target) {
                    return Err(ModelError::UnresolvedStep {
                        id: target.to_string(),
                        referrer: step.id().to_string(),
                    });
                }
            }
        }

        self.index = index;
        Ok(())
    }

    /// Look up a step by id.
    pub fn step(&self, id: &str) -> Option<&Step> {
        self.index.get(id).map(|i| &self.steps[*i])
    }

    pub fn start_step(&self) -> &Step {
        // resolve() guarantees the start id is present
        self.step(&self.start_at).expect("start step resolved")
    }

    pub fn step_ids(&self) -> impl Iterator<Item = &str> {
        self.steps.iter().map(|s| s.id())
    }
}

/// Lifecycle states of a workflow run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunState {
    New,
    Active,
    Interrupted,
    Completed,
    Error,
}

impl RunState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RunState::Completed | RunState::Error | RunState::Interrupted
        )
    }
}

impl std::fmt::Display for RunState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunState::New => write!(f, "new"),
            RunState::Active => write!(f, "active"),
            RunState::Interrupted => write!(f, "interrupted"),
            RunState::Completed => write!(f, "completed"),
            RunState::Error => write!(f, "error"),
        }
    }
}

/// One execution instance of a dataflow.
#[derive(Debug, Clone)]
pub struct DataflowRun {
    pub id: RunId,
    pub dataflow: Arc<Dataflow>,
    pub state: RunState,
    pub created_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl DataflowRun {
    pub fn new(dataflow: Dataflow) -> Self {
        Self {
            id: RunId::random(),
            dataflow: Arc::new(dataflow),
            state: RunState::New,
            created_at: Utc::now(),
            finished_at: None,
        }
    }
}
