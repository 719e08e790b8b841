// ABOUTME: Flow execution tokens, their payloads, and split records
// ABOUTME: Defines Flow, FlowState, FlowData, FlowSplit and the id newtypes

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use super::error::{ModelError, Result};

macro_rules! string_id {
    ($name:ident) => {
        #[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn random() -> Self {
                Self(Uuid::new_v4().to_string())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }
    };
}

string_id!(RunId);
string_id!(FlowId);
string_id!(FlowSplitId);

/// States a flow can be in, with respect to its previous step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FlowState {
    Active,
    /// Flow stopped due to an error; retained in storage for diagnostics.
    Error,
    /// Flow dead-ended.
    Completed,
    /// Flow was split into child flows.
    Split,
    /// Flow was interrupted, e.g. by a conditional.
    Interrupted,
}

impl std::fmt::Display for FlowState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FlowState::Active => write!(f, "active"),
            FlowState::Error => write!(f, "error"),
            FlowState::Completed => write!(f, "completed"),
            FlowState::Split => write!(f, "split"),
            FlowState::Interrupted => write!(f, "interrupted"),
        }
    }
}

/// Index kind used by a split: array position or object key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SplitIndexType {
    Numerical,
    Key,
}

/// The payload a flow carries between steps.
///
/// Byte payloads serialize as base64 so flows stay representable in any
/// JSON-backed store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "lowercase")]
pub enum FlowData {
    Empty,
    Json(Value),
    Text(String),
    Bytes(#[serde(with = "base64_bytes")] Vec<u8>),
}

impl FlowData {
    pub fn is_empty(&self) -> bool {
        matches!(self, FlowData::Empty)
    }

    /// Interpret the payload as JSON, parsing text and byte payloads.
    pub fn as_json(&self) -> Result<Value> {
        match self {
            FlowData::Empty => Err(ModelError::EmptyPayload),
            FlowData::Json(v) => Ok(v.clone()),
            FlowData::Text(s) => {
                serde_json::from_str(s).map_err(|e| ModelError::PayloadNotJson(e.to_string()))
            }
            FlowData::Bytes(b) => {
                serde_json::from_slice(b).map_err(|e| ModelError::PayloadNotJson(e.to_string()))
            }
        }
    }

    /// Convert to a JSON value without parsing: text becomes a JSON string
    /// and bytes become a base64-encoded string.
    pub fn to_json_value(&self) -> Value {
        match self {
            FlowData::Empty => Value::Null,
            FlowData::Json(v) => v.clone(),
            FlowData::Text(s) => Value::String(s.clone()),
            FlowData::Bytes(b) => Value::String(BASE64.encode(b)),
        }
    }
}

mod base64_bytes {
    use base64::engine::general_purpose::STANDARD as BASE64;
    use base64::Engine as _;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], ser: S) -> Result<S::Ok, S::Error> {
        ser.serialize_str(&BASE64.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(de: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(de)?;
        BASE64.decode(encoded).map_err(serde::de::Error::custom)
    }
}

/// An execution token carrying a payload through the graph.
///
/// A run starts with one root flow at the starting step. When a step
/// completes, the flow transitions to the next step. Flows split at
/// Distribute and Broadcast steps and merge at Join and Race steps.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Flow {
    pub id: FlowId,
    pub run_id: RunId,
    #[serde(default)]
    pub previous_step_id: Option<String>,
    #[serde(default)]
    pub next_step_id: Option<String>,
    pub state: FlowState,
    /// When the state is Error, the explanation.
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub content_type: Option<String>,
    pub data: FlowData,
    /// Ancestor splits, outermost first. Empty for the root flow.
    #[serde(default)]
    pub splits: Vec<FlowSplitId>,
    /// Position in the most recent split, when it was keyed.
    #[serde(default)]
    pub split_key: Option<String>,
    /// Position in the most recent split, when it was indexed.
    #[serde(default)]
    pub split_index: Option<usize>,
}

impl Flow {
    /// The root flow of a run, pointed at the start step.
    pub fn root(run_id: RunId, start_step_id: &str) -> Self {
        Self {
            id: FlowId::random(),
            run_id,
            previous_step_id: None,
            next_step_id: Some(start_step_id.to_string()),
            state: FlowState::Active,
            message: None,
            content_type: None,
            data: FlowData::Empty,
            splits: Vec::new(),
            split_key: None,
            split_index: None,
        }
    }

    pub fn is_root(&self) -> bool {
        self.splits.is_empty()
    }

    /// Id of the most recent split this flow belongs to.
    pub fn last_split_id(&self) -> Result<&FlowSplitId> {
        self.splits.last().ok_or(ModelError::NotSplit)
    }
}

impl std::fmt::Display for Flow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{{id: {}, run: {}, prev: {}, next: {}, state: {}}}",
            self.id,
            self.run_id,
            self.previous_step_id.as_deref().unwrap_or("-"),
            self.next_step_id.as_deref().unwrap_or("-"),
            self.state,
        )
    }
}

/// Record of one parent flow being split into children. Immutable once
/// stored; its id keys the sibling-completion counter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowSplit {
    pub id: FlowSplitId,
    pub run_id: RunId,
    /// The Distribute or Broadcast step that performed the split.
    pub split_step_id: String,
    pub parent_flow_id: FlowId,
    pub index_type: SplitIndexType,
    /// The full set of immediate children.
    pub flow_ids: Vec<FlowId>,
}
