// ABOUTME: Core workflow data model: graphs, runs, flows and splits
// ABOUTME: Exports the model types and the JSON codec entry points

pub mod dataflow;
pub mod error;
pub mod flow;

pub use dataflow::{Dataflow, DataflowRun, RunState};
pub use error::{ModelError, Result};
pub use flow::{Flow, FlowData, FlowId, FlowSplit, FlowSplitId, FlowState, RunId, SplitIndexType};
