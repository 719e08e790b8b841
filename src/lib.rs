// ABOUTME: Main library module for the tributary dataflow engine
// ABOUTME: Exports all core modules and provides the public API

pub mod cli;
pub mod engine;
pub mod expr;
pub mod model;
pub mod queue;
pub mod steps;
pub mod storage;

// Re-export commonly used types
pub use cli::{App, Args};
pub use engine::{DefaultHttpClientFactory, EngineError, Executor, HttpClientFactory};
pub use model::{Dataflow, DataflowRun, Flow, FlowData, FlowSplit, FlowState, RunState};
pub use queue::{FlowQueue, MemoryQueue};
pub use steps::Step;
pub use storage::{MemoryStorage, Storage};

// Error handling
pub type Result<T> = anyhow::Result<T>;

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
