// ABOUTME: Execution engine module for the tributary dataflow engine
// ABOUTME: Exports the executor core, engine errors and the HTTP factory

pub mod error;
pub mod executor;
pub mod http;

pub use error::{EngineError, Result};
pub use executor::Executor;
pub use http::{DefaultHttpClientFactory, HttpClientFactory};

#[cfg(test)]
pub(crate) use executor::test_support;
