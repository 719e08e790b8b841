// ABOUTME: FIFO queue contract for flow tokens and the worker drain handle
// ABOUTME: Handlers are registered once; enqueue transfers flow ownership

pub mod memory;

use async_trait::async_trait;
use futures::future::BoxFuture;
use std::sync::Arc;
use thiserror::Error;
use tokio::task::JoinHandle;

use crate::model::Flow;

pub use memory::MemoryQueue;

/// Callback invoked by a worker for each dequeued flow. The handler owns the
/// flow; failures are materialized as flow state, not returned.
pub type DequeueHandler = Arc<dyn Fn(Flow) -> BoxFuture<'static, ()> + Send + Sync>;

#[derive(Error, Debug)]
pub enum QueueError {
    #[error("queue is stopped")]
    Stopped,

    #[error("queue already stopped")]
    AlreadyStopped,

    #[error("no dequeue handler registered")]
    NoHandler,
}

pub type Result<T> = std::result::Result<T, QueueError>;

/// Awaits the exit of all queue workers after a stop.
pub struct DrainHandle {
    workers: Vec<JoinHandle<()>>,
}

impl DrainHandle {
    pub(crate) fn new(workers: Vec<JoinHandle<()>>) -> Self {
        Self { workers }
    }

    /// Resolve once every worker has drained and exited.
    pub async fn wait(self) {
        for worker in self.workers {
            let _ = worker.await;
        }
    }
}

/// A FIFO of flow tokens dispatched to a pool of workers.
#[async_trait]
pub trait FlowQueue: Send + Sync {
    /// Register the per-flow handler. Must be called once, before any enqueue.
    fn set_dequeue_handler(&self, handler: DequeueHandler);

    /// Deliver a flow to some worker eventually. May block while the queue is
    /// full; fails once the queue is stopped.
    async fn enqueue(&self, flow: Flow) -> Result<()>;

    /// Close the intake. Workers drain the remaining tokens and exit; callers
    /// await the returned handle.
    fn stop(&self) -> Result<DrainHandle>;
}
