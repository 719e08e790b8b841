// ABOUTME: In-memory flow queue backed by a bounded channel and worker tasks
// ABOUTME: Workers share one receiver and invoke the registered handler

use async_trait::async_trait;
use std::sync::{Arc, Mutex, RwLock};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use super::{DequeueHandler, DrainHandle, FlowQueue, QueueError, Result};
use crate::model::Flow;

type SharedReceiver = Arc<tokio::sync::Mutex<mpsc::Receiver<Flow>>>;
type SharedHandler = Arc<RwLock<Option<DequeueHandler>>>;

/// Queue running a fixed pool of workers over a bounded tokio channel.
pub struct MemoryQueue {
    sender: Mutex<Option<mpsc::Sender<Flow>>>,
    handler: SharedHandler,
    workers: Mutex<Vec<JoinHandle<()>>>,
    cancel: CancellationToken,
}

impl MemoryQueue {
    /// Start a queue with its own cancellation scope.
    pub fn new(num_workers: usize) -> Self {
        Self::with_cancellation(num_workers, CancellationToken::new())
    }

    /// Start a queue whose workers abort when `cancel` fires.
    pub fn with_cancellation(num_workers: usize, cancel: CancellationToken) -> Self {
        let num_workers = num_workers.max(1);
        let (sender, receiver) = mpsc::channel(num_workers * 16);
        let receiver: SharedReceiver = Arc::new(tokio::sync::Mutex::new(receiver));
        let handler: SharedHandler = Arc::new(RwLock::new(None));

        let mut workers = Vec::with_capacity(num_workers);
        for worker_id in 0..num_workers {
            workers.push(tokio::spawn(Self::worker(
                worker_id,
                Arc::clone(&receiver),
                Arc::clone(&handler),
                cancel.clone(),
            )));
        }
        debug!("started memory queue with {} workers", num_workers);

        Self {
            sender: Mutex::new(Some(sender)),
            handler,
            workers: Mutex::new(workers),
            cancel,
        }
    }

    async fn worker(
        worker_id: usize,
        receiver: SharedReceiver,
        handler: SharedHandler,
        cancel: CancellationToken,
    ) {
        info!("worker {}: starting", worker_id);
        loop {
            let flow = {
                let mut rx = receiver.lock().await;
                tokio::select! {
                    _ = cancel.cancelled() => None,
                    flow = rx.recv() => flow,
                }
            };
            let Some(flow) = flow else { break };

            debug!("worker {}: dequeued flow {}", worker_id, flow);
            let callback = { handler.read().unwrap().clone() };
            match callback {
                Some(callback) => callback(flow).await,
                None => error!("worker {}: no handler for dequeued flow {}", worker_id, flow),
            }
        }
        info!("worker {}: exiting", worker_id);
    }
}

#[async_trait]
impl FlowQueue for MemoryQueue {
    fn set_dequeue_handler(&self, handler: DequeueHandler) {
        *self.handler.write().unwrap() = Some(handler);
        debug!("dequeue handler registered");
    }

    async fn enqueue(&self, flow: Flow) -> Result<()> {
        let sender = {
            let guard = self.sender.lock().unwrap();
            guard.clone()
        };
        let sender = sender.ok_or(QueueError::Stopped)?;
        sender.send(flow).await.map_err(|_| QueueError::Stopped)
    }

    fn stop(&self) -> Result<DrainHandle> {
        info!("stopping memory queue");
        let sender = self.sender.lock().unwrap().take();
        if sender.is_none() {
            return Err(QueueError::AlreadyStopped);
        }
        drop(sender);

        let workers = std::mem::take(&mut *self.workers.lock().unwrap());
        Ok(DrainHandle::new(workers))
    }
}
