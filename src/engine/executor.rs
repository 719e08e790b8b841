// ABOUTME: The execution engine: run initiation, per-flow dispatch and rollup
// ABOUTME: The rollup's counter protocol decides which sibling propagates upward

use chrono::Utc;
use std::slice;
use std::sync::{Arc, Weak};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::error::{EngineError, Result};
use super::http::HttpClientFactory;
use crate::model::{Dataflow, DataflowRun, Flow, FlowState, RunId, RunState};
use crate::queue::FlowQueue;
use crate::steps::{JoinOutcome, Step};
use crate::storage::Storage;

/// The dataflow execution engine.
///
/// Runs are driven entirely by the queue: `start` enqueues the root flow and
/// every dequeued flow is dispatched through `handle_flow` by a queue worker.
/// There is no central scheduler; completion is decided by the sibling
/// counters of each split.
pub struct Executor {
    http_factory: Arc<dyn HttpClientFactory>,
    storage: Arc<dyn Storage>,
    queue: Arc<dyn FlowQueue>,
    cancel: CancellationToken,
}

impl Executor {
    /// Create the engine and register its handler with the queue.
    pub fn new(
        http_factory: Arc<dyn HttpClientFactory>,
        storage: Arc<dyn Storage>,
        queue: Arc<dyn FlowQueue>,
    ) -> Arc<Self> {
        Self::with_cancellation(http_factory, storage, queue, CancellationToken::new())
    }

    /// Like `new`, with an externally owned cancellation scope. Cancelling the
    /// token makes every subsequently handled flow fail.
    pub fn with_cancellation(
        http_factory: Arc<dyn HttpClientFactory>,
        storage: Arc<dyn Storage>,
        queue: Arc<dyn FlowQueue>,
        cancel: CancellationToken,
    ) -> Arc<Self> {
        let executor = Arc::new(Self {
            http_factory,
            storage,
            queue,
            cancel,
        });

        let weak: Weak<Executor> = Arc::downgrade(&executor);
        executor.queue.set_dequeue_handler(Arc::new(move |flow| {
            let weak = weak.clone();
            Box::pin(async move {
                let Some(executor) = weak.upgrade() else {
                    error!("executor dropped; flow {} discarded", flow);
                    return;
                };
                if let Err(e) = executor.handle_flow(flow).await {
                    error!("flow handling failed: {}", e);
                }
            })
        }));

        executor
    }

    pub fn storage(&self) -> &Arc<dyn Storage> {
        &self.storage
    }

    pub fn http_client_factory(&self) -> &Arc<dyn HttpClientFactory> {
        &self.http_factory
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Structural validation of a dataflow. Pure: creates no state.
    pub fn validate(dataflow: &Dataflow) -> Vec<EngineError> {
        let mut errors = Vec::new();
        if dataflow.steps.is_empty() {
            errors.push(EngineError::EmptyDataflow);
        }
        for step in &dataflow.steps {
            errors.extend(step.validate());
        }
        errors
    }

    /// Validate, persist a fresh run and enqueue its root flow.
    pub async fn start(
        &self,
        dataflow: Dataflow,
    ) -> std::result::Result<DataflowRun, Vec<EngineError>> {
        let errors = Self::validate(&dataflow);
        if !errors.is_empty() {
            return Err(errors);
        }

        debug!("dataflow {} started", dataflow.id);
        let run = DataflowRun::new(dataflow);
        if let Err(e) = self.storage.store_run(&run).await {
            return Err(vec![e.into()]);
        }

        let root = Flow::root(run.id.clone(), &run.dataflow.start_at);
        if let Err(e) = self.enqueue_flow(root).await {
            return Err(vec![e]);
        }

        Ok(run)
    }

    /// Mark a run interrupted so dequeued flows become no-ops.
    pub async fn interrupt(&self, run_id: &RunId) -> Result<()> {
        let mut run = self
            .storage
            .retrieve_runs(slice::from_ref(run_id))
            .await
            .remove(run_id)
            .ok_or_else(|| EngineError::RunNotFound { id: run_id.clone() })?;

        warn!("interrupting dataflow run {}", run.id);
        run.state = RunState::Interrupted;
        run.finished_at = Some(Utc::now());
        self.storage.store_run(&run).await?;
        Ok(())
    }

    /// Per-flow handler invoked by the queue for each dequeued token.
    pub async fn handle_flow(&self, flow: Flow) -> Result<()> {
        info!("executor received flow {}", flow);

        let Some(mut run) = self
            .storage
            .retrieve_runs(slice::from_ref(&flow.run_id))
            .await
            .remove(&flow.run_id)
        else {
            error!("dataflow run {} not found; flow dropped", flow.run_id);
            return Err(EngineError::RunNotFound {
                id: flow.run_id.clone(),
            });
        };

        // flows dequeued after the run reached a terminal state are no-ops;
        // record them and leave the run untouched
        if run.state.is_terminal() {
            let mut flow = flow;
            warn!("run {} is {}; flow {} becomes a no-op", run.id, run.state, flow.id);
            flow.state = FlowState::Error;
            flow.message = Some(format!("dataflow run is {}", run.state));
            self.storage.store_flow(&flow).await?;
            return Ok(());
        }

        if self.cancel.is_cancelled() {
            return self
                .fail_flow(&mut run, flow, None, "execution cancelled".to_string())
                .await;
        }

        let dataflow = Arc::clone(&run.dataflow);
        let step_id = flow.next_step_id.clone().unwrap_or_default();
        let Some(step) = dataflow.step(&step_id) else {
            error!("step {} not found in dataflow", step_id);
            return self
                .fail_flow(
                    &mut run,
                    flow,
                    None,
                    format!("step {} not found in dataflow", step_id),
                )
                .await;
        };

        if run.state != RunState::Active {
            run.state = RunState::Active;
            self.storage.store_run(&run).await?;
        }

        if let Some(doer) = step.as_doer() {
            let mut flow = flow;
            debug!("executor calling do on step {}", step.id());
            match doer.run(self, &mut flow).await {
                Ok(()) => self.advance_flow(&mut run, flow, Some(step)).await,
                Err(e) => {
                    error!("error doing step {}: {}", step.id(), e);
                    self.fail_flow(&mut run, flow, Some(step), e.to_string())
                        .await
                }
            }
        } else if let Some(splitter) = step.as_splitter() {
            debug!("executor calling split on step {}", step.id());
            match splitter.split(self, &flow).await {
                Ok((children, split)) => {
                    let mut flow = flow;
                    if children.is_empty() {
                        // zero-sibling split: collapse immediately
                        info!("split at {} produced no children; collapsing", step.id());
                        flow.state = FlowState::Completed;
                        self.storage.delete_flow(&flow.id).await?;
                        return self.update_run_state(&mut run, flow, None).await;
                    }

                    self.storage.store_flow_split(&split).await?;
                    // the parent must stay retrievable while children run
                    flow.state = FlowState::Split;
                    self.storage.store_flow(&flow).await?;
                    info!(
                        "flow {} split into {} children at step {}",
                        flow.id,
                        children.len(),
                        step.id()
                    );
                    for child in children {
                        // splitters set the children's next step
                        self.advance_flow(&mut run, child, None).await?;
                    }
                    Ok(())
                }
                Err(e) => {
                    error!("error splitting at step {}: {}", step.id(), e);
                    self.fail_flow(&mut run, flow, Some(step), e.to_string())
                        .await
                }
            }
        } else if let Some(joiner) = step.as_joiner() {
            debug!("executor calling join on step {}", step.id());
            let split_id = flow.splits.last().cloned();
            let is_join_step = matches!(step, Step::Join(_));
            match joiner.join(self, &flow).await {
                Ok(JoinOutcome::Pending) => Ok(()),
                Ok(JoinOutcome::Joined(joined)) => {
                    self.collect_finished_siblings(&flow).await;
                    if is_join_step {
                        // join accounting is done; race cleans up after itself
                        if let Some(split_id) = split_id {
                            self.storage.delete_flow_split(&split_id).await?;
                            self.storage.delete_counter(split_id.as_str()).await?;
                        }
                    }
                    self.advance_flow(&mut run, joined, Some(step)).await
                }
                Ok(JoinOutcome::Failed { parent, reason }) => {
                    error!("join at step {} failed: {}", step.id(), reason);
                    self.fail_flow(&mut run, parent, Some(step), reason).await
                }
                Err(e) => {
                    error!("join at step {} aborted: {}", step.id(), e);
                    Err(e)
                }
            }
        } else {
            error!("step {} does not support execution", step.id());
            Err(EngineError::NoCapability {
                id: step.id().to_string(),
            })
        }
    }

    /// Move a finished step's flow onward: enqueue it at its next step, or
    /// complete it and roll the completion up the ancestry.
    async fn advance_flow(
        &self,
        run: &mut DataflowRun,
        mut flow: Flow,
        step: Option<&Step>,
    ) -> Result<()> {
        if flow.state == FlowState::Interrupted {
            // interruption is a non-error completion at this level; the
            // rollup decides whether a joiner still needs to see the token
            self.storage.store_flow(&flow).await?;
            return self.update_run_state(run, flow, step).await;
        }

        if let Some(step) = step {
            flow.previous_step_id = Some(step.id().to_string());
            flow.next_step_id = step.next_id().map(str::to_string);
        } // else the flow is already set up for its next step

        if flow.next_step_id.is_some() {
            self.enqueue_flow(flow).await
        } else {
            flow.state = FlowState::Completed;
            self.storage.delete_flow(&flow.id).await?;
            self.update_run_state(run, flow, step).await
        }
    }

    /// Mark a flow errored, keep it in storage, and roll up.
    async fn fail_flow(
        &self,
        run: &mut DataflowRun,
        mut flow: Flow,
        step: Option<&Step>,
        message: String,
    ) -> Result<()> {
        flow.state = FlowState::Error;
        flow.message = Some(message);
        self.storage.store_flow(&flow).await?;
        self.update_run_state(run, flow, step).await
    }

    /// Rollup: called when a flow finishes (completes, errors or is
    /// interrupted). If the flow would reach a joiner downstream, it is
    /// re-pointed there instead — the joiner owns absorbing it. Otherwise
    /// each split level's counter decides, per level, whether this caller is
    /// the last sibling and therefore propagates completion upward.
    async fn update_run_state(
        &self,
        run: &mut DataflowRun,
        mut flow: Flow,
        step: Option<&Step>,
    ) -> Result<()> {
        let dataflow = Arc::clone(&run.dataflow);

        // joiner lookahead: stop before the rollup touches the ancestry
        let mut next_id = step.and_then(|s| s.next_id().map(str::to_string));
        while let Some(id) = next_id {
            let target = dataflow
                .step(&id)
                .ok_or(EngineError::StepNotFound { id: id.clone() })?;
            if target.is_joiner() {
                debug!("flow {} advanced to joiner {}", flow.id, target.id());
                flow.next_step_id = Some(target.id().to_string());
                return self.enqueue_flow(flow).await;
            }
            next_id = target.next_id().map(str::to_string);
        }

        // an interrupted token with no joiner ahead is done; its completion
        // is counted below, so it can leave storage
        if flow.state == FlowState::Interrupted {
            self.storage.delete_flow(&flow.id).await?;
        }

        let flow_errored = flow.state == FlowState::Error;
        let mut run_errored = flow_errored;
        let mut curr = flow;

        // while the current flow is not the root
        while let Some(split_id) = curr.splits.last().cloned() {
            let split = self
                .storage
                .retrieve_flow_splits(slice::from_ref(&split_id))
                .await
                .remove(&split_id)
                .ok_or(EngineError::SplitNotFound {
                    id: split_id.clone(),
                })?;

            let (finish, errors) = self
                .storage
                .increment_with_error(split_id.as_str(), 1, i64::from(flow_errored))
                .await;

            if finish < split.flow_ids.len() as i64 {
                return Ok(()); // not the last sibling
            }

            info!(
                "all {} children of flow {} finished ({} with error)",
                split.flow_ids.len(),
                split.parent_flow_id,
                errors
            );
            if errors > 0 {
                run_errored = true;
            }

            let mut parent = self
                .storage
                .retrieve_flows(slice::from_ref(&split.parent_flow_id))
                .await
                .remove(&split.parent_flow_id)
                .ok_or_else(|| {
                    // counter said we are last, so the parent must still exist
                    error!(
                        "protocol violation: parent flow {} of split {} missing",
                        split.parent_flow_id, split_id
                    );
                    EngineError::FlowNotFound {
                        id: split.parent_flow_id.clone(),
                    }
                })?;

            if errors > 0 {
                warn!("setting parent flow {} to error", parent.id);
                parent.state = FlowState::Error;
                parent.message = Some("one or more child flows finished with errors".to_string());
                self.storage.store_flow(&parent).await?;
            } else {
                debug!("setting parent flow {} to completed", parent.id);
                parent.state = FlowState::Completed;
                self.storage.delete_flow(&parent.id).await?;
                // level collapsed cleanly; its accounting is complete
                self.storage.delete_flow_split(&split_id).await?;
                self.storage.delete_counter(split_id.as_str()).await?;
            }

            curr = parent;
        }

        // the root finished: the run is over
        if run_errored {
            warn!("dataflow run {} completed with error", run.id);
            run.state = RunState::Error;
        } else {
            info!("dataflow run {} completed successfully", run.id);
            run.state = RunState::Completed;
        }
        run.finished_at = Some(Utc::now());
        self.storage.store_run(run).await?;
        Ok(())
    }

    /// Persist and enqueue a flow. An enqueue failure removes the stored
    /// token again so storage never holds undeliverable flows.
    async fn enqueue_flow(&self, flow: Flow) -> Result<()> {
        self.storage.store_flow(&flow).await?;
        let flow_id = flow.id.clone();
        if let Err(e) = self.queue.enqueue(flow).await {
            error!("error enqueueing flow {}: {}", flow_id, e);
            self.storage.delete_flow(&flow_id).await?;
            return Err(e.into());
        }
        Ok(())
    }

    /// After a join produced its result, delete every sibling that did not
    /// error. Errored siblings are retained for diagnostics.
    async fn collect_finished_siblings(&self, flow: &Flow) {
        let Some(split_id) = flow.splits.last() else {
            return;
        };
        let Some(split) = self
            .storage
            .retrieve_flow_splits(slice::from_ref(split_id))
            .await
            .remove(split_id)
        else {
            return; // already collected
        };

        for (_, sibling) in self.storage.retrieve_flows(&split.flow_ids).await {
            if sibling.state != FlowState::Error {
                if let Err(e) = self.storage.delete_flow(&sibling.id).await {
                    warn!("failed to delete joined sibling {}: {}", sibling.id, e);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::http::DefaultHttpClientFactory;
    use crate::model::Dataflow;
    use crate::queue::MemoryQueue;
    use crate::storage::MemoryStorage;

    fn build_executor() -> (Arc<Executor>, Arc<MemoryStorage>, Arc<MemoryQueue>) {
        let storage = Arc::new(MemoryStorage::new());
        let queue = Arc::new(MemoryQueue::new(4));
        let executor = Executor::new(
            Arc::new(DefaultHttpClientFactory::new().unwrap()),
            storage.clone(),
            queue.clone(),
        );
        (executor, storage, queue)
    }

    #[test]
    fn test_validate_flags_every_bad_step() {
        let dataflow = Dataflow::from_json(
            r#"{
                "steps": [
                    {"id": "a", "type": "constant", "value": null, "next": "b"},
                    {"id": "b", "type": "select", "selector": "nope", "next": "c"},
                    {"id": "c", "type": "conditional", "condition": "1 +"},
                    {"id": "d", "type": "web-method", "method": "GET", "url": "/relative"}
                ],
                "startAt": "a"
            }"#,
        )
        .unwrap();

        let errors = Executor::validate(&dataflow);
        assert_eq!(errors.len(), 4);
    }

    #[tokio::test]
    async fn test_start_rejects_invalid_dataflow_without_persisting() {
        let (executor, storage, _queue) = build_executor();
        let dataflow = Dataflow::from_json(
            r#"{"steps": [{"id": "a", "type": "select", "selector": ""}], "startAt": "a"}"#,
        )
        .unwrap();

        let result = executor.start(dataflow).await;
        assert!(result.is_err());
        assert_eq!(storage.flow_count(), 0);
    }

    #[tokio::test]
    async fn test_interrupt_marks_run_terminal() {
        let (executor, storage, _queue) = build_executor();
        let dataflow = Dataflow::from_json(
            r#"{"steps": [{"id": "a", "type": "constant", "value": 1}], "startAt": "a"}"#,
        )
        .unwrap();
        let run = DataflowRun::new(dataflow);
        storage.store_run(&run).await.unwrap();

        executor.interrupt(&run.id).await.unwrap();
        let stored = storage
            .retrieve_runs(std::slice::from_ref(&run.id))
            .await
            .remove(&run.id)
            .unwrap();
        assert_eq!(stored.state, RunState::Interrupted);
        assert!(stored.finished_at.is_some());

        let missing = RunId::from("missing");
        assert!(executor.interrupt(&missing).await.is_err());
    }
}
