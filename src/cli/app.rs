// ABOUTME: Main application orchestration for the tributary CLI
// ABOUTME: Wires storage, queue and executor, then polls the run to its end

use anyhow::{anyhow, Result};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use super::{Args, Commands};
use crate::engine::{DefaultHttpClientFactory, Executor};
use crate::model::Dataflow;
use crate::queue::{FlowQueue, MemoryQueue};
use crate::storage::{MemoryStorage, Storage};

pub struct App;

impl App {
    pub fn new() -> Self {
        Self
    }

    /// Initialize logging based on verbosity.
    pub fn init_logging(&self, verbose: bool) {
        let level = if verbose { "tributary=debug" } else { "tributary=info" };
        let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

        // try_init so embedding hosts (and tests) can install their own
        let _ = tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .try_init();
    }

    /// Run the application with parsed arguments.
    pub async fn run(&self, args: Args) -> Result<()> {
        self.init_logging(args.verbose);
        info!("starting tributary v{}", env!("CARGO_PKG_VERSION"));

        match args.command {
            Commands::Run {
                dataflow,
                workers,
                poll_interval,
            } => self.run_dataflow(&dataflow, workers, poll_interval).await,
            Commands::Validate { dataflow } => self.validate_dataflow(&dataflow),
        }
    }

    async fn run_dataflow(&self, path: &Path, workers: usize, poll_interval: u64) -> Result<()> {
        let dataflow = Dataflow::from_file(path)?;

        let storage = Arc::new(MemoryStorage::new());
        let queue = Arc::new(MemoryQueue::new(workers));
        let executor = Executor::new(
            Arc::new(DefaultHttpClientFactory::new()?),
            storage.clone(),
            queue.clone(),
        );

        let run = executor
            .start(dataflow)
            .await
            .map_err(|errors| report_errors("dataflow failed validation", errors))?;
        info!("dataflow run {} started", run.id);

        // poll until the run reaches a terminal state or disappears
        let run_id = run.id.clone();
        loop {
            tokio::time::sleep(Duration::from_millis(poll_interval)).await;
            let current = storage
                .retrieve_runs(std::slice::from_ref(&run_id))
                .await
                .remove(&run_id);
            match current {
                Some(run) if !run.state.is_terminal() => continue,
                Some(run) => {
                    println!("run {} finished: {}", run.id, run.state);
                    break;
                }
                None => {
                    println!("run {} no longer in storage", run_id);
                    break;
                }
            }
        }

        debug!("waiting for queue to stop");
        queue.stop().map_err(|e| anyhow!(e))?.wait().await;
        Ok(())
    }

    fn validate_dataflow(&self, path: &Path) -> Result<()> {
        let dataflow = Dataflow::from_file(path)?;
        let errors = Executor::validate(&dataflow);
        if errors.is_empty() {
            println!("dataflow {} is valid ({} steps)", dataflow.id, dataflow.steps.len());
            Ok(())
        } else {
            Err(report_errors("dataflow failed validation", errors))
        }
    }
}

impl Default for App {
    fn default() -> Self {
        Self::new()
    }
}

fn report_errors(context: &str, errors: Vec<crate::engine::EngineError>) -> anyhow::Error {
    let details: Vec<String> = errors.iter().map(|e| e.to_string()).collect();
    anyhow!("{}:\n{}", context, details.join("\n"))
}
