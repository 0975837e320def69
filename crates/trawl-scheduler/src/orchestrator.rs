//! Wires the job store, provider registry and task pipeline behind the gate.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, error};
use trawl_store::JobStore;

use crate::{
    CycleOutcome, ExecutionGate, ProviderRegistry, SchedulerError, Task, TaskFuture, plan_tasks,
};

/// Error type returned by pipelines.
pub type PipelineError = Box<dyn std::error::Error + Send + Sync>;

/// Executes one planned task: fetch listings, deduplicate, notify.
///
/// Implementations own whatever collaborators they need (HTTP client,
/// similarity cache, notification senders) and should bound their own
/// runtime, since a hung task holds a concurrency slot until it settles.
#[async_trait]
pub trait TaskPipeline: Send + Sync {
    async fn execute(&self, task: &Task) -> Result<(), PipelineError>;
}

/// Runs execution cycles: reads the jobs, plans tasks, executes them through
/// the pipeline behind the single-flight gate.
pub struct Orchestrator {
    gate: ExecutionGate,
    jobs: Arc<dyn JobStore>,
    registry: Arc<ProviderRegistry>,
    pipeline: Arc<dyn TaskPipeline>,
}

impl Orchestrator {
    pub fn new(
        gate: ExecutionGate,
        jobs: Arc<dyn JobStore>,
        registry: Arc<ProviderRegistry>,
        pipeline: Arc<dyn TaskPipeline>,
    ) -> Self {
        Self {
            gate,
            jobs,
            registry,
            pipeline,
        }
    }

    pub fn gate(&self) -> &ExecutionGate {
        &self.gate
    }

    /// Attempt one cycle. Never fails; the outcome says what happened.
    #[tracing::instrument(skip(self))]
    pub async fn run_cycle(&self) -> CycleOutcome {
        self.gate
            .attempt_cycle(|| async {
                let jobs = self.jobs.get_jobs().await?;
                let tasks = plan_tasks(&jobs, &self.registry);
                let futures: Vec<TaskFuture> =
                    tasks.into_iter().map(|task| self.task_future(task)).collect();
                Ok::<_, SchedulerError>(futures)
            })
            .await
    }

    fn task_future(&self, task: Task) -> TaskFuture {
        let pipeline = Arc::clone(&self.pipeline);
        Box::pin(async move {
            match pipeline.execute(&task).await {
                Ok(()) => {
                    debug!(job_id = %task.job_id, provider = %task.provider_id(), "task succeeded");
                    Ok(())
                }
                Err(e) => {
                    error!(
                        job_id = %task.job_id,
                        provider = %task.provider_id(),
                        error = %e,
                        "task failed"
                    );
                    Err(e.to_string())
                }
            }
        })
    }
}
