//! Generic table-driven pipeline execution.
//!
//! The build stager declares its work as an [`ExecutionPlan`]: an ordered
//! list of stages, each holding tasks that run sequentially or concurrently.
//! The executor walks the plan in order and fails fast on the first task
//! error, so no later stage observes partial state.

mod task;

pub use task::{BoxedTask, ExecutionMode, PipelineTask, Stage};

use std::time::{Duration, Instant};

use futures::future::try_join_all;

use crate::errors::GroundworkResult;

/// Ordered set of stages ready for execution.
pub struct ExecutionPlan<Ctx> {
    stages: Vec<Stage<Ctx>>,
}

impl<Ctx> ExecutionPlan<Ctx> {
    pub fn new(stages: Vec<Stage<Ctx>>) -> Self {
        Self { stages }
    }
}

/// Per-task timing recorded during execution.
#[derive(Debug, Clone)]
pub struct TaskTiming {
    pub name: String,
    pub duration: Duration,
}

/// Timings for a full pipeline run.
#[derive(Debug, Clone)]
pub struct PipelineTimings {
    pub total: Duration,
    pub tasks: Vec<TaskTiming>,
}

impl PipelineTimings {
    pub fn task_duration(&self, name: &str) -> Option<Duration> {
        self.tasks
            .iter()
            .find(|task| task.name == name)
            .map(|task| task.duration)
    }
}

/// Pipeline executor.
///
/// Generic over `Ctx`, the shared pipeline context (use interior mutability
/// for writes).
pub struct PipelineExecutor;

impl PipelineExecutor {
    /// Execute a plan to completion, or to the first task failure.
    pub async fn execute<Ctx>(plan: ExecutionPlan<Ctx>, ctx: Ctx) -> GroundworkResult<PipelineTimings>
    where
        Ctx: Clone,
    {
        let total_start = Instant::now();
        let mut timings = Vec::new();

        for stage in plan.stages {
            match stage.execution {
                ExecutionMode::Parallel => {
                    let futures = stage.tasks.into_iter().map(|task| {
                        let ctx = ctx.clone();
                        async move {
                            let name = task.name().to_string();
                            let task_start = Instant::now();
                            task.run(ctx).await?;
                            Ok::<TaskTiming, crate::errors::GroundworkError>(TaskTiming {
                                name,
                                duration: task_start.elapsed(),
                            })
                        }
                    });
                    timings.extend(try_join_all(futures).await?);
                }
                ExecutionMode::Sequential => {
                    for task in stage.tasks {
                        let name = task.name().to_string();
                        let task_start = Instant::now();
                        task.run(ctx.clone()).await?;
                        timings.push(TaskTiming {
                            name,
                            duration: task_start.elapsed(),
                        });
                    }
                }
            }
        }

        Ok(PipelineTimings {
            total: total_start.elapsed(),
            tasks: timings,
        })
    }
}
