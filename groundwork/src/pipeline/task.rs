//! Task and stage types for table-driven pipeline execution.

use async_trait::async_trait;

use crate::errors::GroundworkResult;

/// Trait for tasks that can be executed in a pipeline.
///
/// Tasks run with a shared context, which is cloned per task.
#[async_trait]
pub trait PipelineTask<Ctx>: Send + Sync {
    /// Execute the task with the shared pipeline context.
    async fn run(self: Box<Self>, ctx: Ctx) -> GroundworkResult<()>;

    /// Human-readable task name for logging and timings.
    fn name(&self) -> &str;
}

pub type BoxedTask<Ctx> = Box<dyn PipelineTask<Ctx>>;

/// Execution mode for a stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionMode {
    /// Execute tasks concurrently; the stage completes when all do.
    Parallel,
    /// Execute tasks one after another.
    Sequential,
}

/// A pipeline stage: a group of tasks plus an execution mode.
///
/// Stages run in declaration order; a stage begins only after every task of
/// the previous stage has finished.
pub struct Stage<Ctx> {
    pub tasks: Vec<BoxedTask<Ctx>>,
    pub execution: ExecutionMode,
}

impl<Ctx> Stage<Ctx> {
    pub fn parallel(tasks: Vec<BoxedTask<Ctx>>) -> Self {
        Self {
            tasks,
            execution: ExecutionMode::Parallel,
        }
    }

    pub fn sequential(tasks: Vec<BoxedTask<Ctx>>) -> Self {
        Self {
            tasks,
            execution: ExecutionMode::Sequential,
        }
    }
}
