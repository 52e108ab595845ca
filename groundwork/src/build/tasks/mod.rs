//! Build pipeline tasks.
//!
//! Tasks follow a fixed shape: gather inputs from the shared context, do the
//! work in a standalone function, store the output back.

mod assemble;
mod stage_build;
mod workspace;

pub(crate) use assemble::AssembleTask;
pub(crate) use stage_build::StageBuildTask;
pub(crate) use workspace::WorkspaceTask;

use crate::build::types::BuildCtx;
use crate::errors::GroundworkError;

pub(crate) async fn task_start(ctx: &BuildCtx, task_name: &str) -> String {
    let ctx = ctx.lock().await;
    tracing::debug!(build_id = %ctx.build_id, task = task_name, "task start");
    ctx.build_id.clone()
}

pub(crate) fn log_task_error(build_id: &str, task_name: &str, err: &GroundworkError) {
    tracing::error!(build_id = %build_id, task = task_name, error = %err, "task failed");
}
