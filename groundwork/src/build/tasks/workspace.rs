//! Task: build workspace setup.
//!
//! Creates the per-build working tree (stages/, exports/) and arms the
//! cleanup guard with it.

use std::path::PathBuf;

use async_trait::async_trait;

use super::{log_task_error, task_start};
use crate::build::types::{BuildCtx, BuildLayout};
use crate::errors::GroundworkResult;
use crate::pipeline::PipelineTask;

pub struct WorkspaceTask {
    pub builds_dir: PathBuf,
}

#[async_trait]
impl PipelineTask<BuildCtx> for WorkspaceTask {
    async fn run(self: Box<Self>, ctx: BuildCtx) -> GroundworkResult<()> {
        let task_name = self.name();
        let build_id = task_start(&ctx, task_name).await;

        let layout = BuildLayout::new(self.builds_dir.join(&build_id));
        layout
            .prepare()
            .inspect_err(|e| log_task_error(&build_id, task_name, e))?;

        let mut ctx = ctx.lock().await;
        ctx.guard.set_layout(layout.clone());
        ctx.layout = Some(layout);

        Ok(())
    }

    fn name(&self) -> &str {
        "workspace_setup"
    }
}
