//! Staged image builds.
//!
//! ## Architecture
//!
//! A build is table-driven, one pipeline stage per declared build stage:
//!
//! ```text
//! Workspace            (create per-build working tree)
//! stage:<first>  ──→ exports/<first>
//! stage:<next>   ──→ exports/<next>     (imports only declared artifacts)
//!   ...
//! stage:<final>
//! Assemble             (digest + deterministic archive + image manifest)
//! ```
//!
//! Stages are strictly ordered; only declared carried-forward artifacts
//! cross a stage boundary. On any failure the cleanup guard discards the
//! working tree and any partial image, so an interrupted build leaves
//! nothing behind.

pub mod artifact;
pub mod manifest;
pub mod packages;
mod tasks;
pub mod types;

pub use manifest::{
    BaseEnv, BuildManifest, DependencyInstall, ImportSpec, SourceCopy, StageSpec,
};
pub use packages::{DependencySpec, PackageStore, parse_manifest};
pub use types::{
    BuildLayout, ImageManifest, ImageOutput, StageOutput, StageSummary, generate_build_id,
};

use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::Mutex;

use crate::errors::{GroundworkError, GroundworkResult};
use crate::options::BuildOptions;
use crate::pipeline::{BoxedTask, ExecutionPlan, PipelineExecutor, Stage};
use crate::build::types::{BuildCtx, BuildPipelineContext};
use tasks::{AssembleTask, StageBuildTask, WorkspaceTask};

fn execution_plan(manifest: &BuildManifest, builds_dir: PathBuf) -> ExecutionPlan<BuildCtx> {
    let mut stages: Vec<Stage<BuildCtx>> = Vec::with_capacity(manifest.stages.len() + 2);

    stages.push(Stage::sequential(vec![
        Box::new(WorkspaceTask { builds_dir }) as BoxedTask<BuildCtx>,
    ]));
    for (index, spec) in manifest.stages.iter().enumerate() {
        stages.push(Stage::sequential(vec![
            Box::new(StageBuildTask::new(index, spec)) as BoxedTask<BuildCtx>,
        ]));
    }
    stages.push(Stage::sequential(vec![
        Box::new(AssembleTask) as BoxedTask<BuildCtx>,
    ]));

    ExecutionPlan::new(stages)
}

/// Builds an image from a build manifest.
///
/// # Example
///
/// ```ignore
/// let output = ImageBuilder::new(options)?.build().await?;
/// println!("sha256:{}", output.digest);
/// ```
pub struct ImageBuilder {
    options: BuildOptions,
}

impl ImageBuilder {
    pub fn new(options: BuildOptions) -> GroundworkResult<Self> {
        options.sanitize()?;
        Ok(Self { options })
    }

    /// Run the build to completion.
    ///
    /// Executes all stages with automatic cleanup on failure.
    pub async fn build(self) -> GroundworkResult<ImageOutput> {
        let manifest = BuildManifest::load(&self.options.manifest_path)?;
        let build_id = generate_build_id();

        tracing::info!(
            build_id = %build_id,
            image = %manifest.name,
            stages = manifest.stages.len(),
            "starting build"
        );

        let plan = execution_plan(&manifest, self.options.builds_dir.clone());
        let ctx: BuildCtx = Arc::new(Mutex::new(BuildPipelineContext::new(
            build_id,
            manifest,
            self.options.context_dir.clone(),
            PackageStore::new(self.options.package_store.clone()),
            self.options.output_dir.clone(),
            self.options.keep_work,
        )));

        // On failure the context (and its armed guard) is dropped here,
        // discarding all stage state and any partial image.
        let timings = PipelineExecutor::execute(plan, Arc::clone(&ctx)).await?;

        let mut ctx = ctx.lock().await;
        ctx.guard.disarm();
        let output = ctx
            .image_output
            .take()
            .ok_or_else(|| GroundworkError::Internal("assemble task must run first".into()))?;

        if !ctx.keep_work
            && let Some(layout) = &ctx.layout
            && let Err(e) = layout.cleanup()
        {
            tracing::warn!(error = %e, "failed to remove build working tree");
        }

        tracing::info!(
            image = %output.image_path.display(),
            total_ms = timings.total.as_millis() as u64,
            "build complete"
        );
        Ok(output)
    }
}
