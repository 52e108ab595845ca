//! Task: final image assembly.
//!
//! Digests the final stage tree, verifies the launch spec's module-path
//! wiring against what was actually materialized, packs the deterministic
//! archive, and writes the image manifest beside it.

use std::collections::HashMap;
use std::fs::File;
use std::path::Path;

use async_trait::async_trait;
use chrono::Utc;

use super::{log_task_error, task_start};
use crate::build::artifact::{digest_tree, pack_image};
use crate::build::manifest::BuildManifest;
use crate::build::types::{BuildCtx, ImageManifest, ImageOutput, StageOutput, StageSummary};
use crate::errors::{GroundworkError, GroundworkResult};
use crate::pipeline::PipelineTask;

pub struct AssembleTask;

#[async_trait]
impl PipelineTask<BuildCtx> for AssembleTask {
    async fn run(self: Box<Self>, ctx: BuildCtx) -> GroundworkResult<()> {
        let task_name = self.name();
        let build_id = task_start(&ctx, task_name).await;

        let (manifest, stage_outputs, output_dir) = {
            let mut ctx = ctx.lock().await;
            let image_path = ctx.output_dir.join(format!("{}.tar.gz", ctx.manifest.name));
            let manifest_path = ctx
                .output_dir
                .join(format!("{}.manifest.json", ctx.manifest.name));
            // Register outputs before creating them so a failure mid-pack
            // never leaves a partial image behind.
            ctx.guard.add_artifact(image_path);
            ctx.guard.add_artifact(manifest_path);
            (
                ctx.manifest.clone(),
                ctx.stage_outputs.clone(),
                ctx.output_dir.clone(),
            )
        };

        let output = run_assemble(&build_id, &manifest, &stage_outputs, &output_dir)
            .inspect_err(|e| log_task_error(&build_id, task_name, e))?;

        let mut ctx = ctx.lock().await;
        ctx.image_output = Some(output);

        Ok(())
    }

    fn name(&self) -> &str {
        "assemble"
    }
}

fn run_assemble(
    build_id: &str,
    manifest: &BuildManifest,
    stage_outputs: &HashMap<String, StageOutput>,
    output_dir: &Path,
) -> GroundworkResult<ImageOutput> {
    let final_spec = manifest.final_stage();
    let final_output = stage_outputs.get(&final_spec.name).ok_or_else(|| {
        GroundworkError::Internal(format!("final stage '{}' has no output", final_spec.name))
    })?;
    let tree = &final_output.stage_dir;

    verify_module_path(manifest, tree)?;

    let digest = digest_tree(tree)?;
    let image_path = output_dir.join(format!("{}.tar.gz", manifest.name));
    let size_bytes = pack_image(tree, &image_path)?;

    let image_manifest = ImageManifest {
        name: manifest.name.clone(),
        build_id: build_id.to_string(),
        digest: digest.clone(),
        size_bytes,
        created_at: Utc::now(),
        stages: summarize_stages(manifest, stage_outputs),
        launch: manifest.launch.clone(),
    };
    let manifest_path = output_dir.join(format!("{}.manifest.json", manifest.name));
    let file = File::create(&manifest_path)?;
    serde_json::to_writer_pretty(file, &image_manifest)
        .map_err(|e| GroundworkError::Storage(format!("write image manifest: {}", e)))?;

    tracing::info!(
        image = %image_path.display(),
        digest = %digest,
        size_bytes = size_bytes,
        "assembled image"
    );

    Ok(ImageOutput {
        image_path,
        manifest_path,
        digest,
        size_bytes,
    })
}

/// Every launch module-path entry must exist in the final tree; declared
/// wiring that was never materialized would fail at service start instead.
fn verify_module_path(manifest: &BuildManifest, tree: &Path) -> GroundworkResult<()> {
    for entry in &manifest.launch.module_path {
        if !tree.join(entry).exists() {
            return Err(GroundworkError::Launch(format!(
                "module path entry '{}' does not exist in the final stage",
                entry.display()
            )));
        }
    }
    Ok(())
}

fn summarize_stages(
    manifest: &BuildManifest,
    stage_outputs: &HashMap<String, StageOutput>,
) -> Vec<StageSummary> {
    manifest
        .stages
        .iter()
        .map(|spec| {
            let output = stage_outputs.get(&spec.name);
            StageSummary {
                name: spec.name.clone(),
                exported: output.map(|o| o.exported.clone()).unwrap_or_default(),
                dependencies: output
                    .map(|o| {
                        o.resolved_dependencies
                            .iter()
                            .map(|d| d.to_string())
                            .collect::<Vec<_>>()
                    })
                    .unwrap_or_default(),
            }
        })
        .collect()
}
