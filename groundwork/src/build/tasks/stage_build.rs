//! Task: execute one declared build stage.
//!
//! Materializes the base environment, installs build-time toolchain
//! packages, copies imports and application sources, installs declared
//! dependencies into the user-scoped location, then publishes the
//! carried-forward artifacts. Everything not published is discarded with
//! the stage.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use async_trait::async_trait;

use super::{log_task_error, task_start};
use crate::build::manifest::{BaseEnv, StageSpec};
use crate::build::packages::{PackageStore, parse_manifest};
use crate::build::types::{BuildCtx, BuildLayout, StageOutput};
use crate::errors::{GroundworkError, GroundworkResult};
use crate::pipeline::PipelineTask;
use crate::util::{copy_path, copy_tree};

/// Directory build-time tool packages are installed under. Stage-local by
/// construction: it can only reach the image if a stage exports it.
pub(crate) const TOOLCHAIN_DIR: &str = "toolchain";

pub struct StageBuildTask {
    index: usize,
    name: String,
}

impl StageBuildTask {
    pub fn new(index: usize, spec: &StageSpec) -> Self {
        Self {
            index,
            name: format!("stage:{}", spec.name),
        }
    }
}

#[async_trait]
impl PipelineTask<BuildCtx> for StageBuildTask {
    async fn run(self: Box<Self>, ctx: BuildCtx) -> GroundworkResult<()> {
        let task_name = self.name().to_string();
        let build_id = task_start(&ctx, &task_name).await;

        let (spec, layout, context_dir, store, prior) = {
            let ctx = ctx.lock().await;
            let spec = ctx.manifest.stages[self.index].clone();
            let layout = ctx
                .layout
                .clone()
                .ok_or_else(|| GroundworkError::Internal("workspace task must run first".into()))?;
            (
                spec,
                layout,
                ctx.context_dir.clone(),
                ctx.store.clone(),
                ctx.stage_outputs.clone(),
            )
        };

        let output = run_stage(StageInput {
            spec: &spec,
            layout: &layout,
            context_dir: &context_dir,
            store: &store,
            prior: &prior,
        })
        .inspect_err(|e| log_task_error(&build_id, &task_name, e))?;

        let mut ctx = ctx.lock().await;
        ctx.stage_outputs.insert(spec.name.clone(), output);

        Ok(())
    }

    fn name(&self) -> &str {
        &self.name
    }
}

struct StageInput<'a> {
    spec: &'a StageSpec,
    layout: &'a BuildLayout,
    context_dir: &'a Path,
    store: &'a PackageStore,
    prior: &'a HashMap<String, StageOutput>,
}

fn run_stage(input: StageInput<'_>) -> GroundworkResult<StageOutput> {
    let spec = input.spec;
    let stage_dir = input.layout.stage_dir(&spec.name);
    fs::create_dir_all(&stage_dir)?;

    materialize_base(spec, input.context_dir, &stage_dir)?;
    install_toolchain(spec, input.store, &stage_dir)?;
    copy_imports(spec, input.prior, &stage_dir)?;
    copy_sources(spec, input.context_dir, &stage_dir)?;
    let resolved = install_dependencies(spec, input.store, &stage_dir)?;
    let (exports_dir, exported) = publish_exports(spec, input.layout, &stage_dir)?;

    tracing::info!(
        stage = %spec.name,
        exported = exported.len(),
        dependencies = resolved.len(),
        "stage complete"
    );

    Ok(StageOutput {
        stage_dir,
        exports_dir,
        exported,
        resolved_dependencies: resolved,
    })
}

fn materialize_base(
    spec: &StageSpec,
    context_dir: &Path,
    stage_dir: &Path,
) -> GroundworkResult<()> {
    match &spec.base {
        BaseEnv::Scratch => Ok(()),
        BaseEnv::Snapshot { path } => {
            let src = context_dir.join(path);
            if !src.is_dir() {
                return Err(GroundworkError::Manifest(format!(
                    "stage '{}': base snapshot {} not found in build context",
                    spec.name,
                    path.display()
                )));
            }
            copy_tree(&src, stage_dir)
        }
    }
}

fn install_toolchain(
    spec: &StageSpec,
    store: &PackageStore,
    stage_dir: &Path,
) -> GroundworkResult<()> {
    if spec.system_packages.is_empty() {
        return Ok(());
    }

    let tool_dir = stage_dir.join(TOOLCHAIN_DIR);
    for name in &spec.system_packages {
        store.install_tool(&spec.name, name, &tool_dir)?;
    }
    tracing::debug!(
        stage = %spec.name,
        packages = spec.system_packages.len(),
        "installed toolchain packages"
    );
    Ok(())
}

/// Only declared carried-forward artifacts cross the stage boundary: imports
/// read from the exporting stage's published exports, never its raw tree.
fn copy_imports(
    spec: &StageSpec,
    prior: &HashMap<String, StageOutput>,
    stage_dir: &Path,
) -> GroundworkResult<()> {
    for import in &spec.imports {
        let from = prior.get(&import.from_stage).ok_or_else(|| {
            GroundworkError::StageCopy {
                stage: spec.name.clone(),
                reason: format!("stage '{}' has not run", import.from_stage),
            }
        })?;

        let src = from.exports_dir.join(&import.source);
        if !src.exists() {
            return Err(GroundworkError::StageCopy {
                stage: spec.name.clone(),
                reason: format!(
                    "artifact '{}' was not exported by stage '{}'",
                    import.source.display(),
                    import.from_stage
                ),
            });
        }
        copy_path(&src, &stage_dir.join(import.dest_path()))?;
    }
    Ok(())
}

fn copy_sources(spec: &StageSpec, context_dir: &Path, stage_dir: &Path) -> GroundworkResult<()> {
    for copy in &spec.source {
        let src = context_dir.join(&copy.from);
        if !src.exists() {
            return Err(GroundworkError::Storage(format!(
                "stage '{}': source path {} not found in build context",
                spec.name,
                copy.from.display()
            )));
        }
        copy_path(&src, &stage_dir.join(copy.to_path()))?;
    }
    Ok(())
}

fn install_dependencies(
    spec: &StageSpec,
    store: &PackageStore,
    stage_dir: &Path,
) -> GroundworkResult<Vec<crate::build::packages::DependencySpec>> {
    let Some(deps) = &spec.dependencies else {
        return Ok(Vec::new());
    };

    let manifest_path = stage_dir.join(&deps.manifest);
    let text = fs::read_to_string(&manifest_path).map_err(|e| {
        GroundworkError::DependencyResolution {
            stage: spec.name.clone(),
            reason: format!(
                "cannot read dependency manifest {}: {}",
                deps.manifest.display(),
                e
            ),
        }
    })?;
    let specs = parse_manifest(&text).map_err(|e| GroundworkError::DependencyResolution {
        stage: spec.name.clone(),
        reason: e.to_string(),
    })?;

    let install_dir = stage_dir.join(&deps.install_dir);
    let resolved = store.install_all(&spec.name, &specs, &install_dir)?;
    tracing::info!(
        stage = %spec.name,
        dependencies = resolved.len(),
        install_dir = %deps.install_dir.display(),
        "installed dependencies"
    );
    Ok(resolved)
}

fn publish_exports(
    spec: &StageSpec,
    layout: &BuildLayout,
    stage_dir: &Path,
) -> GroundworkResult<(std::path::PathBuf, Vec<std::path::PathBuf>)> {
    let exports_dir = layout.exports_dir(&spec.name);
    let mut exported = Vec::with_capacity(spec.exports.len());

    for export in &spec.exports {
        let src = stage_dir.join(export);
        if !src.exists() {
            return Err(GroundworkError::StageCopy {
                stage: spec.name.clone(),
                reason: format!(
                    "declared carried-forward artifact '{}' is missing",
                    export.display()
                ),
            });
        }
        copy_path(&src, &exports_dir.join(export))?;
        exported.push(export.clone());
    }

    Ok((exports_dir, exported))
}
