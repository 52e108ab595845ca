//! Type definitions for the build pipeline.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::build::manifest::BuildManifest;
use crate::build::packages::{DependencySpec, PackageStore};
use crate::errors::GroundworkResult;
use crate::launch::ServiceLaunchSpec;

/// Generate a unique build id (26 chars, ULID format, sortable by time).
pub fn generate_build_id() -> String {
    ulid::Ulid::new().to_string().to_lowercase()
}

/// Working directory layout for one build run.
///
/// Stage trees and their published exports live side by side; the whole root
/// is discarded when the build finishes or fails.
#[derive(Debug, Clone)]
pub struct BuildLayout {
    root: PathBuf,
}

impl BuildLayout {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The isolated filesystem snapshot a stage builds in.
    pub fn stage_dir(&self, stage: &str) -> PathBuf {
        self.root.join("stages").join(stage)
    }

    /// Where a stage's declared carried-forward artifacts are published.
    pub fn exports_dir(&self, stage: &str) -> PathBuf {
        self.root.join("exports").join(stage)
    }

    pub fn prepare(&self) -> GroundworkResult<()> {
        std::fs::create_dir_all(self.root.join("stages"))?;
        std::fs::create_dir_all(self.root.join("exports"))?;
        Ok(())
    }

    pub fn cleanup(&self) -> GroundworkResult<()> {
        if self.root.exists() {
            std::fs::remove_dir_all(&self.root)?;
        }
        Ok(())
    }
}

/// RAII guard for cleanup on build failure.
///
/// Interrupted builds simply discard all stage state; a partial image is
/// never published. Disarm on success.
pub struct CleanupGuard {
    layout: Option<BuildLayout>,
    artifacts: Vec<PathBuf>,
    armed: bool,
}

impl Default for CleanupGuard {
    fn default() -> Self {
        Self::new()
    }
}

impl CleanupGuard {
    pub fn new() -> Self {
        Self {
            layout: None,
            artifacts: Vec::new(),
            armed: true,
        }
    }

    /// Register the working tree for cleanup on failure.
    pub fn set_layout(&mut self, layout: BuildLayout) {
        self.layout = Some(layout);
    }

    /// Register an output artifact to delete on failure.
    pub fn add_artifact(&mut self, path: PathBuf) {
        self.artifacts.push(path);
    }

    /// Disarm the guard (call on success).
    pub fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for CleanupGuard {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }

        tracing::warn!("build failed, discarding stage state");

        for artifact in &self.artifacts {
            if artifact.exists()
                && let Err(e) = std::fs::remove_file(artifact)
            {
                tracing::warn!(
                    path = %artifact.display(),
                    error = %e,
                    "failed to remove partial artifact"
                );
            }
        }

        if let Some(ref layout) = self.layout
            && let Err(e) = layout.cleanup()
        {
            tracing::warn!(error = %e, "failed to discard build working tree");
        }
    }
}

/// Output recorded after a stage completes.
#[derive(Debug, Clone)]
pub struct StageOutput {
    /// The stage's materialized tree.
    pub stage_dir: PathBuf,
    /// Where its declared artifacts were published.
    pub exports_dir: PathBuf,
    /// The artifacts that were actually published.
    pub exported: Vec<PathBuf>,
    /// Dependencies installed into the stage, if any.
    pub resolved_dependencies: Vec<DependencySpec>,
}

/// Output of the final assemble task.
#[derive(Debug, Clone)]
pub struct ImageOutput {
    pub image_path: PathBuf,
    pub manifest_path: PathBuf,
    pub digest: String,
    pub size_bytes: u64,
}

/// Per-stage summary embedded in the image manifest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageSummary {
    pub name: String,
    pub exported: Vec<PathBuf>,
    pub dependencies: Vec<String>,
}

/// Image manifest written beside the packed archive.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageManifest {
    pub name: String,
    pub build_id: String,
    /// SHA-256 over the final stage tree.
    pub digest: String,
    pub size_bytes: u64,
    pub created_at: DateTime<Utc>,
    pub stages: Vec<StageSummary>,
    pub launch: ServiceLaunchSpec,
}

/// Shared build pipeline context.
///
/// Stores shared inputs and per-stage outputs across all tasks.
pub struct BuildPipelineContext {
    pub build_id: String,
    pub manifest: BuildManifest,
    pub context_dir: PathBuf,
    pub store: PackageStore,
    pub output_dir: PathBuf,
    pub keep_work: bool,
    /// Set by the workspace task.
    pub layout: Option<BuildLayout>,
    pub stage_outputs: HashMap<String, StageOutput>,
    pub guard: CleanupGuard,
    pub image_output: Option<ImageOutput>,
}

pub type BuildCtx = Arc<Mutex<BuildPipelineContext>>;

impl BuildPipelineContext {
    pub fn new(
        build_id: String,
        manifest: BuildManifest,
        context_dir: PathBuf,
        store: PackageStore,
        output_dir: PathBuf,
        keep_work: bool,
    ) -> Self {
        Self {
            build_id,
            manifest,
            context_dir,
            store,
            output_dir,
            keep_work,
            layout: None,
            stage_outputs: HashMap::new(),
            guard: CleanupGuard::new(),
            image_output: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_armed_guard_discards_state() {
        let temp_dir = TempDir::new().unwrap();
        let layout = BuildLayout::new(temp_dir.path().join("work"));
        layout.prepare().unwrap();
        let artifact = temp_dir.path().join("partial.tar.gz");
        std::fs::write(&artifact, b"partial").unwrap();

        {
            let mut guard = CleanupGuard::new();
            guard.set_layout(layout.clone());
            guard.add_artifact(artifact.clone());
        }

        assert!(!layout.root().exists());
        assert!(!artifact.exists());
    }

    #[test]
    fn test_disarmed_guard_keeps_state() {
        let temp_dir = TempDir::new().unwrap();
        let layout = BuildLayout::new(temp_dir.path().join("work"));
        layout.prepare().unwrap();

        {
            let mut guard = CleanupGuard::new();
            guard.set_layout(layout.clone());
            guard.disarm();
        }

        assert!(layout.root().exists());
    }

    #[test]
    fn test_build_ids_are_unique() {
        assert_ne!(generate_build_id(), generate_build_id());
    }
}
