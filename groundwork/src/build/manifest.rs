//! Build manifest: the declared stage graph and launch spec.
//!
//! Validation treats the manifest as a build graph with declared edges:
//! imports may only reference earlier stages, and only paths those stages
//! export. Ordering or coverage violations are manifest bugs caught before
//! any stage runs.

use std::collections::HashSet;
use std::path::{Component, Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::errors::{GroundworkError, GroundworkResult};
use crate::launch::ServiceLaunchSpec;

/// Base environment for a stage.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BaseEnv {
    /// Empty stage directory.
    #[default]
    Scratch,
    /// Seed the stage from a directory snapshot in the build context.
    Snapshot { path: PathBuf },
}

/// One copy from a prior stage's exported artifacts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportSpec {
    pub from_stage: String,
    /// Path relative to the exporting stage root.
    pub source: PathBuf,
    /// Destination within this stage; defaults to `source`.
    #[serde(default)]
    pub dest: Option<PathBuf>,
}

impl ImportSpec {
    pub fn dest_path(&self) -> &Path {
        self.dest.as_deref().unwrap_or(&self.source)
    }
}

/// One copy from the build context into the stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceCopy {
    pub from: PathBuf,
    /// Destination within the stage; defaults to `from`.
    #[serde(default)]
    pub to: Option<PathBuf>,
}

impl SourceCopy {
    pub fn to_path(&self) -> &Path {
        self.to.as_deref().unwrap_or(&self.from)
    }
}

fn default_install_dir() -> PathBuf {
    PathBuf::from(".local")
}

/// Declared dependency installation for a stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DependencyInstall {
    /// Dependency manifest path, relative to the stage root (so it must be
    /// copied in first).
    pub manifest: PathBuf,
    /// User-scoped install location within the stage.
    #[serde(default = "default_install_dir")]
    pub install_dir: PathBuf,
}

/// A declared build stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageSpec {
    pub name: String,
    #[serde(default)]
    pub base: BaseEnv,
    /// Build-time toolchain packages, installed under `toolchain/`. Never
    /// exported implicitly.
    #[serde(default)]
    pub system_packages: Vec<String>,
    /// Artifacts copied from earlier stages' exports.
    #[serde(default)]
    pub imports: Vec<ImportSpec>,
    /// Application source copied from the build context.
    #[serde(default)]
    pub source: Vec<SourceCopy>,
    #[serde(default)]
    pub dependencies: Option<DependencyInstall>,
    /// The carried-forward artifact manifest. Only these paths cross the
    /// stage boundary; everything else is discarded with the stage.
    #[serde(default)]
    pub exports: Vec<PathBuf>,
}

/// The whole build manifest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildManifest {
    pub name: String,
    pub stages: Vec<StageSpec>,
    pub launch: ServiceLaunchSpec,
}

impl BuildManifest {
    /// Load and validate a manifest from a JSON file.
    pub fn load(path: &Path) -> GroundworkResult<Self> {
        let data = std::fs::read_to_string(path).map_err(|e| {
            GroundworkError::Manifest(format!("cannot read {}: {}", path.display(), e))
        })?;
        let manifest: Self = serde_json::from_str(&data).map_err(|e| {
            GroundworkError::Manifest(format!("cannot parse {}: {}", path.display(), e))
        })?;
        manifest.validate()?;
        Ok(manifest)
    }

    /// The final stage: the one whose tree becomes the image.
    pub fn final_stage(&self) -> &StageSpec {
        self.stages.last().expect("validated manifest has stages")
    }

    /// Validate the stage graph and launch wiring.
    pub fn validate(&self) -> GroundworkResult<()> {
        if self.name.is_empty() {
            return Err(GroundworkError::Manifest("image name is empty".into()));
        }
        if self.stages.is_empty() {
            return Err(GroundworkError::Manifest(
                "manifest declares no stages".into(),
            ));
        }

        let mut seen: HashSet<&str> = HashSet::new();
        for stage in &self.stages {
            if stage.name.is_empty() {
                return Err(GroundworkError::Manifest("stage with empty name".into()));
            }
            if !seen.insert(&stage.name) {
                return Err(GroundworkError::Manifest(format!(
                    "duplicate stage name '{}'",
                    stage.name
                )));
            }
        }

        for (index, stage) in self.stages.iter().enumerate() {
            self.validate_stage(index, stage)?;
        }

        self.launch.sanitize()?;
        self.validate_launch_wiring()?;

        Ok(())
    }

    fn validate_stage(&self, index: usize, stage: &StageSpec) -> GroundworkResult<()> {
        for export in &stage.exports {
            ensure_relative(&stage.name, export)?;
        }
        for copy in &stage.source {
            ensure_relative(&stage.name, &copy.from)?;
            ensure_relative(&stage.name, copy.to_path())?;
        }
        if let Some(deps) = &stage.dependencies {
            ensure_relative(&stage.name, &deps.manifest)?;
            ensure_relative(&stage.name, &deps.install_dir)?;
        }

        for import in &stage.imports {
            ensure_relative(&stage.name, &import.source)?;
            ensure_relative(&stage.name, import.dest_path())?;

            let from_index = self
                .stages
                .iter()
                .position(|s| s.name == import.from_stage)
                .ok_or_else(|| {
                    GroundworkError::Manifest(format!(
                        "stage '{}' imports from unknown stage '{}'",
                        stage.name, import.from_stage
                    ))
                })?;
            if from_index >= index {
                return Err(GroundworkError::Manifest(format!(
                    "stage '{}' imports from stage '{}' which does not precede it",
                    stage.name, import.from_stage
                )));
            }

            // Only declared carried-forward artifacts cross a stage boundary.
            let exporter = &self.stages[from_index];
            let covered = exporter
                .exports
                .iter()
                .any(|export| import.source.starts_with(export));
            if !covered {
                return Err(GroundworkError::Manifest(format!(
                    "stage '{}' imports '{}' which stage '{}' does not export",
                    stage.name,
                    import.source.display(),
                    import.from_stage
                )));
            }
        }

        Ok(())
    }

    /// The final stage's carried-forward artifacts must be visible on the
    /// launch module path, or the service cannot resolve them at start.
    fn validate_launch_wiring(&self) -> GroundworkResult<()> {
        let final_stage = self.final_stage();
        for import in &final_stage.imports {
            let dest = import.dest_path();
            let wired = self
                .launch
                .module_path
                .iter()
                .any(|entry| entry.starts_with(dest) || dest.starts_with(entry));
            if !wired {
                return Err(GroundworkError::Manifest(format!(
                    "carried-forward artifact '{}' is not on the launch module path",
                    dest.display()
                )));
            }
        }
        Ok(())
    }
}

fn ensure_relative(stage: &str, path: &Path) -> GroundworkResult<()> {
    if path.as_os_str().is_empty() {
        return Err(GroundworkError::Manifest(format!(
            "stage '{}': empty path",
            stage
        )));
    }
    if path.is_absolute() {
        return Err(GroundworkError::Manifest(format!(
            "stage '{}': path {} must be relative",
            stage,
            path.display()
        )));
    }
    if path.components().any(|c| matches!(c, Component::ParentDir)) {
        return Err(GroundworkError::Manifest(format!(
            "stage '{}': path {} must not escape the stage",
            stage,
            path.display()
        )));
    }
    Ok(())
}
