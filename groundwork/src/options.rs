//! User-facing options for builds and bootstrap runs.
//!
//! Options are validated up front with `sanitize()`; nothing downstream
//! re-checks them.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::errors::{GroundworkError, GroundworkResult};
use crate::launch::ServiceLaunchSpec;
use crate::provision::{self, SessionDefaults};

/// Options for one image build.
#[derive(Debug, Clone)]
pub struct BuildOptions {
    /// Build manifest (JSON).
    pub manifest_path: PathBuf,
    /// Build context directory; source copies and base snapshots resolve
    /// against it.
    pub context_dir: PathBuf,
    /// Local package store directory.
    pub package_store: PathBuf,
    /// Where the image and its manifest are written.
    pub output_dir: PathBuf,
    /// Parent directory for per-build working trees.
    pub builds_dir: PathBuf,
    /// Keep the working tree for inspection instead of discarding it.
    pub keep_work: bool,
}

impl BuildOptions {
    pub fn sanitize(&self) -> GroundworkResult<()> {
        if !self.manifest_path.is_file() {
            return Err(GroundworkError::Config(format!(
                "build manifest {} does not exist",
                self.manifest_path.display()
            )));
        }
        if !self.context_dir.is_dir() {
            return Err(GroundworkError::Config(format!(
                "build context {} is not a directory",
                self.context_dir.display()
            )));
        }
        Ok(())
    }
}

fn default_capability_names() -> Vec<String> {
    vec![
        provision::UUID_GENERATION.to_string(),
        provision::VECTOR_SIMILARITY.to_string(),
    ]
}

/// Options for a provision-then-launch bootstrap run.
///
/// Loaded from a JSON file by `groundwork up`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BootstrapOptions {
    /// The service's database.
    pub db_path: PathBuf,
    /// Built-in capability names to ensure before the service starts.
    #[serde(default = "default_capability_names")]
    pub capabilities: Vec<String>,
    #[serde(default = "SessionDefaults::default")]
    pub session: SessionDefaults,
    /// Root the service runs from (an unpacked image tree).
    pub service_root: PathBuf,
    pub launch: ServiceLaunchSpec,
}

impl BootstrapOptions {
    pub fn load(path: &Path) -> GroundworkResult<Self> {
        let data = std::fs::read_to_string(path).map_err(|e| {
            GroundworkError::Config(format!("cannot read {}: {}", path.display(), e))
        })?;
        let options: Self = serde_json::from_str(&data).map_err(|e| {
            GroundworkError::Config(format!("cannot parse {}: {}", path.display(), e))
        })?;
        options.sanitize()?;
        Ok(options)
    }

    pub fn sanitize(&self) -> GroundworkResult<()> {
        if self.capabilities.is_empty() {
            return Err(GroundworkError::Config(
                "bootstrap declares no capabilities".into(),
            ));
        }
        // Fail on unknown names here, not halfway through provisioning.
        provision::resolve_capabilities(&self.capabilities)?;
        if !self.service_root.is_dir() {
            return Err(GroundworkError::Config(format!(
                "service root {} is not a directory",
                self.service_root.display()
            )));
        }
        self.launch.sanitize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_bootstrap_options_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let json = format!(
            r#"{{
                "db_path": "{0}/svc.db",
                "service_root": "{0}",
                "launch": {{"command": "svc"}}
            }}"#,
            temp_dir.path().display()
        );
        let path = temp_dir.path().join("bootstrap.json");
        std::fs::write(&path, json).unwrap();

        let options = BootstrapOptions::load(&path).unwrap();
        assert_eq!(
            options.capabilities,
            vec!["uuid-generation", "vector-similarity"]
        );
    }

    #[test]
    fn test_bootstrap_options_reject_unknown_capability() {
        let temp_dir = TempDir::new().unwrap();
        let json = format!(
            r#"{{
                "db_path": "{0}/svc.db",
                "capabilities": ["time-travel"],
                "service_root": "{0}",
                "launch": {{"command": "svc"}}
            }}"#,
            temp_dir.path().display()
        );
        let path = temp_dir.path().join("bootstrap.json");
        std::fs::write(&path, json).unwrap();

        let err = BootstrapOptions::load(&path).unwrap_err();
        assert!(matches!(err, GroundworkError::Config(_)));
    }

    #[test]
    fn test_build_options_sanitize() {
        let temp_dir = TempDir::new().unwrap();
        let manifest_path = temp_dir.path().join("build.json");
        std::fs::write(&manifest_path, "{}").unwrap();

        let mut options = BuildOptions {
            manifest_path,
            context_dir: temp_dir.path().to_path_buf(),
            package_store: temp_dir.path().join("store"),
            output_dir: temp_dir.path().join("dist"),
            builds_dir: temp_dir.path().join("builds"),
            keep_work: false,
        };
        options.sanitize().unwrap();

        options.context_dir = temp_dir.path().join("missing");
        assert!(options.sanitize().is_err());
    }
}
