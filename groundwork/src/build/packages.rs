//! Dependency manifests and the local package store.
//!
//! Dependency manifests are requirements-style text: one `name==version` per
//! line, with `#` comments and blank lines ignored. Packages resolve against
//! a local store laid out as `<store>/<name>-<version>/`; build-time tool
//! packages may also live under their bare name.

use std::path::{Path, PathBuf};

use crate::errors::{GroundworkError, GroundworkResult};
use crate::util::copy_tree;

/// One pinned dependency.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencySpec {
    pub name: String,
    pub version: String,
}

impl DependencySpec {
    fn store_dir_name(&self) -> String {
        format!("{}-{}", self.name, self.version)
    }
}

impl std::fmt::Display for DependencySpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}=={}", self.name, self.version)
    }
}

/// Parse a requirements-style dependency manifest.
pub fn parse_manifest(text: &str) -> GroundworkResult<Vec<DependencySpec>> {
    let mut specs = Vec::new();

    for (lineno, raw) in text.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let (name, version) = line.split_once("==").ok_or_else(|| {
            GroundworkError::Manifest(format!(
                "dependency manifest line {}: expected name==version, got '{}'",
                lineno + 1,
                line
            ))
        })?;
        let (name, version) = (name.trim(), version.trim());
        if name.is_empty() || version.is_empty() {
            return Err(GroundworkError::Manifest(format!(
                "dependency manifest line {}: empty name or version",
                lineno + 1
            )));
        }

        specs.push(DependencySpec {
            name: name.to_string(),
            version: version.to_string(),
        });
    }

    Ok(specs)
}

/// A directory of pre-fetched packages.
#[derive(Debug, Clone)]
pub struct PackageStore {
    root: PathBuf,
}

impl PackageStore {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve a pinned dependency to its package directory.
    pub fn resolve(&self, spec: &DependencySpec) -> Option<PathBuf> {
        let dir = self.root.join(spec.store_dir_name());
        dir.is_dir().then_some(dir)
    }

    /// Resolve and install every dependency into `dest/<name>/`.
    ///
    /// Resolution is all-or-nothing: the first unresolvable package fails
    /// the build with no partial install treated as valid.
    pub fn install_all(
        &self,
        stage: &str,
        specs: &[DependencySpec],
        dest: &Path,
    ) -> GroundworkResult<Vec<DependencySpec>> {
        for spec in specs {
            let src = self.resolve(spec).ok_or_else(|| {
                GroundworkError::DependencyResolution {
                    stage: stage.to_string(),
                    reason: format!("package {} not found in store {}", spec, self.root.display()),
                }
            })?;
            copy_tree(&src, &dest.join(&spec.name))?;
        }
        Ok(specs.to_vec())
    }

    /// Install a build-time tool package by bare name.
    ///
    /// Looks for `<store>/<name>/` first, then the newest `<name>-<version>/`
    /// entry ("any available version" semantics).
    pub fn install_tool(&self, stage: &str, name: &str, dest: &Path) -> GroundworkResult<()> {
        let src = self.resolve_tool(name).ok_or_else(|| {
            GroundworkError::DependencyResolution {
                stage: stage.to_string(),
                reason: format!(
                    "tool package '{}' not found in store {}",
                    name,
                    self.root.display()
                ),
            }
        })?;
        copy_tree(&src, &dest.join(name))
    }

    fn resolve_tool(&self, name: &str) -> Option<PathBuf> {
        let exact = self.root.join(name);
        if exact.is_dir() {
            return Some(exact);
        }

        let prefix = format!("{}-", name);
        let mut candidates: Vec<PathBuf> = std::fs::read_dir(&self.root)
            .ok()?
            .flatten()
            .filter(|entry| {
                entry.file_type().is_ok_and(|t| t.is_dir())
                    && entry.file_name().to_string_lossy().starts_with(&prefix)
            })
            .map(|entry| entry.path())
            .collect();
        candidates.sort();
        candidates.pop()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn spec(name: &str, version: &str) -> DependencySpec {
        DependencySpec {
            name: name.to_string(),
            version: version.to_string(),
        }
    }

    #[test]
    fn test_parse_manifest() {
        let text = "
# web framework
fastwork==0.2.1

orm-light == 1.4.0
";
        let specs = parse_manifest(text).unwrap();
        assert_eq!(specs, vec![spec("fastwork", "0.2.1"), spec("orm-light", "1.4.0")]);
    }

    #[test]
    fn test_parse_manifest_rejects_unpinned() {
        let err = parse_manifest("fastwork>=0.2").unwrap_err();
        assert!(matches!(err, GroundworkError::Manifest(_)));

        let err = parse_manifest("fastwork==").unwrap_err();
        assert!(matches!(err, GroundworkError::Manifest(_)));
    }

    #[test]
    fn test_install_all_copies_packages() {
        let temp_dir = TempDir::new().unwrap();
        let store_root = temp_dir.path().join("store");
        fs::create_dir_all(store_root.join("fastwork-0.2.1")).unwrap();
        fs::write(store_root.join("fastwork-0.2.1/lib.txt"), b"code").unwrap();

        let store = PackageStore::new(store_root);
        let dest = temp_dir.path().join("deps");
        store
            .install_all("deps", &[spec("fastwork", "0.2.1")], &dest)
            .unwrap();

        assert_eq!(fs::read(dest.join("fastwork/lib.txt")).unwrap(), b"code");
    }

    #[test]
    fn test_install_all_fails_on_missing_package() {
        let temp_dir = TempDir::new().unwrap();
        let store = PackageStore::new(temp_dir.path().to_path_buf());

        let err = store
            .install_all("deps", &[spec("ghost", "9.9")], &temp_dir.path().join("deps"))
            .unwrap_err();

        assert!(matches!(
            err,
            GroundworkError::DependencyResolution { ref stage, .. } if stage == "deps"
        ));
    }

    #[test]
    fn test_resolve_tool_prefers_exact_then_newest() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        fs::create_dir_all(root.join("cc-1.0")).unwrap();
        fs::create_dir_all(root.join("cc-2.0")).unwrap();

        let store = PackageStore::new(root.to_path_buf());
        assert_eq!(store.resolve_tool("cc"), Some(root.join("cc-2.0")));

        fs::create_dir_all(root.join("cc")).unwrap();
        assert_eq!(store.resolve_tool("cc"), Some(root.join("cc")));

        assert_eq!(store.resolve_tool("ld"), None);
    }
}
