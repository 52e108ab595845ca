//! Artifact handling: deterministic tree digests and image packing.
//!
//! Both the digest and the archive walk entries in sorted order and strip
//! everything environment-dependent (timestamps, ownership, umask bits), so
//! an unchanged input tree reproduces byte-identical output.

use std::fs::{self, File};
use std::io::Write;
use std::path::Path;

use flate2::Compression;
use flate2::write::GzEncoder;
use sha2::{Digest, Sha256};
use walkdir::WalkDir;

use crate::errors::{GroundworkError, GroundworkResult};

/// Compute a deterministic SHA-256 digest of a directory tree.
///
/// The digest covers relative paths and file contents only.
pub fn digest_tree(root: &Path) -> GroundworkResult<String> {
    let mut hasher = Sha256::new();

    for entry in WalkDir::new(root).sort_by_file_name() {
        let entry = entry
            .map_err(|e| GroundworkError::Storage(format!("walk {}: {}", root.display(), e)))?;
        let rel = entry.path().strip_prefix(root).map_err(|e| {
            GroundworkError::Internal(format!("path escaped digest root: {}", e))
        })?;
        if rel.as_os_str().is_empty() {
            continue;
        }

        hasher.update(rel.to_string_lossy().as_bytes());
        hasher.update([0u8]);
        if entry.file_type().is_file() {
            hasher.update(fs::read(entry.path())?);
            hasher.update([0u8]);
        }
    }

    Ok(hex::encode(hasher.finalize()))
}

/// Pack `root` into a deterministic gzipped tarball at `dest`.
///
/// Returns the archive size in bytes.
pub fn pack_image(root: &Path, dest: &Path) -> GroundworkResult<u64> {
    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent)?;
    }

    let file = File::create(dest)?;
    let encoder = GzEncoder::new(file, Compression::default());
    let mut builder = tar::Builder::new(encoder);

    for entry in WalkDir::new(root).sort_by_file_name() {
        let entry = entry
            .map_err(|e| GroundworkError::Storage(format!("walk {}: {}", root.display(), e)))?;
        let rel = entry.path().strip_prefix(root).map_err(|e| {
            GroundworkError::Internal(format!("path escaped archive root: {}", e))
        })?;
        if rel.as_os_str().is_empty() {
            continue;
        }

        let mut header = tar::Header::new_gnu();
        header.set_mtime(0);
        header.set_uid(0);
        header.set_gid(0);

        if entry.file_type().is_dir() {
            header.set_entry_type(tar::EntryType::Directory);
            header.set_size(0);
            header.set_mode(0o755);
            builder
                .append_data(&mut header, rel, std::io::empty())
                .map_err(|e| GroundworkError::Storage(format!("archive {}: {}", rel.display(), e)))?;
        } else {
            let data = fs::read(entry.path())?;
            header.set_entry_type(tar::EntryType::Regular);
            header.set_size(data.len() as u64);
            header.set_mode(if is_executable(entry.path()) { 0o755 } else { 0o644 });
            builder
                .append_data(&mut header, rel, data.as_slice())
                .map_err(|e| GroundworkError::Storage(format!("archive {}: {}", rel.display(), e)))?;
        }
    }

    let encoder = builder
        .into_inner()
        .map_err(|e| GroundworkError::Storage(format!("finalize archive: {}", e)))?;
    let mut file = encoder
        .finish()
        .map_err(|e| GroundworkError::Storage(format!("finalize archive: {}", e)))?;
    file.flush()?;

    Ok(fs::metadata(dest)?.len())
}

/// List the entry paths of a packed image, sorted.
pub fn list_image(image: &Path) -> GroundworkResult<Vec<String>> {
    let file = File::open(image)?;
    let decoder = flate2::read::GzDecoder::new(file);
    let mut archive = tar::Archive::new(decoder);

    let mut paths = Vec::new();
    for entry in archive
        .entries()
        .map_err(|e| GroundworkError::Storage(format!("read archive: {}", e)))?
    {
        let entry = entry.map_err(|e| GroundworkError::Storage(format!("read archive: {}", e)))?;
        let path = entry
            .path()
            .map_err(|e| GroundworkError::Storage(format!("read archive: {}", e)))?;
        paths.push(path.to_string_lossy().into_owned());
    }
    paths.sort();
    Ok(paths)
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    fs::metadata(path).is_ok_and(|m| m.permissions().mode() & 0o111 != 0)
}

#[cfg(not(unix))]
fn is_executable(_path: &Path) -> bool {
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn sample_tree(root: &Path) {
        fs::create_dir_all(root.join("app")).unwrap();
        fs::write(root.join("app/main.txt"), b"entry").unwrap();
        fs::write(root.join("top.txt"), b"top").unwrap();
    }

    #[test]
    fn test_digest_is_stable() {
        let temp_dir = TempDir::new().unwrap();
        sample_tree(temp_dir.path());

        let first = digest_tree(temp_dir.path()).unwrap();
        let second = digest_tree(temp_dir.path()).unwrap();
        assert_eq!(first, second);
        assert_eq!(first.len(), 64);
    }

    #[test]
    fn test_digest_tracks_content() {
        let temp_dir = TempDir::new().unwrap();
        sample_tree(temp_dir.path());
        let before = digest_tree(temp_dir.path()).unwrap();

        fs::write(temp_dir.path().join("top.txt"), b"changed").unwrap();
        let after = digest_tree(temp_dir.path()).unwrap();
        assert_ne!(before, after);
    }

    #[test]
    fn test_pack_is_byte_identical_across_runs() {
        let temp_dir = TempDir::new().unwrap();
        let tree = temp_dir.path().join("tree");
        fs::create_dir_all(&tree).unwrap();
        sample_tree(&tree);

        let first = temp_dir.path().join("a.tar.gz");
        let second = temp_dir.path().join("b.tar.gz");
        pack_image(&tree, &first).unwrap();
        pack_image(&tree, &second).unwrap();

        assert_eq!(fs::read(&first).unwrap(), fs::read(&second).unwrap());
    }

    #[test]
    fn test_list_image_round_trip() {
        let temp_dir = TempDir::new().unwrap();
        let tree = temp_dir.path().join("tree");
        fs::create_dir_all(&tree).unwrap();
        sample_tree(&tree);

        let image = temp_dir.path().join("image.tar.gz");
        pack_image(&tree, &image).unwrap();

        let entries = list_image(&image).unwrap();
        assert_eq!(entries, vec!["app", "app/main.txt", "top.txt"]);
    }
}
