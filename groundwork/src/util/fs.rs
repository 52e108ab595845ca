//! Recursive copy helpers used by the build and launch paths.

use std::fs;
use std::path::Path;

use filetime::FileTime;
use walkdir::WalkDir;

use crate::errors::{GroundworkError, GroundworkResult};

/// Copy `src` into `dest`.
///
/// `src` may be a file or a directory tree. Parent directories of `dest` are
/// created as needed, and file modification times are preserved.
pub fn copy_path(src: &Path, dest: &Path) -> GroundworkResult<()> {
    if src.is_dir() {
        copy_tree(src, dest)
    } else {
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)?;
        }
        copy_file(src, dest)
    }
}

/// Recursively copy the directory tree rooted at `src` into `dest`.
pub fn copy_tree(src: &Path, dest: &Path) -> GroundworkResult<()> {
    for entry in WalkDir::new(src).follow_links(true) {
        let entry = entry
            .map_err(|e| GroundworkError::Storage(format!("walk {}: {}", src.display(), e)))?;
        let rel = entry.path().strip_prefix(src).map_err(|e| {
            GroundworkError::Internal(format!("path {} escaped walk root: {}", src.display(), e))
        })?;
        let target = dest.join(rel);

        if entry.file_type().is_dir() {
            fs::create_dir_all(&target)?;
        } else {
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent)?;
            }
            copy_file(entry.path(), &target)?;
        }
    }
    Ok(())
}

fn copy_file(src: &Path, dest: &Path) -> GroundworkResult<()> {
    fs::copy(src, dest)?;
    let meta = fs::metadata(src)?;
    filetime::set_file_mtime(dest, FileTime::from_last_modification_time(&meta))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_copy_tree_preserves_structure() {
        let temp_dir = TempDir::new().unwrap();
        let src = temp_dir.path().join("src");
        fs::create_dir_all(src.join("nested/deep")).unwrap();
        fs::write(src.join("top.txt"), b"top").unwrap();
        fs::write(src.join("nested/deep/leaf.txt"), b"leaf").unwrap();

        let dest = temp_dir.path().join("dest");
        copy_tree(&src, &dest).unwrap();

        assert_eq!(fs::read(dest.join("top.txt")).unwrap(), b"top");
        assert_eq!(fs::read(dest.join("nested/deep/leaf.txt")).unwrap(), b"leaf");
    }

    #[test]
    fn test_copy_path_single_file_creates_parents() {
        let temp_dir = TempDir::new().unwrap();
        let src = temp_dir.path().join("file.txt");
        fs::write(&src, b"data").unwrap();

        let dest = temp_dir.path().join("a/b/file.txt");
        copy_path(&src, &dest).unwrap();

        assert_eq!(fs::read(&dest).unwrap(), b"data");
    }

    #[test]
    fn test_copy_file_preserves_mtime() {
        let temp_dir = TempDir::new().unwrap();
        let src = temp_dir.path().join("file.txt");
        fs::write(&src, b"data").unwrap();
        filetime::set_file_mtime(&src, FileTime::from_unix_time(1_000_000, 0)).unwrap();

        let dest = temp_dir.path().join("copy.txt");
        copy_path(&src, &dest).unwrap();

        let meta = fs::metadata(&dest).unwrap();
        assert_eq!(FileTime::from_last_modification_time(&meta).unix_seconds(), 1_000_000);
    }
}
