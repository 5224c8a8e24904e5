//! Local filesystem backend over `std::fs`.

use std::fs;
use std::path::Path;

use super::error::FsError;
use super::{FileStatus, Fs, OpContext};

/// `Fs` implementation over the local filesystem.
///
/// The `OpContext` identity is accepted but not enforced; local processes
/// run as a single OS user.
#[derive(Debug, Default)]
pub struct LocalFs;

impl LocalFs {
    pub fn new() -> Self {
        Self
    }
}

impl Fs for LocalFs {
    fn exists(&self, _ctx: &OpContext, path: &Path) -> Result<bool, FsError> {
        Ok(path.exists())
    }

    fn mkdirs(&self, _ctx: &OpContext, path: &Path) -> Result<bool, FsError> {
        match fs::create_dir_all(path) {
            Ok(()) => Ok(true),
            Err(_) => Ok(false),
        }
    }

    fn rename(&self, _ctx: &OpContext, source: &Path, target: &Path) -> Result<bool, FsError> {
        // std::fs::rename overwrites existing files; refuse instead, matching
        // the contract that a present target is a soft failure.
        if !source.exists() || target.exists() {
            return Ok(false);
        }
        Ok(fs::rename(source, target).is_ok())
    }

    fn delete(&self, _ctx: &OpContext, path: &Path, recursive: bool) -> Result<bool, FsError> {
        let metadata = match fs::symlink_metadata(path) {
            Ok(m) => m,
            // Missing path counts as success
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(true),
            Err(_) => return Ok(false),
        };

        let result = if metadata.is_dir() {
            if recursive {
                fs::remove_dir_all(path)
            } else {
                fs::remove_dir(path)
            }
        } else {
            fs::remove_file(path)
        };

        match result {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(true),
            Err(_) => Ok(false),
        }
    }

    fn list_status(&self, _ctx: &OpContext, dir: &Path) -> Result<Vec<FileStatus>, FsError> {
        let entries = match fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(FsError::NotFound(dir.to_path_buf()));
            }
            Err(e) => return Err(e.into()),
        };

        let mut statuses = Vec::new();
        for entry in entries {
            let entry = entry?;
            let file_type = entry.file_type()?;
            statuses.push(FileStatus {
                path: entry.path(),
                is_file: file_type.is_file(),
                is_directory: file_type.is_dir(),
            });
        }
        Ok(statuses)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn ctx() -> OpContext {
        OpContext::new("tester", "q1")
    }

    #[test]
    fn test_exists_and_mkdirs() {
        let temp = TempDir::new().unwrap();
        let fs = LocalFs::new();
        let dir = temp.path().join("a/b/c");

        assert!(!fs.exists(&ctx(), &dir).unwrap());
        assert!(fs.mkdirs(&ctx(), &dir).unwrap());
        assert!(fs.exists(&ctx(), &dir).unwrap());
    }

    #[test]
    fn test_rename_refuses_existing_target() {
        let temp = TempDir::new().unwrap();
        let fs = LocalFs::new();
        let source = temp.path().join("source");
        let target = temp.path().join("target");
        std::fs::write(&source, b"data").unwrap();
        std::fs::write(&target, b"other").unwrap();

        assert!(!fs.rename(&ctx(), &source, &target).unwrap());
        // Both untouched
        assert!(source.exists());
        assert_eq!(std::fs::read(&target).unwrap(), b"other");
    }

    #[test]
    fn test_rename_moves_file() {
        let temp = TempDir::new().unwrap();
        let fs = LocalFs::new();
        let source = temp.path().join("source");
        let target = temp.path().join("target");
        std::fs::write(&source, b"data").unwrap();

        assert!(fs.rename(&ctx(), &source, &target).unwrap());
        assert!(!source.exists());
        assert_eq!(std::fs::read(&target).unwrap(), b"data");
    }

    #[test]
    fn test_rename_missing_source() {
        let temp = TempDir::new().unwrap();
        let fs = LocalFs::new();
        let source = temp.path().join("missing");
        let target = temp.path().join("target");

        assert!(!fs.rename(&ctx(), &source, &target).unwrap());
    }

    #[test]
    fn test_delete_missing_is_success() {
        let temp = TempDir::new().unwrap();
        let fs = LocalFs::new();

        assert!(fs.delete(&ctx(), &temp.path().join("nope"), false).unwrap());
    }

    #[test]
    fn test_delete_non_empty_dir_needs_recursive() {
        let temp = TempDir::new().unwrap();
        let fs = LocalFs::new();
        let dir = temp.path().join("dir");
        std::fs::create_dir(&dir).unwrap();
        std::fs::write(dir.join("file"), b"x").unwrap();

        assert!(!fs.delete(&ctx(), &dir, false).unwrap());
        assert!(dir.exists());
        assert!(fs.delete(&ctx(), &dir, true).unwrap());
        assert!(!dir.exists());
    }

    #[test]
    fn test_list_status() {
        let temp = TempDir::new().unwrap();
        let fs = LocalFs::new();
        std::fs::write(temp.path().join("file"), b"x").unwrap();
        std::fs::create_dir(temp.path().join("dir")).unwrap();

        let mut statuses = fs.list_status(&ctx(), temp.path()).unwrap();
        statuses.sort_by(|a, b| a.path.cmp(&b.path));
        assert_eq!(statuses.len(), 2);
        assert!(statuses.iter().any(|s| s.name() == "file" && s.is_file));
        assert!(statuses.iter().any(|s| s.name() == "dir" && s.is_directory));
    }

    #[test]
    fn test_list_status_missing_dir() {
        let temp = TempDir::new().unwrap();
        let fs = LocalFs::new();

        let result = fs.list_status(&ctx(), &temp.path().join("nope"));
        assert!(matches!(result, Err(FsError::NotFound(_))));
    }
}
