//! Filesystem contract used by the metastore coordinator.
//!
//! The coordinator only needs primitive operations: `exists`, `rename`,
//! `delete`, `mkdirs` and `list_status`. Real deployments back this trait
//! with a remote filesystem client; `LocalFs` backs it with `std::fs` for
//! local use and tests.

pub mod error;
pub mod local;

use std::path::{Path, PathBuf};

pub use error::FsError;
pub use local::LocalFs;

/// Identity under which catalog and filesystem operations run.
///
/// Carried by every buffered action so that commit-time filesystem work is
/// performed with the credentials of the session that staged it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpContext {
    /// User the operation runs as
    pub user: String,

    /// Query that staged the operation
    pub query_id: String,
}

impl OpContext {
    pub fn new(user: impl Into<String>, query_id: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            query_id: query_id.into(),
        }
    }
}

/// Status of a single directory entry, as reported by `Fs::list_status`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileStatus {
    pub path: PathBuf,
    pub is_file: bool,
    pub is_directory: bool,
}

impl FileStatus {
    /// Final component of the entry path, empty if the path has none
    pub fn name(&self) -> &str {
        self.path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("")
    }
}

/// Primitive filesystem operations.
///
/// `rename` and `delete` report soft failure by returning `false` rather
/// than an error; callers decide whether a soft failure is fatal. Deleting a
/// path that does not exist counts as success.
pub trait Fs: Send + Sync {
    fn exists(&self, ctx: &OpContext, path: &Path) -> Result<bool, FsError>;

    /// Create a directory and all missing parents
    fn mkdirs(&self, ctx: &OpContext, path: &Path) -> Result<bool, FsError>;

    /// Rename `source` to `target`. Returns `false` if the source is
    /// missing, the target already exists, or the filesystem refused.
    fn rename(&self, ctx: &OpContext, source: &Path, target: &Path) -> Result<bool, FsError>;

    /// Delete a path. A missing path counts as success; a non-empty
    /// directory with `recursive = false` is a soft failure.
    fn delete(&self, ctx: &OpContext, path: &Path, recursive: bool) -> Result<bool, FsError>;

    /// List the entries of a directory. A missing directory is
    /// `FsError::NotFound`.
    fn list_status(&self, ctx: &OpContext, dir: &Path) -> Result<Vec<FileStatus>, FsError>;
}
