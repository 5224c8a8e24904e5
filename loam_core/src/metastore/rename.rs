//! Parallel file-rename pipeline.
//!
//! Commit moves staged files into place with one rename task per file,
//! running on a bounded thread pool. Tasks check a shared cancel flag before
//! touching the filesystem, so a rollback can stop not-yet-started work
//! cheaply. Completion handles stay with the caller: `join_all` propagates
//! the first failure and leaves the remaining handles joinable, and
//! `join_all_quiet` drains everything suppressing failures - the rollback
//! path must let renames quiesce before any directory cleanup.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};

use rayon::ThreadPool;
use thiserror::Error;

use crate::fs::{Fs, OpContext};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RenameError {
    #[error("Target file {0} already exists")]
    TargetExists(PathBuf),

    #[error("Failed to rename {src} to {target}")]
    Failed { src: PathBuf, target: PathBuf },

    #[error("Rename of {src} to {target} did not report a result")]
    Lost { src: PathBuf, target: PathBuf },
}

/// Completion handle of one submitted rename
pub struct RenameHandle {
    source: PathBuf,
    target: PathBuf,
    receiver: mpsc::Receiver<Result<(), RenameError>>,
}

impl RenameHandle {
    /// Block until the task reports its result
    pub fn join(self) -> Result<(), RenameError> {
        match self.receiver.recv() {
            Ok(result) => result,
            // Worker died without reporting
            Err(_) => Err(RenameError::Lost {
                src: self.source,
                target: self.target,
            }),
        }
    }
}

/// Join every handle, propagating the first failure.
///
/// On failure the remaining handles are left in place so the caller can
/// still quiesce them with `join_all_quiet`.
pub fn join_all(handles: &mut Vec<RenameHandle>) -> Result<(), RenameError> {
    while !handles.is_empty() {
        handles.remove(0).join()?;
    }
    Ok(())
}

/// Join every handle, suppressing all failures
pub fn join_all_quiet(handles: &mut Vec<RenameHandle>) {
    for handle in handles.drain(..) {
        let _ = handle.join();
    }
}

/// Rename executor with cooperative cancellation
pub struct RenamePipeline {
    pool: Arc<ThreadPool>,
    cancel: Arc<AtomicBool>,
}

impl RenamePipeline {
    pub fn new(pool: Arc<ThreadPool>) -> Self {
        Self {
            pool,
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Stop tasks that have not yet touched the filesystem. Running tasks
    /// are not interrupted; they observe the flag at their next check.
    pub fn cancel(&self) {
        self.cancel.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.load(Ordering::SeqCst)
    }

    /// Submit one rename task per file name, `source_dir/f` → `target_dir/f`.
    ///
    /// Submission is fire-and-forget; the returned handles are the only way
    /// to observe completion.
    pub fn submit_file_renames(
        &self,
        fs: &Arc<dyn Fs>,
        ctx: &OpContext,
        source_dir: &Path,
        target_dir: &Path,
        file_names: &[String],
    ) -> Vec<RenameHandle> {
        let mut handles = Vec::with_capacity(file_names.len());
        for file_name in file_names {
            let source = source_dir.join(file_name);
            let target = target_dir.join(file_name);
            let (sender, receiver) = mpsc::channel();

            let fs = Arc::clone(fs);
            let ctx = ctx.clone();
            let cancel = Arc::clone(&self.cancel);
            let task_source = source.clone();
            let task_target = target.clone();
            self.pool.spawn(move || {
                let result = run_rename(fs.as_ref(), &ctx, &cancel, &task_source, &task_target);
                let _ = sender.send(result);
            });

            handles.push(RenameHandle {
                source,
                target,
                receiver,
            });
        }
        handles
    }
}

fn run_rename(
    fs: &dyn Fs,
    ctx: &OpContext,
    cancel: &AtomicBool,
    source: &Path,
    target: &Path,
) -> Result<(), RenameError> {
    if cancel.load(Ordering::SeqCst) {
        return Ok(());
    }
    match fs.exists(ctx, target) {
        Ok(false) => {}
        Ok(true) => return Err(RenameError::TargetExists(target.to_path_buf())),
        Err(_) => {
            return Err(RenameError::Failed {
                src: source.to_path_buf(),
                target: target.to_path_buf(),
            })
        }
    }
    match fs.rename(ctx, source, target) {
        Ok(true) => Ok(()),
        _ => Err(RenameError::Failed {
            src: source.to_path_buf(),
            target: target.to_path_buf(),
        }),
    }
}
