//! Coordinator configuration.

/// Tunables of the transactional metastore buffer
#[derive(Debug, Clone)]
pub struct MetastoreConfig {
    /// Keep the renamed-aside directory after a successful in-place alter
    /// instead of deleting it
    pub skip_deletion_for_alter: bool,

    /// Keep the target directory of a DIRECT_NEW write intent on rollback
    pub skip_target_cleanup_on_rollback: bool,

    /// Partitions per catalog add-partitions call
    pub partition_commit_batch_size: usize,

    /// Threads in the file-rename pool
    pub rename_threads: usize,

    /// Raise cleanup failures instead of logging them. Tests use this to
    /// make silently lost cleanup visible; production keeps it off.
    pub fail_on_cleanup_error: bool,
}

impl Default for MetastoreConfig {
    fn default() -> Self {
        Self {
            skip_deletion_for_alter: false,
            skip_target_cleanup_on_rollback: false,
            partition_commit_batch_size: 8,
            rename_threads: 8,
            fail_on_cleanup_error: false,
        }
    }
}

impl MetastoreConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_skip_deletion_for_alter(mut self, skip: bool) -> Self {
        self.skip_deletion_for_alter = skip;
        self
    }

    pub fn with_skip_target_cleanup_on_rollback(mut self, skip: bool) -> Self {
        self.skip_target_cleanup_on_rollback = skip;
        self
    }

    pub fn with_partition_commit_batch_size(mut self, batch_size: usize) -> Self {
        self.partition_commit_batch_size = batch_size;
        self
    }

    pub fn with_rename_threads(mut self, threads: usize) -> Self {
        self.rename_threads = threads;
        self
    }

    pub fn with_fail_on_cleanup_error(mut self, fail: bool) -> Self {
        self.fail_on_cleanup_error = fail;
        self
    }
}
