//! Scope-limited recursive delete.
//!
//! Cleanup after a query must only remove what the query wrote. A regular
//! file is eligible for deletion iff its name starts or ends with one of the
//! given query ids; hidden (dot-prefixed) names - which include the engine's
//! own `.loam*` files - are never deleted and never descended into. Listing
//! and delete failures are captured in the result instead of thrown so that
//! cleanup keeps going.

use std::path::Path;

use tracing::warn;

use crate::fs::{Fs, OpContext};

use super::error::MetastoreError;

/// Engine-internal file prefix; such names are never touched by cleanup
pub const RESERVED_PREFIX: &str = ".loam";

/// Outcome of a predicate delete
#[derive(Debug, Clone)]
pub struct RecursiveDeleteResult {
    /// Whether the directory itself is gone afterwards
    pub directory_no_longer_exists: bool,
    /// Eligible items that could not be deleted
    pub not_deleted: Vec<String>,
}

impl RecursiveDeleteResult {
    fn gone() -> Self {
        Self {
            directory_no_longer_exists: true,
            not_deleted: Vec::new(),
        }
    }

    fn unlisted(directory: &Path) -> Self {
        Self {
            directory_no_longer_exists: false,
            not_deleted: vec![format!("{}/**", directory.display())],
        }
    }
}

fn is_hidden(name: &str) -> bool {
    name.starts_with('.')
}

/// Whether a file written by one of `query_ids` may be deleted.
///
/// An empty id set makes nothing eligible; the empty string id makes
/// everything (non-hidden) eligible.
fn is_eligible(name: &str, query_ids: &[String]) -> bool {
    if is_hidden(name) {
        return false;
    }
    query_ids
        .iter()
        .any(|id| name.starts_with(id.as_str()) || name.ends_with(id.as_str()))
}

/// Delete the files under `directory` written by the given query ids.
///
/// With `delete_empty_directories`, a directory whose descendants were all
/// deleted is removed as well, `directory` itself included.
pub fn recursive_delete_files(
    fs: &dyn Fs,
    ctx: &OpContext,
    directory: &Path,
    query_ids: &[String],
    delete_empty_directories: bool,
) -> RecursiveDeleteResult {
    match fs.exists(ctx, directory) {
        Ok(false) => return RecursiveDeleteResult::gone(),
        Ok(true) => {}
        Err(_) => return RecursiveDeleteResult::unlisted(directory),
    }
    do_recursive_delete(fs, ctx, directory, query_ids, delete_empty_directories)
}

fn do_recursive_delete(
    fs: &dyn Fs,
    ctx: &OpContext,
    directory: &Path,
    query_ids: &[String],
    delete_empty_directories: bool,
) -> RecursiveDeleteResult {
    let entries = match fs.list_status(ctx, directory) {
        Ok(entries) => entries,
        Err(e) if e.is_not_found() => return RecursiveDeleteResult::gone(),
        Err(_) => return RecursiveDeleteResult::unlisted(directory),
    };

    let mut all_descendants_deleted = true;
    let mut not_deleted = Vec::new();

    for entry in entries {
        let name = entry.name().to_string();
        if is_hidden(&name) {
            all_descendants_deleted = false;
            continue;
        }
        if entry.is_file {
            if is_eligible(&name, query_ids) {
                match fs.delete(ctx, &entry.path, false) {
                    Ok(true) => {}
                    _ => {
                        all_descendants_deleted = false;
                        not_deleted.push(entry.path.display().to_string());
                    }
                }
            } else {
                all_descendants_deleted = false;
            }
        } else if entry.is_directory {
            let sub_result =
                do_recursive_delete(fs, ctx, &entry.path, query_ids, delete_empty_directories);
            if !sub_result.directory_no_longer_exists {
                all_descendants_deleted = false;
            }
            not_deleted.extend(sub_result.not_deleted);
        } else {
            all_descendants_deleted = false;
            not_deleted.push(entry.path.display().to_string());
        }
    }

    if all_descendants_deleted && delete_empty_directories {
        return match fs.delete(ctx, directory, false) {
            Ok(true) => RecursiveDeleteResult::gone(),
            _ => RecursiveDeleteResult::unlisted(directory),
        };
    }

    RecursiveDeleteResult {
        directory_no_longer_exists: false,
        not_deleted,
    }
}

/// Record a cleanup failure.
///
/// Cleanup failures never fail the transaction; they are logged and
/// swallowed. With `fail_on_error` (tests only) they surface as errors so
/// that silently lost cleanup is visible.
pub fn log_cleanup_failure(
    fail_on_error: bool,
    message: impl Into<String>,
) -> Result<(), MetastoreError> {
    let message = message.into();
    if fail_on_error {
        return Err(MetastoreError::Filesystem(message));
    }
    warn!("{message}");
    Ok(())
}

/// Predicate delete plus failure reporting in one call
pub fn recursive_delete_files_and_log(
    fs: &dyn Fs,
    ctx: &OpContext,
    directory: &Path,
    query_ids: &[String],
    delete_empty_directories: bool,
    what: &str,
    fail_on_error: bool,
) -> Result<(), MetastoreError> {
    let result =
        recursive_delete_files(fs, ctx, directory, query_ids, delete_empty_directories);
    if !result.not_deleted.is_empty() {
        log_cleanup_failure(
            fail_on_error,
            format!(
                "Error deleting {what}: some items under {} could not be deleted: {:?}",
                directory.display(),
                result.not_deleted
            ),
        )?;
    }
    Ok(())
}
