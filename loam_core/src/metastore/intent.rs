//! Declared intentions to write.
//!
//! Every write declares its staging root and mode before any data lands on
//! disk. The registry is the authority for rollback: it knows which
//! directories may hold this query's files and how aggressively they may be
//! cleaned. Intents are processed in registration order.

use std::path::Path;

use crate::catalog::Catalog;
use crate::fs::Fs;

use super::cleanup::{log_cleanup_failure, recursive_delete_files_and_log};
use super::config::MetastoreConfig;
use super::error::MetastoreError;
use super::types::{WriteIntent, WriteMode};

/// Partition lookups during rollback run in batches of this size
const ROLLBACK_PARTITION_BATCH: usize = 10;

/// Lexical test: is `child` equal to or located under `parent`?
///
/// Compares path components only; the filesystem is never touched.
fn is_same_or_parent(parent: &Path, child: &Path) -> bool {
    child.starts_with(parent)
}

#[derive(Default)]
pub struct WriteIntentRegistry {
    intents: Vec<WriteIntent>,
}

impl WriteIntentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn declare(&mut self, intent: WriteIntent) {
        self.intents.push(intent);
    }

    pub fn intents(&self) -> &[WriteIntent] {
        &self.intents
    }

    pub fn is_empty(&self) -> bool {
        self.intents.is_empty()
    }

    /// Distinct query ids across all declared intents, in declaration order
    pub fn query_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = Vec::new();
        for intent in &self.intents {
            if !ids.contains(&intent.query_id) {
                ids.push(intent.query_id.clone());
            }
        }
        ids
    }

    /// Remove this query's files from every declared staging/target area.
    ///
    /// Runs on rollback (and on the failure path of commit, after the
    /// catalog undos). Cleanup continues past individual failures; with the
    /// test-only fail flag the first failure surfaces instead.
    pub fn rollback_cleanup(
        &self,
        catalog: &dyn Catalog,
        fs: &dyn Fs,
        config: &MetastoreConfig,
    ) -> Result<(), MetastoreError> {
        for intent in &self.intents {
            match intent.mode {
                WriteMode::StageAndMove | WriteMode::DirectNew => {
                    if intent.mode == WriteMode::DirectNew && config.skip_target_cleanup_on_rollback
                    {
                        continue;
                    }
                    recursive_delete_files_and_log(
                        fs,
                        &intent.ctx,
                        &intent.root_path,
                        std::slice::from_ref(&intent.query_id),
                        true,
                        &format!("staging directory rollback for table {}", intent.table),
                        config.fail_on_cleanup_error,
                    )?;
                }
                WriteMode::DirectExisting => {
                    self.rollback_direct_existing(catalog, fs, config, intent)?;
                }
            }
        }
        Ok(())
    }

    /// The target directory pre-existed and may hold other writers' files:
    /// delete only files tagged with this query id, never directories, in
    /// the base directory and in every partition located outside it.
    fn rollback_direct_existing(
        &self,
        catalog: &dyn Catalog,
        fs: &dyn Fs,
        config: &MetastoreConfig,
        intent: &WriteIntent,
    ) -> Result<(), MetastoreError> {
        let base = &intent.root_path;
        let mut paths_to_clean = vec![base.clone()];

        match catalog.get_table(&intent.table.schema, &intent.table.table) {
            Ok(Some(table)) if table.is_partitioned() => {
                let partition_names = match catalog
                    .get_partition_names(&intent.table.schema, &intent.table.table)
                {
                    Ok(names) => names.unwrap_or_default(),
                    Err(e) => {
                        log_cleanup_failure(
                            config.fail_on_cleanup_error,
                            format!(
                                "Error rolling back: failed to list partitions of table {}: {e}",
                                intent.table
                            ),
                        )?;
                        Vec::new()
                    }
                };
                for batch in partition_names.chunks(ROLLBACK_PARTITION_BATCH) {
                    match catalog.get_partitions_by_names(
                        &intent.table.schema,
                        &intent.table.table,
                        batch,
                    ) {
                        Ok(partitions) => {
                            for partition in partitions.into_values().flatten() {
                                if !is_same_or_parent(base, &partition.location) {
                                    paths_to_clean.push(partition.location);
                                }
                            }
                        }
                        Err(e) => {
                            log_cleanup_failure(
                                config.fail_on_cleanup_error,
                                format!(
                                    "Error rolling back: failed to fetch partitions of table {}: {e}",
                                    intent.table
                                ),
                            )?;
                        }
                    }
                }
            }
            Ok(Some(_)) => {}
            Ok(None) | Err(_) => {
                log_cleanup_failure(
                    config.fail_on_cleanup_error,
                    format!(
                        "Error rolling back: unable to find table {} while cleaning a write into an existing directory",
                        intent.table
                    ),
                )?;
            }
        }

        for path in &paths_to_clean {
            // Containing directories have unknown ownership; files only
            recursive_delete_files_and_log(
                fs,
                &intent.ctx,
                path,
                std::slice::from_ref(&intent.query_id),
                false,
                &format!("write rollback into existing directory of table {}", intent.table),
                config.fail_on_cleanup_error,
            )?;
        }
        Ok(())
    }
}
