//! Commit protocol.
//!
//! Commit translates the action log into ordered forward steps plus the undo
//! steps needed to unwind them, then drives the phases strictly in order:
//!
//! 1. prepare - walk the action log, move directories, schedule file
//!    renames, build the op lists
//! 2. wait for every scheduled rename
//! 3. reversible catalog ops: add tables, alter tables, alter partitions,
//!    add partitions, update statistics
//! 4. on failure: cancel and quiesce renames, undo catalog ops in reverse
//!    dependency order, clean staged files, rename moved-aside directories
//!    back, undo alters, clean declared write areas, and rethrow
//! 5. irreversible drops, failures aggregated
//! 6. best-effort deletions that only make sense after success
//!
//! Directory cleanup never starts before every rename handle has joined; a
//! straggling rename must not recreate files inside a directory that cleanup
//! just removed.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, warn};

use crate::catalog::{
    make_partition_name, Catalog, CatalogError, PartitionWithStatistics, SchemaTableName,
};
use crate::fs::{Fs, OpContext};
use crate::stats::PartitionStatistics;

use super::action::ActionLog;
use super::cleanup::{log_cleanup_failure, recursive_delete_files_and_log};
use super::config::MetastoreConfig;
use super::error::MetastoreError;
use super::intent::WriteIntentRegistry;
use super::ops::{
    AlterPartitionOp, AlterTableOp, CreateTableOp, IrreversibleOp, PartitionAdder,
    UpdateStatisticsOp,
};
use super::overlay::ReadOverlay;
use super::rename::{join_all, join_all_quiet, RenameHandle, RenamePipeline};
use super::types::{Action, PartitionAndMore, TableAndMore, WriteMode};

/// At most this many underlying failures are attached to an aggregated
/// metastore error
const MAX_SUPPRESSED_CAUSES: usize = 5;

/// Sibling path a directory is renamed aside to while an in-place alter
/// moves new data into its location
fn staging_sibling(path: &Path, query_id: &str) -> Result<PathBuf, MetastoreError> {
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| {
            MetastoreError::InvalidRequest(format!(
                "path {} has no usable directory name",
                path.display()
            ))
        })?;
    let parent = path.parent().ok_or_else(|| {
        MetastoreError::InvalidRequest(format!("path {} has no parent", path.display()))
    })?;
    Ok(parent.join(format!("_temp_{name}_{query_id}")))
}

/// Path to delete (fully, recursively) once commit has succeeded
struct DirectoryDeletion {
    ctx: OpContext,
    path: PathBuf,
}

/// Path to sweep of this transaction's files if commit aborts
struct DirectoryCleanup {
    ctx: OpContext,
    path: PathBuf,
    delete_empty_directory: bool,
}

/// Rename to undo if commit aborts
struct DirectoryRename {
    ctx: OpContext,
    from: PathBuf,
    to: PathBuf,
}

/// What to register, just before a directory rename runs, so that abort can
/// undo it
enum AbortAction {
    /// Sweep the rename target of this transaction's files
    Cleanup { delete_empty_directory: bool },
    /// Rename the target back to the source
    RenameBack,
}

pub(crate) struct Committer {
    catalog: Arc<dyn Catalog>,
    fs: Arc<dyn Fs>,
    config: MetastoreConfig,
    pipeline: RenamePipeline,

    renames_in_progress: Vec<RenameHandle>,
    deletions_on_success: Vec<DirectoryDeletion>,
    cleanups_on_abort: Vec<DirectoryCleanup>,
    dir_renames_on_abort: Vec<DirectoryRename>,

    add_table_ops: Vec<CreateTableOp>,
    alter_table_ops: Vec<AlterTableOp>,
    alter_partition_ops: Vec<AlterPartitionOp>,
    update_statistics_ops: Vec<UpdateStatisticsOp>,
    partition_adders: Vec<PartitionAdder>,
    irreversible_ops: Vec<IrreversibleOp>,
}

impl Committer {
    pub(crate) fn new(
        catalog: Arc<dyn Catalog>,
        fs: Arc<dyn Fs>,
        config: MetastoreConfig,
        pipeline: RenamePipeline,
    ) -> Self {
        Self {
            catalog,
            fs,
            config,
            pipeline,
            renames_in_progress: Vec::new(),
            deletions_on_success: Vec::new(),
            cleanups_on_abort: Vec::new(),
            dir_renames_on_abort: Vec::new(),
            add_table_ops: Vec::new(),
            alter_table_ops: Vec::new(),
            alter_partition_ops: Vec::new(),
            update_statistics_ops: Vec::new(),
            partition_adders: Vec::new(),
            irreversible_ops: Vec::new(),
        }
    }

    /// Run the full protocol for a shared (buffered-mutation) transaction
    pub(crate) fn commit(
        mut self,
        actions: &ActionLog,
        intents: &WriteIntentRegistry,
    ) -> Result<(), MetastoreError> {
        if let Err(original) = self.run_forward(actions) {
            debug!("commit failed, rolling back: {original}");
            self.rollback_after_failure(intents)?;
            return Err(original);
        }

        debug!("reversible operations applied, executing irreversible operations");
        let irreversible_result = self.execute_irreversible_ops();
        // Best-effort cleanup always runs, success or failure
        let cleanup_result = self.best_effort_cleanup(intents);
        irreversible_result?;
        cleanup_result
    }

    /// Phases 1–3: prepare, wait for renames, reversible catalog ops
    fn run_forward(&mut self, actions: &ActionLog) -> Result<(), MetastoreError> {
        self.prepare(actions)?;

        debug!(
            "prepared commit: {} renames, {} reversible table ops, waiting for renames",
            self.renames_in_progress.len(),
            self.add_table_ops.len() + self.alter_table_ops.len()
        );
        join_all(&mut self.renames_in_progress)
            .map_err(|e| MetastoreError::Filesystem(e.to_string()))?;

        let catalog = Arc::clone(&self.catalog);
        for op in &mut self.add_table_ops {
            op.run(catalog.as_ref())?;
        }
        for op in &mut self.alter_table_ops {
            op.run(catalog.as_ref())?;
        }
        for op in &mut self.alter_partition_ops {
            op.run(catalog.as_ref())?;
        }
        for adder in &mut self.partition_adders {
            adder.execute(catalog.as_ref())?;
        }
        for op in &mut self.update_statistics_ops {
            op.run(catalog.as_ref())?;
        }
        Ok(())
    }

    fn prepare(&mut self, actions: &ActionLog) -> Result<(), MetastoreError> {
        for (key, action) in actions.tables_in_order() {
            match action {
                Action::Add(table) => self.prepare_add_table(table)?,
                Action::Alter(table) => self.prepare_alter_table(table)?,
                Action::InsertExisting(table) => self.prepare_insert_existing_table(table)?,
                Action::Drop(_) => self
                    .irreversible_ops
                    .push(IrreversibleOp::DropTable { table: key.clone() }),
            }
        }
        for (table, values, action) in actions.partitions_in_order() {
            match action {
                Action::Add(partition) => self.prepare_add_partition(actions, partition)?,
                Action::Alter(partition) => self.prepare_alter_partition(actions, partition)?,
                Action::InsertExisting(partition) => {
                    self.prepare_insert_existing_partition(actions, partition)?
                }
                Action::Drop(_) => self.irreversible_ops.push(IrreversibleOp::DropPartition {
                    table: table.clone(),
                    values: values.clone(),
                }),
            }
        }
        Ok(())
    }

    fn prepare_add_table(&mut self, table: &TableAndMore) -> Result<(), MetastoreError> {
        if table.table.is_managed() {
            if let Some(target) = table.table.location.clone() {
                match &table.current_location {
                    // Data was staged elsewhere: move the directory into place
                    Some(current) if *current != target => {
                        let current = current.clone();
                        self.rename_directory(
                            &table.ctx,
                            &current,
                            &target,
                            AbortAction::Cleanup {
                                delete_empty_directory: true,
                            },
                        )?;
                    }
                    // Data already written directly to the target
                    Some(_) => {}
                    // Partitioned table or no data: the target must not exist yet
                    None => {
                        if self.fs.exists(&table.ctx, &target)? {
                            return Err(MetastoreError::PathAlreadyExists(target));
                        }
                        self.cleanups_on_abort.push(DirectoryCleanup {
                            ctx: table.ctx.clone(),
                            path: target.clone(),
                            delete_empty_directory: true,
                        });
                        self.create_directory(&table.ctx, &target)?;
                    }
                }
            }
        }

        self.add_table_ops.push(CreateTableOp::new(
            table.table.clone(),
            table.principal_privileges.clone(),
            table.ignore_existing,
        ));
        if !table.table.is_view() {
            self.update_statistics_ops.push(UpdateStatisticsOp::new(
                table.schema_table_name(),
                None,
                table.statistics_update.clone(),
                false,
            ));
        }
        Ok(())
    }

    fn prepare_alter_table(&mut self, table: &TableAndMore) -> Result<(), MetastoreError> {
        let key = table.schema_table_name();
        let old_table = self
            .catalog
            .get_table(&key.schema, &key.table)
            .map_err(MetastoreError::from)?
            .ok_or_else(|| {
                MetastoreError::TransactionConflict(format!(
                    "The table that this transaction modified was deleted in another transaction: {key}"
                ))
            })?;

        if let (Some(target), Some(old_location)) =
            (table.table.location.clone(), old_table.location.clone())
        {
            if target == old_location {
                // New data takes the old location: move the old directory
                // aside so abort can move it back
                let query_id = table.table.query_id().ok_or_else(|| {
                    MetastoreError::InvalidRequest(format!(
                        "table {key} is missing the query id parameter"
                    ))
                })?;
                let staging = staging_sibling(&old_location, query_id)?;
                self.rename_directory(
                    &table.ctx,
                    &old_location,
                    &staging,
                    AbortAction::RenameBack,
                )?;
                if !self.config.skip_deletion_for_alter {
                    self.deletions_on_success.push(DirectoryDeletion {
                        ctx: table.ctx.clone(),
                        path: staging,
                    });
                }
            } else if !self.config.skip_deletion_for_alter {
                self.deletions_on_success.push(DirectoryDeletion {
                    ctx: table.ctx.clone(),
                    path: old_location,
                });
            }

            if let Some(current) = table.current_location.clone() {
                if current != target {
                    self.rename_directory(
                        &table.ctx,
                        &current,
                        &target,
                        AbortAction::Cleanup {
                            delete_empty_directory: true,
                        },
                    )?;
                }
            }
        }

        self.alter_table_ops.push(AlterTableOp::new(
            table.table.clone(),
            old_table,
            table.principal_privileges.clone(),
        ));
        if !table.table.is_view() {
            self.update_statistics_ops.push(UpdateStatisticsOp::new(
                key,
                None,
                table.statistics_update.clone(),
                false,
            ));
        }
        Ok(())
    }

    fn prepare_insert_existing_table(&mut self, table: &TableAndMore) -> Result<(), MetastoreError> {
        let key = table.schema_table_name();
        let target = table.table.location.clone().ok_or_else(|| {
            MetastoreError::InvalidRequest(format!("table {key} has no storage location"))
        })?;
        let current = table.current_location.clone().ok_or_else(|| {
            MetastoreError::InvalidRequest(format!("insert into {key} has no current location"))
        })?;

        // Only this transaction's files are swept out of the pre-existing
        // target on abort
        self.cleanups_on_abort.push(DirectoryCleanup {
            ctx: table.ctx.clone(),
            path: target.clone(),
            delete_empty_directory: false,
        });
        if target != current {
            let file_names = table.file_names.as_deref().ok_or_else(|| {
                MetastoreError::InvalidRequest(format!("insert into {key} has no staged file names"))
            })?;
            let handles = self.pipeline.submit_file_renames(
                &self.fs,
                &table.ctx,
                &current,
                &target,
                file_names,
            );
            self.renames_in_progress.extend(handles);
        }

        self.update_statistics_ops.push(UpdateStatisticsOp::new(
            key,
            None,
            table.statistics_update.clone(),
            true,
        ));
        Ok(())
    }

    fn prepare_add_partition(
        &mut self,
        actions: &ActionLog,
        partition: &PartitionAndMore,
    ) -> Result<(), MetastoreError> {
        let table_key = partition.schema_table_name();
        let target = partition.partition.location.clone();
        let current = partition.current_location.clone();

        if self.fs.exists(&partition.ctx, &current)? {
            if current != target {
                self.rename_directory(
                    &partition.ctx,
                    &current,
                    &target,
                    AbortAction::Cleanup {
                        delete_empty_directory: true,
                    },
                )?;
            }
        } else {
            // No staged data: the target must not exist yet
            if self.fs.exists(&partition.ctx, &target)? {
                return Err(MetastoreError::PathAlreadyExists(target));
            }
            self.cleanups_on_abort.push(DirectoryCleanup {
                ctx: partition.ctx.clone(),
                path: target.clone(),
                delete_empty_directory: true,
            });
            self.create_directory(&partition.ctx, &target)?;
        }

        let name = self.partition_name(actions, &table_key, &partition.partition.values)?;
        let adder = self.partition_adder_for(&table_key);
        adder.add(PartitionWithStatistics::new(
            partition.partition.clone(),
            name,
            partition.statistics_update.clone(),
        ));
        Ok(())
    }

    fn prepare_alter_partition(
        &mut self,
        actions: &ActionLog,
        partition: &PartitionAndMore,
    ) -> Result<(), MetastoreError> {
        let table_key = partition.schema_table_name();
        let values = &partition.partition.values;
        let old_partition = self
            .catalog
            .get_partition(&table_key.schema, &table_key.table, values)
            .map_err(MetastoreError::from)?
            .ok_or_else(|| {
                MetastoreError::TransactionConflict(format!(
                    "The partition that this transaction modified was deleted in another transaction: {table_key} {values:?}"
                ))
            })?;

        let name = self.partition_name(actions, &table_key, values)?;
        let old_statistics = self.existing_partition_statistics(&table_key, &name)?;

        let target = partition.partition.location.clone();
        let old_location = old_partition.location.clone();
        if target == old_location {
            let query_id = partition.partition.query_id().ok_or_else(|| {
                MetastoreError::InvalidRequest(format!(
                    "partition {values:?} of table {table_key} is missing the query id parameter"
                ))
            })?;
            let staging = staging_sibling(&old_location, query_id)?;
            self.rename_directory(
                &partition.ctx,
                &old_location,
                &staging,
                AbortAction::RenameBack,
            )?;
            if !self.config.skip_deletion_for_alter {
                self.deletions_on_success.push(DirectoryDeletion {
                    ctx: partition.ctx.clone(),
                    path: staging,
                });
            }
        } else if !self.config.skip_deletion_for_alter {
            self.deletions_on_success.push(DirectoryDeletion {
                ctx: partition.ctx.clone(),
                path: old_location,
            });
        }

        let current = partition.current_location.clone();
        if current != target {
            self.rename_directory(
                &partition.ctx,
                &current,
                &target,
                AbortAction::Cleanup {
                    delete_empty_directory: true,
                },
            )?;
        }

        self.alter_partition_ops.push(AlterPartitionOp::new(
            PartitionWithStatistics::new(
                partition.partition.clone(),
                name.clone(),
                partition.statistics_update.clone(),
            ),
            PartitionWithStatistics::new(old_partition, name, old_statistics),
        ));
        Ok(())
    }

    fn prepare_insert_existing_partition(
        &mut self,
        actions: &ActionLog,
        partition: &PartitionAndMore,
    ) -> Result<(), MetastoreError> {
        let table_key = partition.schema_table_name();
        let target = partition.partition.location.clone();
        let current = partition.current_location.clone();

        self.cleanups_on_abort.push(DirectoryCleanup {
            ctx: partition.ctx.clone(),
            path: target.clone(),
            delete_empty_directory: false,
        });
        if target != current {
            let file_names = partition.file_names.as_deref().ok_or_else(|| {
                MetastoreError::InvalidRequest(format!(
                    "insert into partition of {table_key} has no staged file names"
                ))
            })?;
            let handles = self.pipeline.submit_file_renames(
                &self.fs,
                &partition.ctx,
                &current,
                &target,
                file_names,
            );
            self.renames_in_progress.extend(handles);
        }

        let name = self.partition_name(actions, &table_key, &partition.partition.values)?;
        self.update_statistics_ops.push(UpdateStatisticsOp::new(
            table_key,
            Some(name),
            partition.statistics_update.clone(),
            true,
        ));
        Ok(())
    }

    /// Phase 4: unwind everything the forward phases did, in reverse
    /// dependency order, then clean the declared write areas
    fn rollback_after_failure(
        &mut self,
        intents: &WriteIntentRegistry,
    ) -> Result<(), MetastoreError> {
        // Renames must quiesce before any filesystem cleanup
        self.pipeline.cancel();
        join_all_quiet(&mut self.renames_in_progress);

        let catalog = Arc::clone(&self.catalog);
        let fail = self.config.fail_on_cleanup_error;

        for op in self.update_statistics_ops.iter().rev() {
            if let Err(e) = op.undo(catalog.as_ref()) {
                log_cleanup_failure(fail, format!("failed to undo a statistics update: {e}"))?;
            }
        }
        for adder in self.partition_adders.iter().rev() {
            let failed = adder.rollback(catalog.as_ref());
            if !failed.is_empty() {
                log_cleanup_failure(
                    fail,
                    format!("failed to roll back added partitions: {failed:?}"),
                )?;
            }
        }
        for op in self.add_table_ops.iter().rev() {
            if let Err(e) = op.undo(catalog.as_ref()) {
                log_cleanup_failure(
                    fail,
                    format!("failed to undo the creation of table {}: {e}", op.table_name()),
                )?;
            }
        }

        // Sweep this transaction's files out of staged/created directories
        let query_ids = intents.query_ids();
        for task in &self.cleanups_on_abort {
            recursive_delete_files_and_log(
                self.fs.as_ref(),
                &task.ctx,
                &task.path,
                &query_ids,
                task.delete_empty_directory,
                "staged files for aborted transaction",
                fail,
            )?;
        }

        // Move renamed-aside directories back where they came from
        for task in &self.dir_renames_on_abort {
            match self.fs.exists(&task.ctx, &task.from) {
                // The forward rename never happened; nothing to undo
                Ok(false) => {}
                Ok(true) => {
                    if !self.fs.rename(&task.ctx, &task.from, &task.to).unwrap_or(false) {
                        log_cleanup_failure(
                            fail,
                            format!(
                                "failed to rename {} back to {}",
                                task.from.display(),
                                task.to.display()
                            ),
                        )?;
                    }
                }
                Err(e) => {
                    log_cleanup_failure(
                        fail,
                        format!("failed to check {} while undoing renames: {e}", task.from.display()),
                    )?;
                }
            }
        }

        // Alter undos run after the directories are back in place
        for op in self.alter_table_ops.iter().rev() {
            if let Err(e) = op.undo(catalog.as_ref()) {
                log_cleanup_failure(fail, format!("failed to undo a table alteration: {e}"))?;
            }
        }
        for op in self.alter_partition_ops.iter().rev() {
            if let Err(e) = op.undo(catalog.as_ref()) {
                log_cleanup_failure(fail, format!("failed to undo a partition alteration: {e}"))?;
            }
        }

        intents.rollback_cleanup(catalog.as_ref(), self.fs.as_ref(), &self.config)
    }

    /// Phase 5: drops deferred past the rollback point. Failures do not stop
    /// processing; they aggregate into one error afterwards.
    fn execute_irreversible_ops(&mut self) -> Result<(), MetastoreError> {
        let catalog = Arc::clone(&self.catalog);
        let mut failed_descriptions = Vec::new();
        let mut causes = Vec::new();
        let mut first_error = None;
        let mut any_succeeded = false;

        for op in &self.irreversible_ops {
            match op.run(catalog.as_ref()) {
                Ok(()) => any_succeeded = true,
                Err(e) => {
                    failed_descriptions.push(op.description());
                    if causes.len() < MAX_SUPPRESSED_CAUSES {
                        causes.push(e.to_string());
                    }
                    if first_error.is_none() {
                        first_error = Some(e);
                    }
                }
            }
        }

        let Some(first_error) = first_error else {
            return Ok(());
        };
        let delete_only = self.add_table_ops.is_empty()
            && self.alter_table_ops.is_empty()
            && self.alter_partition_ops.is_empty()
            && self.update_statistics_ops.is_empty()
            && self.partition_adders.is_empty();
        if any_succeeded || !delete_only {
            // Part of the transaction is applied and cannot be rolled back
            return Err(MetastoreError::Metastore {
                message: format!(
                    "Failed to execute metastore delete operations: {}",
                    failed_descriptions.join("; ")
                ),
                causes,
            });
        }
        // Nothing in the transaction was applied; report the failure plainly
        Err(first_error)
    }

    /// Phase 6: deletions that only make sense once commit succeeded, plus a
    /// sweep of staging roots. Always best-effort.
    fn best_effort_cleanup(&mut self, intents: &WriteIntentRegistry) -> Result<(), MetastoreError> {
        let fail = self.config.fail_on_cleanup_error;
        for deletion in &self.deletions_on_success {
            match self.fs.delete(&deletion.ctx, &deletion.path, true) {
                Ok(true) => {}
                _ => log_cleanup_failure(
                    fail,
                    format!(
                        "failed to delete directory {} after commit",
                        deletion.path.display()
                    ),
                )?,
            }
        }
        for intent in intents.intents() {
            if intent.mode == WriteMode::StageAndMove {
                recursive_delete_files_and_log(
                    self.fs.as_ref(),
                    &intent.ctx,
                    &intent.root_path,
                    std::slice::from_ref(&intent.query_id),
                    true,
                    &format!("staging directory cleanup for table {}", intent.table),
                    fail,
                )?;
            }
        }
        Ok(())
    }

    // === Helpers ===

    /// Rename a whole directory, failing if the target exists. The abort
    /// action is registered before the rename runs so a partial rename is
    /// still covered.
    fn rename_directory(
        &mut self,
        ctx: &OpContext,
        source: &Path,
        target: &Path,
        abort: AbortAction,
    ) -> Result<(), MetastoreError> {
        if self.fs.exists(ctx, target)? {
            return Err(MetastoreError::PathAlreadyExists(target.to_path_buf()));
        }
        if let Some(parent) = target.parent() {
            if !self.fs.exists(ctx, parent)? {
                self.create_directory(ctx, parent)?;
            }
        }
        match abort {
            AbortAction::Cleanup {
                delete_empty_directory,
            } => self.cleanups_on_abort.push(DirectoryCleanup {
                ctx: ctx.clone(),
                path: target.to_path_buf(),
                delete_empty_directory,
            }),
            AbortAction::RenameBack => self.dir_renames_on_abort.push(DirectoryRename {
                ctx: ctx.clone(),
                from: target.to_path_buf(),
                to: source.to_path_buf(),
            }),
        }
        if !self.fs.rename(ctx, source, target)? {
            return Err(MetastoreError::Filesystem(format!(
                "Failed to rename {} to {}",
                source.display(),
                target.display()
            )));
        }
        Ok(())
    }

    fn create_directory(&self, ctx: &OpContext, path: &Path) -> Result<(), MetastoreError> {
        if !self.fs.mkdirs(ctx, path)? {
            return Err(MetastoreError::Filesystem(format!(
                "Failed to create directory {}",
                path.display()
            )));
        }
        Ok(())
    }

    /// Canonical partition name; partition columns come from the
    /// transaction's view of the table, which may not exist in the catalog
    /// yet
    fn partition_name(
        &self,
        actions: &ActionLog,
        table_key: &SchemaTableName,
        values: &[String],
    ) -> Result<String, MetastoreError> {
        let overlay = ReadOverlay::new(actions, self.catalog.as_ref());
        let table = overlay
            .get_table(table_key)?
            .ok_or_else(|| MetastoreError::TableNotFound(table_key.clone()))?;
        Ok(make_partition_name(&table.partition_columns, values))
    }

    /// Statistics the altered partition had before this transaction, needed
    /// to reverse the alter. Corrupted statistics degrade to empty.
    fn existing_partition_statistics(
        &self,
        table_key: &SchemaTableName,
        partition_name: &str,
    ) -> Result<PartitionStatistics, MetastoreError> {
        let names = [partition_name.to_string()];
        match self
            .catalog
            .get_partition_statistics(&table_key.schema, &table_key.table, &names)
        {
            Ok(mut statistics) => statistics.remove(partition_name).ok_or_else(|| {
                MetastoreError::TransactionConflict(format!(
                    "The partition that this transaction modified was deleted in another transaction: {table_key} {partition_name}"
                ))
            }),
            Err(CatalogError::CorruptedStatistics(entity)) => {
                warn!(
                    "Corrupted statistics found when altering partition {partition_name} of table {table_key}: {entity}"
                );
                Ok(PartitionStatistics::empty())
            }
            Err(e) => Err(e.into()),
        }
    }

    fn partition_adder_for(&mut self, table: &SchemaTableName) -> &mut PartitionAdder {
        let index = self
            .partition_adders
            .iter()
            .position(|adder| adder.table() == table);
        match index {
            Some(index) => &mut self.partition_adders[index],
            None => {
                self.partition_adders.push(PartitionAdder::new(
                    table.clone(),
                    self.config.partition_commit_batch_size,
                ));
                let last = self.partition_adders.len() - 1;
                &mut self.partition_adders[last]
            }
        }
    }
}
