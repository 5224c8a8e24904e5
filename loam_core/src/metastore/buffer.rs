//! Transactional metastore buffer.
//!
//! One buffer serves one transaction. Schema and data mutations are staged
//! in the action log and applied by the committer; reads overlay the pending
//! actions on the external catalog; multi-entity schema operations buffer a
//! single deferred exclusive operation instead. Exactly one of `commit` or
//! `rollback` finishes the buffer - both reach the finished state even when
//! they fail, and nothing is valid afterwards.
//!
//! A single mutex guards all buffered state and is held for the full
//! duration of every public call, catalog and filesystem round-trips
//! included. Operations from other threads serialize behind it; the rename
//! pool is the only internal parallelism.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::catalog::{
    make_partition_name, Catalog, Column, ColumnStatisticKind, Database, Partition, Principal,
    PrincipalPrivileges, PrivilegeGrant, RoleGrant, SchemaTableName, Table,
};
use crate::fs::{Fs, OpContext};
use crate::stats::{self, PartitionStatistics};

use super::action::ActionLog;
use super::cleanup::recursive_delete_files_and_log;
use super::committer::Committer;
use super::config::MetastoreConfig;
use super::error::MetastoreError;
use super::intent::WriteIntentRegistry;
use super::overlay::ReadOverlay;
use super::rename::RenamePipeline;
use super::types::{PartitionAndMore, TableAndMore, TxState, WriteIntent, WriteMode};

/// A deferred catalog mutation, buffered exclusively and invoked once at
/// commit
pub type ExclusiveOp = Box<dyn FnOnce(&dyn Catalog, &dyn Fs) -> Result<(), MetastoreError> + Send>;

/// Everything guarded by the buffer mutex. Private helpers take this by
/// reference, so holding the lock is a precondition the compiler enforces.
struct Inner {
    state: TxState,
    exclusive_op: Option<ExclusiveOp>,
    actions: ActionLog,
    intents: WriteIntentRegistry,
}

pub struct TransactionalMetastore {
    catalog: Arc<dyn Catalog>,
    fs: Arc<dyn Fs>,
    config: MetastoreConfig,
    rename_pool: Arc<rayon::ThreadPool>,
    inner: Mutex<Inner>,
}

impl TransactionalMetastore {
    pub fn new(
        catalog: Arc<dyn Catalog>,
        fs: Arc<dyn Fs>,
        config: MetastoreConfig,
    ) -> Result<Self, MetastoreError> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(config.rename_threads.max(1))
            .thread_name(|i| format!("loam-rename-{i}"))
            .build()
            .map_err(|e| MetastoreError::metastore(format!("Failed to start rename pool: {e}")))?;
        Ok(Self::with_rename_pool(catalog, fs, config, Arc::new(pool)))
    }

    /// Use an externally supplied rename executor
    pub fn with_rename_pool(
        catalog: Arc<dyn Catalog>,
        fs: Arc<dyn Fs>,
        config: MetastoreConfig,
        rename_pool: Arc<rayon::ThreadPool>,
    ) -> Self {
        Self {
            catalog,
            fs,
            config,
            rename_pool,
            inner: Mutex::new(Inner {
                state: TxState::Empty,
                exclusive_op: None,
                actions: ActionLog::new(),
                intents: WriteIntentRegistry::new(),
            }),
        }
    }

    fn check_readable(inner: &Inner) -> Result<(), MetastoreError> {
        match inner.state {
            TxState::Empty | TxState::SharedBuffered => Ok(()),
            TxState::ExclusiveBuffered => Err(MetastoreError::NotSupported(
                "Reading after an exclusive operation was buffered in the same transaction is not supported"
                    .to_string(),
            )),
            TxState::Finished => Err(finished_error()),
        }
    }

    fn set_shared(inner: &mut Inner) -> Result<(), MetastoreError> {
        match inner.state {
            TxState::Empty => {
                inner.state = TxState::SharedBuffered;
                Ok(())
            }
            TxState::SharedBuffered => Ok(()),
            TxState::ExclusiveBuffered => Err(MetastoreError::NotSupported(
                "Buffering a mutation after an exclusive operation in the same transaction is not supported"
                    .to_string(),
            )),
            TxState::Finished => Err(finished_error()),
        }
    }

    fn set_exclusive(&self, op: ExclusiveOp) -> Result<(), MetastoreError> {
        let mut inner = self.inner.lock();
        match inner.state {
            TxState::Empty => {
                inner.state = TxState::ExclusiveBuffered;
                inner.exclusive_op = Some(op);
                Ok(())
            }
            TxState::SharedBuffered | TxState::ExclusiveBuffered => {
                Err(MetastoreError::NotSupported(
                    "An exclusive operation cannot be buffered together with other mutations in the same transaction"
                        .to_string(),
                ))
            }
            TxState::Finished => Err(finished_error()),
        }
    }

    // === Reads ===

    pub fn get_database(&self, name: &str) -> Result<Option<Database>, MetastoreError> {
        let inner = self.inner.lock();
        Self::check_readable(&inner)?;
        self.catalog.get_database(name).map_err(Into::into)
    }

    pub fn list_databases(&self) -> Result<Vec<String>, MetastoreError> {
        let inner = self.inner.lock();
        Self::check_readable(&inner)?;
        self.catalog.list_databases().map_err(Into::into)
    }

    pub fn get_all_tables(&self, schema: &str) -> Result<Option<Vec<String>>, MetastoreError> {
        let inner = self.inner.lock();
        Self::check_readable(&inner)?;
        ReadOverlay::new(&inner.actions, self.catalog.as_ref()).get_all_tables(schema)
    }

    pub fn get_all_views(&self, schema: &str) -> Result<Option<Vec<String>>, MetastoreError> {
        let inner = self.inner.lock();
        Self::check_readable(&inner)?;
        ReadOverlay::new(&inner.actions, self.catalog.as_ref()).get_all_views(schema)
    }

    pub fn get_table(&self, schema: &str, table: &str) -> Result<Option<Table>, MetastoreError> {
        let inner = self.inner.lock();
        Self::check_readable(&inner)?;
        ReadOverlay::new(&inner.actions, self.catalog.as_ref())
            .get_table(&SchemaTableName::new(schema, table))
    }

    pub fn get_table_statistics(
        &self,
        schema: &str,
        table: &str,
    ) -> Result<PartitionStatistics, MetastoreError> {
        let inner = self.inner.lock();
        Self::check_readable(&inner)?;
        ReadOverlay::new(&inner.actions, self.catalog.as_ref())
            .get_table_statistics(&SchemaTableName::new(schema, table))
    }

    pub fn get_partition(
        &self,
        schema: &str,
        table: &str,
        values: &[String],
    ) -> Result<Option<Partition>, MetastoreError> {
        let inner = self.inner.lock();
        Self::check_readable(&inner)?;
        ReadOverlay::new(&inner.actions, self.catalog.as_ref())
            .get_partition(&SchemaTableName::new(schema, table), values)
    }

    pub fn get_partition_names(
        &self,
        schema: &str,
        table: &str,
    ) -> Result<Option<Vec<String>>, MetastoreError> {
        let inner = self.inner.lock();
        Self::check_readable(&inner)?;
        ReadOverlay::new(&inner.actions, self.catalog.as_ref())
            .get_partition_names(&SchemaTableName::new(schema, table), None)
    }

    /// Partition names filtered by a positional value pattern; an empty
    /// pattern slot matches anything
    pub fn get_partition_names_by_parts(
        &self,
        schema: &str,
        table: &str,
        parts: &[String],
    ) -> Result<Option<Vec<String>>, MetastoreError> {
        let inner = self.inner.lock();
        Self::check_readable(&inner)?;
        ReadOverlay::new(&inner.actions, self.catalog.as_ref())
            .get_partition_names(&SchemaTableName::new(schema, table), Some(parts))
    }

    pub fn get_partitions_by_names(
        &self,
        schema: &str,
        table: &str,
        names: &[String],
    ) -> Result<HashMap<String, Option<Partition>>, MetastoreError> {
        let inner = self.inner.lock();
        Self::check_readable(&inner)?;
        ReadOverlay::new(&inner.actions, self.catalog.as_ref())
            .get_partitions_by_names(&SchemaTableName::new(schema, table), names)
    }

    pub fn get_partition_statistics(
        &self,
        schema: &str,
        table: &str,
        partition_names: &[String],
    ) -> Result<HashMap<String, PartitionStatistics>, MetastoreError> {
        let inner = self.inner.lock();
        Self::check_readable(&inner)?;
        ReadOverlay::new(&inner.actions, self.catalog.as_ref())
            .get_partition_statistics(&SchemaTableName::new(schema, table), partition_names)
    }

    pub fn list_table_privileges(
        &self,
        schema: &str,
        table: &str,
        principal: Option<&Principal>,
    ) -> Result<Vec<PrivilegeGrant>, MetastoreError> {
        let inner = self.inner.lock();
        Self::check_readable(&inner)?;
        ReadOverlay::new(&inner.actions, self.catalog.as_ref())
            .list_table_privileges(&SchemaTableName::new(schema, table), principal)
    }

    pub fn list_roles(&self) -> Result<Vec<String>, MetastoreError> {
        let inner = self.inner.lock();
        Self::check_readable(&inner)?;
        self.catalog.list_roles().map_err(Into::into)
    }

    pub fn list_role_grants(&self, principal: &Principal) -> Result<Vec<RoleGrant>, MetastoreError> {
        let inner = self.inner.lock();
        Self::check_readable(&inner)?;
        self.catalog.list_role_grants(principal).map_err(Into::into)
    }

    /// Capability metadata of the catalog; carries no transactional state
    pub fn get_supported_column_statistics(
        &self,
        type_name: &str,
    ) -> Result<Vec<ColumnStatisticKind>, MetastoreError> {
        self.catalog
            .get_supported_column_statistics(type_name)
            .map_err(Into::into)
    }

    // === Buffered mutations ===

    pub fn create_table(
        &self,
        ctx: OpContext,
        table: Table,
        principal_privileges: Option<PrincipalPrivileges>,
        current_location: Option<PathBuf>,
        ignore_existing: bool,
        statistics: PartitionStatistics,
    ) -> Result<(), MetastoreError> {
        let mut inner = self.inner.lock();
        Self::set_shared(&mut inner)?;
        let table_and_more = TableAndMore::new(
            table,
            ctx,
            principal_privileges,
            current_location,
            None,
            ignore_existing,
            statistics.clone(),
            statistics,
        )?;
        inner.actions.create_table(table_and_more)
    }

    pub fn drop_table(
        &self,
        ctx: OpContext,
        schema: &str,
        table: &str,
    ) -> Result<(), MetastoreError> {
        let mut inner = self.inner.lock();
        Self::set_shared(&mut inner)?;
        inner.actions.drop_table(ctx, SchemaTableName::new(schema, table))
    }

    /// Record the files an insert wrote into an existing unpartitioned
    /// table. Statistics merge with the table's current statistics.
    pub fn finish_insert_into_existing_table(
        &self,
        ctx: OpContext,
        schema: &str,
        table: &str,
        current_location: PathBuf,
        file_names: Vec<String>,
        statistics_update: PartitionStatistics,
    ) -> Result<(), MetastoreError> {
        let mut inner = self.inner.lock();
        Self::set_shared(&mut inner)?;
        let key = SchemaTableName::new(schema, table);

        let (existing_table, current_statistics) = {
            let overlay = ReadOverlay::new(&inner.actions, self.catalog.as_ref());
            let existing_table = overlay
                .get_table(&key)?
                .ok_or_else(|| MetastoreError::TableNotFound(key.clone()))?;
            if existing_table.is_partitioned() {
                return Err(MetastoreError::InvalidRequest(format!(
                    "table {key} is partitioned; insert into its partitions instead"
                )));
            }
            let current_statistics = overlay.get_table_statistics(&key)?;
            (existing_table, current_statistics)
        };

        let table_and_more = TableAndMore::new(
            existing_table,
            ctx,
            None,
            Some(current_location),
            Some(file_names),
            false,
            stats::merge(&current_statistics, &statistics_update),
            statistics_update,
        )?;
        inner.actions.insert_into_table(table_and_more)
    }

    pub fn add_partition(
        &self,
        ctx: OpContext,
        partition: Partition,
        current_location: PathBuf,
        statistics: PartitionStatistics,
    ) -> Result<(), MetastoreError> {
        let mut inner = self.inner.lock();
        Self::set_shared(&mut inner)?;
        if partition.query_id().is_none() {
            return Err(MetastoreError::InvalidRequest(format!(
                "partition {:?} of table {} is missing the query id parameter",
                partition.values,
                partition.schema_table_name()
            )));
        }
        let partition_and_more = PartitionAndMore::new(
            partition,
            ctx,
            current_location,
            None,
            statistics.clone(),
            statistics,
        );
        inner.actions.add_partition(partition_and_more)
    }

    pub fn drop_partition(
        &self,
        ctx: OpContext,
        schema: &str,
        table: &str,
        values: Vec<String>,
    ) -> Result<(), MetastoreError> {
        let mut inner = self.inner.lock();
        Self::set_shared(&mut inner)?;
        inner
            .actions
            .drop_partition(ctx, SchemaTableName::new(schema, table), values)
    }

    /// Record the files an insert wrote into an existing partition.
    /// Statistics merge with the partition's current statistics, which must
    /// exist.
    pub fn finish_insert_into_existing_partition(
        &self,
        ctx: OpContext,
        schema: &str,
        table: &str,
        values: Vec<String>,
        current_location: PathBuf,
        file_names: Vec<String>,
        statistics_update: PartitionStatistics,
    ) -> Result<(), MetastoreError> {
        let mut inner = self.inner.lock();
        Self::set_shared(&mut inner)?;
        let key = SchemaTableName::new(schema, table);

        let (partition, current_statistics) = {
            let overlay = ReadOverlay::new(&inner.actions, self.catalog.as_ref());
            let existing_table = overlay
                .get_table(&key)?
                .ok_or_else(|| MetastoreError::TableNotFound(key.clone()))?;
            let partition = overlay.get_partition(&key, &values)?.ok_or_else(|| {
                MetastoreError::PartitionNotFound {
                    table: key.clone(),
                    values: values.clone(),
                }
            })?;
            let name = make_partition_name(&existing_table.partition_columns, &values);
            let mut statistics = overlay.get_partition_statistics(&key, &[name.clone()])?;
            let current_statistics = statistics.remove(&name).ok_or_else(|| {
                MetastoreError::metastore(format!(
                    "statistics for partition {name} of table {key} are missing"
                ))
            })?;
            (partition, current_statistics)
        };

        let partition_and_more = PartitionAndMore::new(
            partition,
            ctx,
            current_location,
            Some(file_names),
            stats::merge(&current_statistics, &statistics_update),
            statistics_update,
        );
        inner.actions.insert_into_partition(partition_and_more)
    }

    pub fn declare_intention_to_write(
        &self,
        ctx: OpContext,
        mode: WriteMode,
        staging_root: PathBuf,
        table: SchemaTableName,
    ) -> Result<(), MetastoreError> {
        let mut inner = self.inner.lock();
        Self::set_shared(&mut inner)?;
        if mode == WriteMode::DirectExisting && inner.actions.has_partition_actions(&table) {
            return Err(MetastoreError::NotSupported(format!(
                "Cannot write directly into table {table} when its partitions were modified in the same transaction"
            )));
        }
        inner.intents.declare(WriteIntent::new(mode, ctx, staging_root, table));
        Ok(())
    }

    // === Exclusive operations ===

    pub fn create_database(&self, database: Database) -> Result<(), MetastoreError> {
        self.set_exclusive(Box::new(move |catalog, _| {
            catalog.create_database(database).map_err(Into::into)
        }))
    }

    pub fn drop_database(&self, name: &str) -> Result<(), MetastoreError> {
        let name = name.to_string();
        self.set_exclusive(Box::new(move |catalog, _| {
            catalog.drop_database(&name).map_err(Into::into)
        }))
    }

    pub fn rename_database(&self, name: &str, new_name: &str) -> Result<(), MetastoreError> {
        let name = name.to_string();
        let new_name = new_name.to_string();
        self.set_exclusive(Box::new(move |catalog, _| {
            catalog.rename_database(&name, &new_name).map_err(Into::into)
        }))
    }

    pub fn rename_table(
        &self,
        schema: &str,
        table: &str,
        new_schema: &str,
        new_table: &str,
    ) -> Result<(), MetastoreError> {
        let (schema, table) = (schema.to_string(), table.to_string());
        let (new_schema, new_table) = (new_schema.to_string(), new_table.to_string());
        self.set_exclusive(Box::new(move |catalog, _| {
            catalog
                .rename_table(&schema, &table, &new_schema, &new_table)
                .map_err(Into::into)
        }))
    }

    pub fn add_column(&self, schema: &str, table: &str, column: Column) -> Result<(), MetastoreError> {
        let (schema, table) = (schema.to_string(), table.to_string());
        self.set_exclusive(Box::new(move |catalog, _| {
            catalog.add_column(&schema, &table, column).map_err(Into::into)
        }))
    }

    pub fn rename_column(
        &self,
        schema: &str,
        table: &str,
        old_name: &str,
        new_name: &str,
    ) -> Result<(), MetastoreError> {
        let (schema, table) = (schema.to_string(), table.to_string());
        let (old_name, new_name) = (old_name.to_string(), new_name.to_string());
        self.set_exclusive(Box::new(move |catalog, _| {
            catalog
                .rename_column(&schema, &table, &old_name, &new_name)
                .map_err(Into::into)
        }))
    }

    pub fn drop_column(&self, schema: &str, table: &str, column: &str) -> Result<(), MetastoreError> {
        let (schema, table) = (schema.to_string(), table.to_string());
        let column = column.to_string();
        self.set_exclusive(Box::new(move |catalog, _| {
            catalog.drop_column(&schema, &table, &column).map_err(Into::into)
        }))
    }

    pub fn replace_table(
        &self,
        schema: &str,
        table: &str,
        new_table: Table,
        principal_privileges: PrincipalPrivileges,
    ) -> Result<(), MetastoreError> {
        let (schema, table) = (schema.to_string(), table.to_string());
        self.set_exclusive(Box::new(move |catalog, _| {
            catalog
                .replace_table(&schema, &table, new_table, principal_privileges)
                .map_err(Into::into)
        }))
    }

    /// Explicit statistics assignment; new fields win over stored ones
    pub fn set_table_statistics(
        &self,
        schema: &str,
        table: &str,
        statistics: PartitionStatistics,
    ) -> Result<(), MetastoreError> {
        let (schema, table) = (schema.to_string(), table.to_string());
        self.set_exclusive(Box::new(move |catalog, _| {
            catalog
                .update_table_statistics(&schema, &table, &|current| {
                    stats::overlay(&current, &statistics)
                })
                .map_err(Into::into)
        }))
    }

    pub fn set_partition_statistics(
        &self,
        schema: &str,
        table: &str,
        statistics: HashMap<Vec<String>, PartitionStatistics>,
    ) -> Result<(), MetastoreError> {
        let (schema, table) = (schema.to_string(), table.to_string());
        self.set_exclusive(Box::new(move |catalog, _| {
            let key = SchemaTableName::new(schema.clone(), table.clone());
            let stored_table = catalog
                .get_table(&schema, &table)?
                .ok_or(MetastoreError::TableNotFound(key))?;
            for (values, update) in statistics {
                let name = make_partition_name(&stored_table.partition_columns, &values);
                catalog.update_partition_statistics(&schema, &table, &name, &|current| {
                    stats::overlay(&current, &update)
                })?;
            }
            Ok(())
        }))
    }

    pub fn grant_table_privileges(
        &self,
        schema: &str,
        table: &str,
        grants: Vec<PrivilegeGrant>,
    ) -> Result<(), MetastoreError> {
        let (schema, table) = (schema.to_string(), table.to_string());
        self.set_exclusive(Box::new(move |catalog, _| {
            catalog.grant_table_privileges(&schema, &table, &grants).map_err(Into::into)
        }))
    }

    pub fn revoke_table_privileges(
        &self,
        schema: &str,
        table: &str,
        grants: Vec<PrivilegeGrant>,
    ) -> Result<(), MetastoreError> {
        let (schema, table) = (schema.to_string(), table.to_string());
        self.set_exclusive(Box::new(move |catalog, _| {
            catalog.revoke_table_privileges(&schema, &table, &grants).map_err(Into::into)
        }))
    }

    pub fn create_role(&self, role: &str, grantor: &str) -> Result<(), MetastoreError> {
        let (role, grantor) = (role.to_string(), grantor.to_string());
        self.set_exclusive(Box::new(move |catalog, _| {
            catalog.create_role(&role, &grantor).map_err(Into::into)
        }))
    }

    pub fn drop_role(&self, role: &str) -> Result<(), MetastoreError> {
        let role = role.to_string();
        self.set_exclusive(Box::new(move |catalog, _| {
            catalog.drop_role(&role).map_err(Into::into)
        }))
    }

    pub fn grant_roles(
        &self,
        roles: Vec<String>,
        grantees: Vec<Principal>,
        admin_option: bool,
        grantor: Principal,
    ) -> Result<(), MetastoreError> {
        self.set_exclusive(Box::new(move |catalog, _| {
            catalog
                .grant_roles(&roles, &grantees, admin_option, &grantor)
                .map_err(Into::into)
        }))
    }

    pub fn revoke_roles(
        &self,
        roles: Vec<String>,
        grantees: Vec<Principal>,
        admin_option: bool,
    ) -> Result<(), MetastoreError> {
        self.set_exclusive(Box::new(move |catalog, _| {
            catalog
                .revoke_roles(&roles, &grantees, admin_option)
                .map_err(Into::into)
        }))
    }

    /// Drop every file in an unpartitioned table's location. The metadata is
    /// untouched; the delete matches all (non-hidden) files.
    pub fn truncate_unpartitioned_table(
        &self,
        ctx: OpContext,
        schema: &str,
        table: &str,
    ) -> Result<(), MetastoreError> {
        let (schema, table) = (schema.to_string(), table.to_string());
        let fail_on_cleanup_error = self.config.fail_on_cleanup_error;
        self.set_exclusive(Box::new(move |catalog, fs| {
            let key = SchemaTableName::new(schema.clone(), table.clone());
            let stored_table = catalog
                .get_table(&schema, &table)?
                .ok_or_else(|| MetastoreError::TableNotFound(key.clone()))?;
            if stored_table.is_partitioned() {
                return Err(MetastoreError::InvalidRequest(format!(
                    "cannot truncate partitioned table {key}"
                )));
            }
            let location = stored_table.location.ok_or_else(|| {
                MetastoreError::InvalidRequest(format!("table {key} has no storage location"))
            })?;
            recursive_delete_files_and_log(
                fs,
                &ctx,
                &location,
                &[String::new()],
                false,
                &format!("truncate of table {key}"),
                fail_on_cleanup_error,
            )
        }))
    }

    // === Lifecycle ===

    pub fn commit(&self) -> Result<(), MetastoreError> {
        let mut inner = self.inner.lock();
        if inner.state == TxState::Finished {
            return Err(finished_error());
        }
        let result = match inner.state {
            TxState::Empty => Ok(()),
            TxState::ExclusiveBuffered => match inner.exclusive_op.take() {
                Some(op) => op(self.catalog.as_ref(), self.fs.as_ref()),
                None => Ok(()),
            },
            TxState::SharedBuffered => {
                let committer = Committer::new(
                    Arc::clone(&self.catalog),
                    Arc::clone(&self.fs),
                    self.config.clone(),
                    RenamePipeline::new(Arc::clone(&self.rename_pool)),
                );
                committer.commit(&inner.actions, &inner.intents)
            }
            // Rejected above
            TxState::Finished => Ok(()),
        };
        inner.state = TxState::Finished;
        result
    }

    pub fn rollback(&self) -> Result<(), MetastoreError> {
        let mut inner = self.inner.lock();
        if inner.state == TxState::Finished {
            return Err(finished_error());
        }
        let result = match inner.state {
            TxState::Empty => Ok(()),
            TxState::ExclusiveBuffered => {
                inner.exclusive_op = None;
                Ok(())
            }
            TxState::SharedBuffered => {
                inner
                    .intents
                    .rollback_cleanup(self.catalog.as_ref(), self.fs.as_ref(), &self.config)
            }
            // Rejected above
            TxState::Finished => Ok(()),
        };
        inner.state = TxState::Finished;
        result
    }
}

fn finished_error() -> MetastoreError {
    MetastoreError::NotSupported(
        "The transaction has already been committed or rolled back".to_string(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{FileCatalog, TableType};
    use crate::fs::LocalFs;
    use tempfile::TempDir;

    fn ctx() -> OpContext {
        OpContext::new("alice", "q1")
    }

    fn buffer(temp: &TempDir) -> TransactionalMetastore {
        let catalog = FileCatalog::new(temp.path().join("catalog")).unwrap();
        catalog.create_database(Database::new("db", "admin")).unwrap();
        TransactionalMetastore::new(
            Arc::new(catalog),
            Arc::new(LocalFs::new()),
            MetastoreConfig::default().with_rename_threads(2),
        )
        .unwrap()
    }

    fn test_table(temp: &TempDir, name: &str) -> Table {
        let mut parameters = HashMap::new();
        parameters.insert(crate::catalog::QUERY_ID_PARAM.to_string(), "q1".to_string());
        Table {
            schema_name: "db".to_string(),
            table_name: name.to_string(),
            owner: "alice".to_string(),
            table_type: TableType::Managed,
            data_columns: vec![Column::new("c", "bigint")],
            partition_columns: vec![],
            location: Some(temp.path().join("warehouse").join(name)),
            parameters,
        }
    }

    #[test]
    fn test_read_in_empty_state() {
        let temp = TempDir::new().unwrap();
        let metastore = buffer(&temp);
        assert!(metastore.get_table("db", "t").unwrap().is_none());
        assert_eq!(metastore.list_databases().unwrap(), vec!["db"]);
    }

    #[test]
    fn test_exclusive_blocks_reads_and_writes() {
        let temp = TempDir::new().unwrap();
        let metastore = buffer(&temp);
        metastore.create_database(Database::new("db2", "admin")).unwrap();

        assert!(matches!(
            metastore.get_table("db", "t"),
            Err(MetastoreError::NotSupported(_))
        ));
        assert!(matches!(
            metastore.drop_table(ctx(), "db", "t"),
            Err(MetastoreError::NotSupported(_))
        ));
        assert!(matches!(
            metastore.drop_role("r"),
            Err(MetastoreError::NotSupported(_))
        ));
    }

    #[test]
    fn test_shared_blocks_exclusive() {
        let temp = TempDir::new().unwrap();
        let metastore = buffer(&temp);
        metastore.drop_table(ctx(), "db", "t_gone").unwrap();

        assert!(matches!(
            metastore.create_database(Database::new("db2", "admin")),
            Err(MetastoreError::NotSupported(_))
        ));
    }

    #[test]
    fn test_commit_exclusive_op() {
        let temp = TempDir::new().unwrap();
        let metastore = buffer(&temp);
        metastore.create_database(Database::new("db2", "admin")).unwrap();
        metastore.commit().unwrap();

        let catalog = FileCatalog::new(temp.path().join("catalog")).unwrap();
        assert!(catalog.get_database("db2").unwrap().is_some());
    }

    #[test]
    fn test_rollback_discards_exclusive_op() {
        let temp = TempDir::new().unwrap();
        let metastore = buffer(&temp);
        metastore.create_database(Database::new("db2", "admin")).unwrap();
        metastore.rollback().unwrap();

        let catalog = FileCatalog::new(temp.path().join("catalog")).unwrap();
        assert!(catalog.get_database("db2").unwrap().is_none());
    }

    #[test]
    fn test_commit_is_final() {
        let temp = TempDir::new().unwrap();
        let metastore = buffer(&temp);
        metastore.commit().unwrap();

        assert!(matches!(metastore.commit(), Err(MetastoreError::NotSupported(_))));
        assert!(matches!(metastore.rollback(), Err(MetastoreError::NotSupported(_))));
        assert!(matches!(
            metastore.get_table("db", "t"),
            Err(MetastoreError::NotSupported(_))
        ));
        assert!(matches!(
            metastore.drop_table(ctx(), "db", "t"),
            Err(MetastoreError::NotSupported(_))
        ));
    }

    #[test]
    fn test_create_table_commit_end_to_end() {
        let temp = TempDir::new().unwrap();
        let metastore = buffer(&temp);
        let table = test_table(&temp, "t");

        metastore
            .create_table(ctx(), table, None, None, false, PartitionStatistics::empty())
            .unwrap();
        // Visible through the overlay before commit
        assert!(metastore.get_table("db", "t").unwrap().is_some());
        metastore.commit().unwrap();

        let catalog = FileCatalog::new(temp.path().join("catalog")).unwrap();
        assert!(catalog.get_table("db", "t").unwrap().is_some());
        // Managed table with no staged data: the location was created
        assert!(temp.path().join("warehouse/t").is_dir());
    }

    #[test]
    fn test_cross_user_conflict_through_buffer() {
        let temp = TempDir::new().unwrap();
        let metastore = buffer(&temp);
        metastore.drop_table(ctx(), "db", "t").unwrap();

        let result = metastore.create_table(
            OpContext::new("bob", "q1"),
            test_table(&temp, "t"),
            None,
            None,
            false,
            PartitionStatistics::empty(),
        );
        assert!(matches!(result, Err(MetastoreError::TransactionConflict(_))));
    }

    #[test]
    fn test_add_partition_requires_query_id_tag() {
        let temp = TempDir::new().unwrap();
        let metastore = buffer(&temp);
        let partition = Partition {
            schema_name: "db".to_string(),
            table_name: "t".to_string(),
            values: vec!["a".to_string()],
            location: temp.path().join("warehouse/t/p=a"),
            parameters: HashMap::new(),
        };

        let result = metastore.add_partition(
            ctx(),
            partition,
            temp.path().join("staging/p=a"),
            PartitionStatistics::empty(),
        );
        assert!(matches!(result, Err(MetastoreError::InvalidRequest(_))));
    }

    #[test]
    fn test_direct_existing_intent_rejected_with_partition_actions() {
        let temp = TempDir::new().unwrap();
        let metastore = buffer(&temp);
        let mut parameters = HashMap::new();
        parameters.insert(crate::catalog::QUERY_ID_PARAM.to_string(), "q1".to_string());
        let partition = Partition {
            schema_name: "db".to_string(),
            table_name: "t".to_string(),
            values: vec!["a".to_string()],
            location: temp.path().join("warehouse/t/p=a"),
            parameters,
        };
        metastore
            .add_partition(
                ctx(),
                partition,
                temp.path().join("staging/p=a"),
                PartitionStatistics::empty(),
            )
            .unwrap();

        let result = metastore.declare_intention_to_write(
            ctx(),
            WriteMode::DirectExisting,
            temp.path().join("warehouse/t"),
            SchemaTableName::new("db", "t"),
        );
        assert!(matches!(result, Err(MetastoreError::NotSupported(_))));
    }

    #[test]
    fn test_truncate_partitioned_table_rejected_at_commit() {
        let temp = TempDir::new().unwrap();
        let metastore = buffer(&temp);
        {
            let catalog = FileCatalog::new(temp.path().join("catalog")).unwrap();
            let mut table = test_table(&temp, "t");
            table.partition_columns = vec![Column::new("p", "string")];
            catalog.create_table(table, PrincipalPrivileges::default()).unwrap();
        }

        metastore.truncate_unpartitioned_table(ctx(), "db", "t").unwrap();
        let result = metastore.commit();
        assert!(matches!(result, Err(MetastoreError::InvalidRequest(_))));
    }

    #[test]
    fn test_empty_commit_and_rollback() {
        let commit_temp = TempDir::new().unwrap();
        buffer(&commit_temp).commit().unwrap();
        let rollback_temp = TempDir::new().unwrap();
        buffer(&rollback_temp).rollback().unwrap();
    }
}
