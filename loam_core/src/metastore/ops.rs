//! Catalog operations buffered by the committer.
//!
//! Each reversible operation is a forward/undo pair carrying the old and new
//! values it needs; undo is a no-op unless forward ran. The committer owns
//! these records exclusively, so the done flags are plain fields rather than
//! shared state. Irreversible operations (drops) have no undo and run only
//! after every reversible operation succeeded.

use std::collections::HashMap;

use tracing::warn;

use crate::catalog::{
    Catalog, CatalogError, PartitionWithStatistics, PrincipalPrivileges, SchemaTableName, Table,
};
use crate::stats::{self, PartitionStatistics, ReduceOperator};

use super::error::MetastoreError;

/// Forward: create a table. Undo: drop it, but only if this transaction
/// actually created it.
pub struct CreateTableOp {
    table: Table,
    privileges: PrincipalPrivileges,
    ignore_existing: bool,
    created: bool,
}

impl CreateTableOp {
    pub fn new(table: Table, privileges: Option<PrincipalPrivileges>, ignore_existing: bool) -> Self {
        Self {
            table,
            privileges: privileges.unwrap_or_default(),
            ignore_existing,
            created: false,
        }
    }

    pub fn table_name(&self) -> SchemaTableName {
        self.table.schema_table_name()
    }

    pub fn run(&mut self, catalog: &dyn Catalog) -> Result<(), MetastoreError> {
        match catalog.create_table(self.table.clone(), self.privileges.clone()) {
            Ok(()) => {
                self.created = true;
                Ok(())
            }
            Err(CatalogError::TableAlreadyExists(key)) => {
                if let Ok(Some(existing)) =
                    catalog.get_table(&self.table.schema_name, &self.table.table_name)
                {
                    // Created by this query already (a retried create); the
                    // table is ours and undo may drop it
                    if existing.query_id().is_some() && existing.query_id() == self.table.query_id()
                    {
                        self.created = true;
                        return Ok(());
                    }
                    // Someone else's table; undo must leave it alone
                    if self.ignore_existing {
                        return Ok(());
                    }
                }
                Err(MetastoreError::TableAlreadyExists(key))
            }
            Err(e) => Err(e.into()),
        }
    }

    pub fn undo(&self, catalog: &dyn Catalog) -> Result<(), MetastoreError> {
        if !self.created {
            return Ok(());
        }
        catalog
            .drop_table(&self.table.schema_name, &self.table.table_name)
            .map_err(Into::into)
    }
}

/// Forward: replace a table definition. Undo: put the remembered old
/// definition back.
pub struct AlterTableOp {
    new_table: Table,
    old_table: Table,
    privileges: PrincipalPrivileges,
    done: bool,
}

impl AlterTableOp {
    pub fn new(new_table: Table, old_table: Table, privileges: Option<PrincipalPrivileges>) -> Self {
        Self {
            new_table,
            old_table,
            privileges: privileges.unwrap_or_default(),
            done: false,
        }
    }

    pub fn run(&mut self, catalog: &dyn Catalog) -> Result<(), MetastoreError> {
        catalog.replace_table(
            &self.old_table.schema_name,
            &self.old_table.table_name,
            self.new_table.clone(),
            self.privileges.clone(),
        )?;
        self.done = true;
        Ok(())
    }

    pub fn undo(&self, catalog: &dyn Catalog) -> Result<(), MetastoreError> {
        if !self.done {
            return Ok(());
        }
        catalog
            .replace_table(
                &self.old_table.schema_name,
                &self.old_table.table_name,
                self.old_table.clone(),
                self.privileges.clone(),
            )
            .map_err(Into::into)
    }
}

/// Forward: alter a partition. Undo: alter it back to the remembered old
/// value and statistics.
pub struct AlterPartitionOp {
    new_partition: PartitionWithStatistics,
    old_partition: PartitionWithStatistics,
    done: bool,
}

impl AlterPartitionOp {
    pub fn new(new_partition: PartitionWithStatistics, old_partition: PartitionWithStatistics) -> Self {
        Self {
            new_partition,
            old_partition,
            done: false,
        }
    }

    pub fn run(&mut self, catalog: &dyn Catalog) -> Result<(), MetastoreError> {
        let table = self.new_partition.partition.schema_table_name();
        catalog.alter_partition(&table.schema, &table.table, &self.new_partition)?;
        self.done = true;
        Ok(())
    }

    pub fn undo(&self, catalog: &dyn Catalog) -> Result<(), MetastoreError> {
        if !self.done {
            return Ok(());
        }
        let table = self.old_partition.partition.schema_table_name();
        catalog
            .alter_partition(&table.schema, &table.table, &self.old_partition)
            .map_err(Into::into)
    }
}

/// Forward: merge a statistics delta into (or replace) the stored
/// statistics. Undo: subtract the basic counters of the delta and clear
/// column statistics - the exact prior column values are unrecoverable.
pub struct UpdateStatisticsOp {
    table: SchemaTableName,
    partition_name: Option<String>,
    statistics: PartitionStatistics,
    merge: bool,
    done: bool,
}

impl UpdateStatisticsOp {
    pub fn new(
        table: SchemaTableName,
        partition_name: Option<String>,
        statistics: PartitionStatistics,
        merge: bool,
    ) -> Self {
        Self {
            table,
            partition_name,
            statistics,
            merge,
            done: false,
        }
    }

    pub fn run(&mut self, catalog: &dyn Catalog) -> Result<(), MetastoreError> {
        let statistics = self.statistics.clone();
        let merge = self.merge;
        let update = move |current: PartitionStatistics| {
            if merge {
                stats::merge(&current, &statistics)
            } else {
                statistics.clone()
            }
        };
        match &self.partition_name {
            Some(name) => catalog.update_partition_statistics(
                &self.table.schema,
                &self.table.table,
                name,
                &update,
            )?,
            None => catalog.update_table_statistics(&self.table.schema, &self.table.table, &update)?,
        }
        self.done = true;
        Ok(())
    }

    pub fn undo(&self, catalog: &dyn Catalog) -> Result<(), MetastoreError> {
        if !self.done {
            return Ok(());
        }
        let statistics = self.statistics.clone();
        let reset = move |current: PartitionStatistics| PartitionStatistics {
            basic: stats::reduce(&current.basic, &statistics.basic, ReduceOperator::Subtract),
            columns: HashMap::new(),
        };
        match &self.partition_name {
            Some(name) => catalog
                .update_partition_statistics(&self.table.schema, &self.table.table, name, &reset)
                .map_err(Into::into),
            None => catalog
                .update_table_statistics(&self.table.schema, &self.table.table, &reset)
                .map_err(Into::into),
        }
    }
}

/// A catalog mutation with no undo; deferred past the rollback point
pub enum IrreversibleOp {
    DropTable {
        table: SchemaTableName,
    },
    DropPartition {
        table: SchemaTableName,
        values: Vec<String>,
    },
}

impl IrreversibleOp {
    pub fn run(&self, catalog: &dyn Catalog) -> Result<(), MetastoreError> {
        match self {
            IrreversibleOp::DropTable { table } => {
                catalog.drop_table(&table.schema, &table.table).map_err(Into::into)
            }
            IrreversibleOp::DropPartition { table, values } => catalog
                .drop_partition(&table.schema, &table.table, values, true)
                .map_err(Into::into),
        }
    }

    pub fn description(&self) -> String {
        match self {
            IrreversibleOp::DropTable { table } => format!("drop table {table}"),
            IrreversibleOp::DropPartition { table, values } => {
                format!("drop partition {values:?} of table {table}")
            }
        }
    }
}

/// Buffers partition adds for one table and flushes them in fixed-size
/// batches.
///
/// A failed batch is re-examined partition by partition: a partition that
/// exists in the catalog with this query's id tag counts as added (some
/// catalogs persist part of a batch before failing). If the whole batch
/// turns out to be present the failure is tolerated; otherwise the original
/// error is re-raised, as a dropped-table error when the table vanished.
pub struct PartitionAdder {
    table: SchemaTableName,
    batch_size: usize,
    partitions: Vec<PartitionWithStatistics>,
    created_partition_values: Vec<Vec<String>>,
}

impl PartitionAdder {
    pub fn new(table: SchemaTableName, batch_size: usize) -> Self {
        Self {
            table,
            batch_size,
            partitions: Vec::new(),
            created_partition_values: Vec::new(),
        }
    }

    pub fn table(&self) -> &SchemaTableName {
        &self.table
    }

    pub fn add(&mut self, partition: PartitionWithStatistics) {
        self.partitions.push(partition);
    }

    pub fn execute(&mut self, catalog: &dyn Catalog) -> Result<(), MetastoreError> {
        let partitions = std::mem::take(&mut self.partitions);
        for batch in partitions.chunks(self.batch_size.max(1)) {
            match catalog.add_partitions(&self.table.schema, &self.table.table, batch) {
                Ok(()) => {
                    for partition in batch {
                        self.created_partition_values
                            .push(partition.partition.values.clone());
                    }
                }
                Err(e) => {
                    let mut batch_completely_added = true;
                    for partition in batch {
                        let verified = catalog
                            .get_partition(
                                &self.table.schema,
                                &self.table.table,
                                &partition.partition.values,
                            )
                            .ok()
                            .flatten()
                            .is_some_and(|remote| {
                                remote.query_id().is_some()
                                    && remote.query_id() == partition.partition.query_id()
                            });
                        if verified {
                            self.created_partition_values
                                .push(partition.partition.values.clone());
                        } else {
                            batch_completely_added = false;
                        }
                    }
                    if !batch_completely_added {
                        return Err(match e {
                            CatalogError::TableNotFound(table) => {
                                MetastoreError::TableDroppedDuringQuery(table)
                            }
                            other => other.into(),
                        });
                    }
                }
            }
        }
        Ok(())
    }

    /// Drop every partition this adder managed to create, best-effort.
    /// Returns the partitions that could not be dropped.
    pub fn rollback(&self, catalog: &dyn Catalog) -> Vec<Vec<String>> {
        let mut failed = Vec::new();
        for values in &self.created_partition_values {
            if let Err(e) =
                catalog.drop_partition(&self.table.schema, &self.table.table, values, false)
            {
                warn!(
                    "Failed to roll back added partition {:?} of table {}: {}",
                    values, self.table, e
                );
                failed.push(values.clone());
            }
        }
        failed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{Column, Database, FileCatalog, Partition, TableType, QUERY_ID_PARAM};
    use crate::stats::BasicStatistics;
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn catalog() -> (FileCatalog, TempDir) {
        let temp = TempDir::new().unwrap();
        let catalog = FileCatalog::new(temp.path()).unwrap();
        catalog.create_database(Database::new("db", "admin")).unwrap();
        (catalog, temp)
    }

    fn table(name: &str, query: &str) -> Table {
        let mut parameters = HashMap::new();
        parameters.insert(QUERY_ID_PARAM.to_string(), query.to_string());
        Table {
            schema_name: "db".to_string(),
            table_name: name.to_string(),
            owner: "alice".to_string(),
            table_type: TableType::Managed,
            data_columns: vec![Column::new("c", "bigint")],
            partition_columns: vec![Column::new("ds", "string")],
            location: Some(PathBuf::from(format!("/warehouse/db/{name}"))),
            parameters,
        }
    }

    fn partition(value: &str, query: &str) -> PartitionWithStatistics {
        let mut parameters = HashMap::new();
        parameters.insert(QUERY_ID_PARAM.to_string(), query.to_string());
        let partition = Partition {
            schema_name: "db".to_string(),
            table_name: "t".to_string(),
            values: vec![value.to_string()],
            location: PathBuf::from(format!("/warehouse/db/t/ds={value}")),
            parameters,
        };
        PartitionWithStatistics::new(partition, format!("ds={value}"), PartitionStatistics::empty())
    }

    #[test]
    fn test_create_table_op_run_and_undo() {
        let (catalog, _temp) = catalog();
        let mut op = CreateTableOp::new(table("t", "q1"), None, false);

        op.run(&catalog).unwrap();
        assert!(catalog.get_table("db", "t").unwrap().is_some());

        op.undo(&catalog).unwrap();
        assert!(catalog.get_table("db", "t").unwrap().is_none());
    }

    #[test]
    fn test_create_table_op_undo_without_run_is_noop() {
        let (catalog, _temp) = catalog();
        catalog
            .create_table(table("t", "other_query"), PrincipalPrivileges::default())
            .unwrap();

        let op = CreateTableOp::new(table("t", "q1"), None, false);
        op.undo(&catalog).unwrap();
        assert!(catalog.get_table("db", "t").unwrap().is_some());
    }

    #[test]
    fn test_create_table_op_retried_create_is_idempotent() {
        let (catalog, _temp) = catalog();
        catalog
            .create_table(table("t", "q1"), PrincipalPrivileges::default())
            .unwrap();

        // Same query id: treated as ours, and undo drops it
        let mut op = CreateTableOp::new(table("t", "q1"), None, false);
        op.run(&catalog).unwrap();
        op.undo(&catalog).unwrap();
        assert!(catalog.get_table("db", "t").unwrap().is_none());
    }

    #[test]
    fn test_create_table_op_ignore_existing_keeps_foreign_table() {
        let (catalog, _temp) = catalog();
        catalog
            .create_table(table("t", "other_query"), PrincipalPrivileges::default())
            .unwrap();

        let mut op = CreateTableOp::new(table("t", "q1"), None, true);
        op.run(&catalog).unwrap();
        // Undo must not drop a table this transaction did not create
        op.undo(&catalog).unwrap();
        assert!(catalog.get_table("db", "t").unwrap().is_some());
    }

    #[test]
    fn test_create_table_op_conflict_without_ignore() {
        let (catalog, _temp) = catalog();
        catalog
            .create_table(table("t", "other_query"), PrincipalPrivileges::default())
            .unwrap();

        let mut op = CreateTableOp::new(table("t", "q1"), None, false);
        let result = op.run(&catalog);
        assert!(matches!(result, Err(MetastoreError::TableAlreadyExists(_))));
    }

    #[test]
    fn test_alter_table_op_roundtrip() {
        let (catalog, _temp) = catalog();
        let old = table("t", "old_query");
        catalog
            .create_table(old.clone(), PrincipalPrivileges::default())
            .unwrap();

        let mut new = table("t", "q1");
        new.location = Some(PathBuf::from("/warehouse/db/t_v2"));
        let mut op = AlterTableOp::new(new.clone(), old.clone(), None);

        op.run(&catalog).unwrap();
        assert_eq!(
            catalog.get_table("db", "t").unwrap().unwrap().location,
            new.location
        );

        op.undo(&catalog).unwrap();
        assert_eq!(
            catalog.get_table("db", "t").unwrap().unwrap().location,
            old.location
        );
    }

    #[test]
    fn test_update_statistics_op_merge_and_undo() {
        let (catalog, _temp) = catalog();
        catalog
            .create_table(table("t", "q1"), PrincipalPrivileges::default())
            .unwrap();
        catalog
            .update_table_statistics("db", "t", &|_| {
                PartitionStatistics::basic_only(BasicStatistics::new(1, 100, 1000, 0))
            })
            .unwrap();

        let delta = PartitionStatistics::basic_only(BasicStatistics::new(2, 50, 500, 0));
        let mut op = UpdateStatisticsOp::new(SchemaTableName::new("db", "t"), None, delta, true);

        op.run(&catalog).unwrap();
        let merged = catalog.get_table_statistics("db", "t").unwrap();
        assert_eq!(merged.basic.file_count, Some(3));
        assert_eq!(merged.basic.row_count, Some(150));

        op.undo(&catalog).unwrap();
        let restored = catalog.get_table_statistics("db", "t").unwrap();
        assert_eq!(restored.basic.file_count, Some(1));
        assert_eq!(restored.basic.row_count, Some(100));
    }

    #[test]
    fn test_update_statistics_op_undo_without_run_is_noop() {
        let (catalog, _temp) = catalog();
        catalog
            .create_table(table("t", "q1"), PrincipalPrivileges::default())
            .unwrap();

        let delta = PartitionStatistics::basic_only(BasicStatistics::new(2, 50, 500, 0));
        let op = UpdateStatisticsOp::new(SchemaTableName::new("db", "t"), None, delta, true);
        op.undo(&catalog).unwrap();

        let stats = catalog.get_table_statistics("db", "t").unwrap();
        assert_eq!(stats.basic.file_count, None);
    }

    #[test]
    fn test_partition_adder_batches_and_rollback() {
        let (catalog, _temp) = catalog();
        catalog
            .create_table(table("t", "q1"), PrincipalPrivileges::default())
            .unwrap();

        let mut adder = PartitionAdder::new(SchemaTableName::new("db", "t"), 2);
        for value in ["a", "b", "c", "d", "e"] {
            adder.add(partition(value, "q1"));
        }
        adder.execute(&catalog).unwrap();

        let names = catalog.get_partition_names("db", "t").unwrap().unwrap();
        assert_eq!(names.len(), 5);

        let failed = adder.rollback(&catalog);
        assert!(failed.is_empty());
        assert!(catalog.get_partition_names("db", "t").unwrap().unwrap().is_empty());
    }

    #[test]
    fn test_partition_adder_table_vanished() {
        let (catalog, _temp) = catalog();
        let mut adder = PartitionAdder::new(SchemaTableName::new("db", "t"), 8);
        adder.add(partition("a", "q1"));

        let result = adder.execute(&catalog);
        assert!(matches!(result, Err(MetastoreError::TableDroppedDuringQuery(_))));
    }

    #[test]
    fn test_irreversible_op_descriptions() {
        let drop_table = IrreversibleOp::DropTable {
            table: SchemaTableName::new("db", "t"),
        };
        assert_eq!(drop_table.description(), "drop table db.t");

        let drop_partition = IrreversibleOp::DropPartition {
            table: SchemaTableName::new("db", "t"),
            values: vec!["a".to_string()],
        };
        assert!(drop_partition.description().contains("db.t"));
    }
}
