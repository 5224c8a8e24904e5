//! Per-entity action log.
//!
//! At most one pending action exists per table key and per partition key.
//! Registration enforces the collision rules: a drop followed by a create of
//! the same key collapses to an alter (so the old data directory survives
//! until commit), conflicting registrations fail synchronously, and a
//! cross-user collision on the same key is a transaction conflict.
//!
//! Iteration order is insertion order; the committer replays the log in the
//! order operations were buffered.

use std::collections::HashMap;

use crate::catalog::SchemaTableName;
use crate::fs::OpContext;

use super::error::MetastoreError;
use super::types::{Action, PartitionAndMore, TableAndMore};

#[derive(Default)]
pub struct ActionLog {
    table_order: Vec<SchemaTableName>,
    tables: HashMap<SchemaTableName, Action<TableAndMore>>,
    partition_order: Vec<(SchemaTableName, Vec<String>)>,
    partitions: HashMap<SchemaTableName, HashMap<Vec<String>, Action<PartitionAndMore>>>,
}

impl ActionLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty() && self.partitions.values().all(|p| p.is_empty())
    }

    pub fn has_table_actions(&self) -> bool {
        !self.tables.is_empty()
    }

    pub fn table_action(&self, key: &SchemaTableName) -> Option<&Action<TableAndMore>> {
        self.tables.get(key)
    }

    pub fn partition_action(
        &self,
        table: &SchemaTableName,
        values: &[String],
    ) -> Option<&Action<PartitionAndMore>> {
        self.partitions.get(table)?.get(values)
    }

    /// All partition actions of one table
    pub fn partition_actions(
        &self,
        table: &SchemaTableName,
    ) -> impl Iterator<Item = (&Vec<String>, &Action<PartitionAndMore>)> {
        self.partitions.get(table).into_iter().flatten()
    }

    pub fn has_partition_actions(&self, table: &SchemaTableName) -> bool {
        self.partitions.get(table).is_some_and(|p| !p.is_empty())
    }

    /// Table actions in the order they were first registered
    pub fn tables_in_order(
        &self,
    ) -> impl Iterator<Item = (&SchemaTableName, &Action<TableAndMore>)> {
        self.table_order
            .iter()
            .filter_map(|key| self.tables.get(key).map(|action| (key, action)))
    }

    /// Partition actions in the order they were first registered
    pub fn partitions_in_order(
        &self,
    ) -> impl Iterator<Item = (&SchemaTableName, &Vec<String>, &Action<PartitionAndMore>)> {
        self.partition_order.iter().filter_map(|(table, values)| {
            self.partitions
                .get(table)
                .and_then(|actions| actions.get_key_value(values))
                .map(|(values, action)| (table, values, action))
        })
    }

    fn put_table(&mut self, key: SchemaTableName, action: Action<TableAndMore>) {
        if !self.tables.contains_key(&key) {
            self.table_order.push(key.clone());
        }
        self.tables.insert(key, action);
    }

    fn put_partition(
        &mut self,
        table: SchemaTableName,
        values: Vec<String>,
        action: Action<PartitionAndMore>,
    ) {
        let actions = self.partitions.entry(table.clone()).or_default();
        if !actions.contains_key(&values) {
            self.partition_order.push((table, values.clone()));
        }
        actions.insert(values, action);
    }

    /// Schema changes to a table with staged partitions would strand the
    /// staging data
    fn check_no_partition_action(&self, key: &SchemaTableName) -> Result<(), MetastoreError> {
        if self.has_partition_actions(key) {
            return Err(MetastoreError::NotSupported(format!(
                "Cannot add or drop table {key} with modified partitions in the same transaction"
            )));
        }
        Ok(())
    }

    // === Registration rules ===

    pub fn create_table(&mut self, table_and_more: TableAndMore) -> Result<(), MetastoreError> {
        let key = table_and_more.schema_table_name();
        self.check_no_partition_action(&key)?;
        match self.tables.get(&key) {
            None => {
                self.put_table(key, Action::Add(table_and_more));
                Ok(())
            }
            Some(Action::Drop(ctx)) => {
                if ctx.user != table_and_more.ctx.user {
                    return Err(MetastoreError::TransactionConflict(
                        "Operation on the same table with different user in the same transaction is not supported"
                            .to_string(),
                    ));
                }
                self.put_table(key, Action::Alter(table_and_more));
                Ok(())
            }
            Some(Action::Add(_)) | Some(Action::Alter(_)) | Some(Action::InsertExisting(_)) => {
                Err(MetastoreError::TableAlreadyExists(key))
            }
        }
    }

    pub fn drop_table(
        &mut self,
        ctx: OpContext,
        key: SchemaTableName,
    ) -> Result<(), MetastoreError> {
        self.check_no_partition_action(&key)?;
        match self.tables.get(&key) {
            None | Some(Action::Alter(_)) => {
                self.put_table(key, Action::Drop(ctx));
                Ok(())
            }
            Some(Action::Drop(_)) => Err(MetastoreError::TableNotFound(key)),
            Some(Action::Add(_)) | Some(Action::InsertExisting(_)) => {
                Err(MetastoreError::NotSupported(format!(
                    "Dropping table {key} that was added or inserted into in the same transaction is not supported"
                )))
            }
        }
    }

    pub fn insert_into_table(&mut self, table_and_more: TableAndMore) -> Result<(), MetastoreError> {
        let key = table_and_more.schema_table_name();
        match self.tables.get(&key) {
            None => {
                self.put_table(key, Action::InsertExisting(table_and_more));
                Ok(())
            }
            Some(Action::Drop(_)) => Err(MetastoreError::TableNotFound(key)),
            Some(Action::Add(_)) | Some(Action::Alter(_)) | Some(Action::InsertExisting(_)) => {
                Err(MetastoreError::NotSupported(format!(
                    "Inserting into table {key} that was added, altered, or inserted into in the same transaction is not supported"
                )))
            }
        }
    }

    pub fn add_partition(
        &mut self,
        partition_and_more: PartitionAndMore,
    ) -> Result<(), MetastoreError> {
        let table = partition_and_more.schema_table_name();
        let values = partition_and_more.partition.values.clone();
        match self.partition_action(&table, &values) {
            None => {
                self.put_partition(table, values, Action::Add(partition_and_more));
                Ok(())
            }
            Some(Action::Drop(ctx)) => {
                if ctx.user != partition_and_more.ctx.user {
                    return Err(MetastoreError::TransactionConflict(
                        "Operation on the same partition with different user in the same transaction is not supported"
                            .to_string(),
                    ));
                }
                self.put_partition(table, values, Action::Alter(partition_and_more));
                Ok(())
            }
            Some(Action::Add(_)) | Some(Action::Alter(_)) | Some(Action::InsertExisting(_)) => {
                Err(MetastoreError::PartitionAlreadyExists { table, values })
            }
        }
    }

    pub fn drop_partition(
        &mut self,
        ctx: OpContext,
        table: SchemaTableName,
        values: Vec<String>,
    ) -> Result<(), MetastoreError> {
        match self.partition_action(&table, &values) {
            None => {
                self.put_partition(table, values, Action::Drop(ctx));
                Ok(())
            }
            Some(Action::Drop(_)) => Err(MetastoreError::PartitionNotFound { table, values }),
            Some(Action::Add(_)) | Some(Action::Alter(_)) | Some(Action::InsertExisting(_)) => {
                Err(MetastoreError::NotSupported(format!(
                    "Dropping partition {values:?} of table {table} that was added or modified in the same transaction is not supported"
                )))
            }
        }
    }

    pub fn insert_into_partition(
        &mut self,
        partition_and_more: PartitionAndMore,
    ) -> Result<(), MetastoreError> {
        let table = partition_and_more.schema_table_name();
        let values = partition_and_more.partition.values.clone();
        match self.partition_action(&table, &values) {
            None => {
                self.put_partition(table, values, Action::InsertExisting(partition_and_more));
                Ok(())
            }
            Some(Action::Drop(_)) => Err(MetastoreError::PartitionNotFound { table, values }),
            Some(Action::Add(_)) | Some(Action::Alter(_)) | Some(Action::InsertExisting(_)) => {
                Err(MetastoreError::NotSupported(format!(
                    "Inserting into partition {values:?} of table {table} that was added or modified in the same transaction is not supported"
                )))
            }
        }
    }
}
