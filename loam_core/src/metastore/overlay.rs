//! Read-through overlay.
//!
//! Reads answer as if the pending actions had already been applied: a
//! buffered table wins over the catalog, a buffered drop reads as absent,
//! and partitions staged by this transaction report their staging location
//! so in-transaction readers see the staged files.

use std::collections::{HashMap, HashSet};

use crate::catalog::{
    make_partition_name, partition_values_from_name, partition_values_match, Catalog, Partition,
    PrivilegeGrant, Principal, SchemaTableName, Table,
};
use crate::stats::PartitionStatistics;

use super::action::ActionLog;
use super::error::MetastoreError;
use super::types::{Action, TableSource};

pub(crate) struct ReadOverlay<'a> {
    actions: &'a ActionLog,
    catalog: &'a dyn Catalog,
}

impl<'a> ReadOverlay<'a> {
    pub(crate) fn new(actions: &'a ActionLog, catalog: &'a dyn Catalog) -> Self {
        Self { actions, catalog }
    }

    pub(crate) fn get_table(&self, key: &SchemaTableName) -> Result<Option<Table>, MetastoreError> {
        match self.actions.table_action(key) {
            None => self
                .catalog
                .get_table(&key.schema, &key.table)
                .map_err(Into::into),
            Some(Action::Add(data)) | Some(Action::Alter(data)) | Some(Action::InsertExisting(data)) => {
                Ok(Some(data.table.clone()))
            }
            Some(Action::Drop(_)) => Ok(None),
        }
    }

    pub(crate) fn get_table_statistics(
        &self,
        key: &SchemaTableName,
    ) -> Result<PartitionStatistics, MetastoreError> {
        match self.actions.table_action(key) {
            None => self
                .catalog
                .get_table_statistics(&key.schema, &key.table)
                .map_err(Into::into),
            Some(Action::Add(data)) | Some(Action::Alter(data)) | Some(Action::InsertExisting(data)) => {
                Ok(data.statistics.clone())
            }
            Some(Action::Drop(_)) => Ok(PartitionStatistics::empty()),
        }
    }

    pub(crate) fn list_table_privileges(
        &self,
        key: &SchemaTableName,
        principal: Option<&Principal>,
    ) -> Result<Vec<PrivilegeGrant>, MetastoreError> {
        match self.actions.table_action(key) {
            None | Some(Action::InsertExisting(_)) => self
                .catalog
                .list_table_privileges(&key.schema, &key.table, principal)
                .map_err(Into::into),
            Some(Action::Add(data)) | Some(Action::Alter(data)) => Ok(data
                .principal_privileges
                .as_ref()
                .map(|privileges| {
                    privileges
                        .grants
                        .iter()
                        .filter(|grant| principal.map_or(true, |p| grant.grantee == *p))
                        .cloned()
                        .collect()
                })
                .unwrap_or_default()),
            Some(Action::Drop(_)) => Ok(Vec::new()),
        }
    }

    /// Partition with its location overridden to the staging location when
    /// this transaction staged it
    pub(crate) fn get_partition(
        &self,
        key: &SchemaTableName,
        values: &[String],
    ) -> Result<Option<Partition>, MetastoreError> {
        match self.actions.partition_action(key, values) {
            None => self
                .catalog
                .get_partition(&key.schema, &key.table, values)
                .map_err(Into::into),
            Some(Action::Add(data)) | Some(Action::Alter(data)) | Some(Action::InsertExisting(data)) => {
                let mut partition = data.partition.clone();
                partition.location = data.current_location.clone();
                Ok(Some(partition))
            }
            Some(Action::Drop(_)) => Ok(None),
        }
    }

    pub(crate) fn get_partitions_by_names(
        &self,
        key: &SchemaTableName,
        names: &[String],
    ) -> Result<HashMap<String, Option<Partition>>, MetastoreError> {
        let mut result = HashMap::new();
        let mut unresolved = Vec::new();
        for name in names {
            let values = partition_values_from_name(name);
            match self.actions.partition_action(key, &values) {
                None => unresolved.push(name.clone()),
                Some(Action::Add(data))
                | Some(Action::Alter(data))
                | Some(Action::InsertExisting(data)) => {
                    let mut partition = data.partition.clone();
                    partition.location = data.current_location.clone();
                    result.insert(name.clone(), Some(partition));
                }
                Some(Action::Drop(_)) => {
                    result.insert(name.clone(), None);
                }
            }
        }
        if !unresolved.is_empty() {
            let fetched = self
                .catalog
                .get_partitions_by_names(&key.schema, &key.table, &unresolved)?;
            result.extend(fetched);
        }
        Ok(result)
    }

    pub(crate) fn get_partition_statistics(
        &self,
        key: &SchemaTableName,
        partition_names: &[String],
    ) -> Result<HashMap<String, PartitionStatistics>, MetastoreError> {
        let mut result = HashMap::new();
        let mut unresolved = Vec::new();
        for name in partition_names {
            let values = partition_values_from_name(name);
            match self.actions.partition_action(key, &values) {
                None => unresolved.push(name.clone()),
                Some(Action::Add(data))
                | Some(Action::Alter(data))
                | Some(Action::InsertExisting(data)) => {
                    result.insert(name.clone(), data.statistics.clone());
                }
                Some(Action::Drop(_)) => {}
            }
        }
        if !unresolved.is_empty() {
            let fetched =
                self.catalog
                    .get_partition_statistics(&key.schema, &key.table, &unresolved)?;
            result.extend(fetched);
        }
        Ok(result)
    }

    fn table_source(&self, key: &SchemaTableName) -> Result<TableSource, MetastoreError> {
        match self.actions.table_action(key) {
            None | Some(Action::InsertExisting(_)) => Ok(TableSource::PreExisting),
            Some(Action::Add(_)) | Some(Action::Alter(_)) => {
                Ok(TableSource::CreatedInThisTransaction)
            }
            Some(Action::Drop(_)) => Err(MetastoreError::TableNotFound(key.clone())),
        }
    }

    /// Partition names as they will exist after commit, optionally filtered
    /// by a positional value pattern
    pub(crate) fn get_partition_names(
        &self,
        key: &SchemaTableName,
        parts: Option<&[String]>,
    ) -> Result<Option<Vec<String>>, MetastoreError> {
        let Some(table) = self.get_table(key)? else {
            return Ok(None);
        };
        let source = self.table_source(key)?;
        let catalog_names = match source {
            TableSource::CreatedInThisTransaction => Vec::new(),
            TableSource::PreExisting => match parts {
                None => self.catalog.get_partition_names(&key.schema, &key.table),
                Some(parts) => {
                    self.catalog
                        .get_partition_names_by_parts(&key.schema, &key.table, parts)
                }
            }
            .map_err(MetastoreError::from)?
            .ok_or_else(|| {
                MetastoreError::TransactionConflict(format!(
                    "Table {key} was dropped by another transaction"
                ))
            })?,
        };

        let mut names = Vec::new();
        let mut covered: HashSet<Vec<String>> = HashSet::new();
        for name in catalog_names {
            let values = partition_values_from_name(&name);
            covered.insert(values.clone());
            match self.actions.partition_action(key, &values) {
                None => names.push(name),
                Some(Action::Add(_)) => {
                    return Err(MetastoreError::TransactionConflict(format!(
                        "Another transaction created partition {values:?} of table {key}"
                    )));
                }
                Some(Action::Drop(_)) => {}
                Some(Action::Alter(_)) | Some(Action::InsertExisting(_)) => names.push(name),
            }
        }
        for (values, action) in self.actions.partition_actions(key) {
            let matches_filter = parts.map_or(true, |parts| partition_values_match(values, parts));
            if matches!(action, Action::Add(_)) && !covered.contains(values) && matches_filter {
                names.push(make_partition_name(&table.partition_columns, values));
            }
        }
        Ok(Some(names))
    }

    /// Listing is not reconciled with pending table actions
    pub(crate) fn get_all_tables(&self, schema: &str) -> Result<Option<Vec<String>>, MetastoreError> {
        self.check_no_table_actions()?;
        self.catalog.get_all_tables(schema).map_err(Into::into)
    }

    pub(crate) fn get_all_views(&self, schema: &str) -> Result<Option<Vec<String>>, MetastoreError> {
        self.check_no_table_actions()?;
        self.catalog.get_all_views(schema).map_err(Into::into)
    }

    fn check_no_table_actions(&self) -> Result<(), MetastoreError> {
        if self.actions.has_table_actions() {
            return Err(MetastoreError::NotSupported(
                "Listing all tables or views after adding, dropping, or altering a table or view in the same transaction is not supported"
                    .to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{
        Column, Database, FileCatalog, PartitionWithStatistics, PrincipalPrivileges, TableType,
        QUERY_ID_PARAM,
    };
    use crate::fs::OpContext;
    use crate::metastore::types::{PartitionAndMore, TableAndMore};
    use crate::stats::BasicStatistics;
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn ctx() -> OpContext {
        OpContext::new("alice", "q1")
    }

    fn key() -> SchemaTableName {
        SchemaTableName::new("db", "t")
    }

    fn test_table(partitioned: bool) -> Table {
        Table {
            schema_name: "db".to_string(),
            table_name: "t".to_string(),
            owner: "alice".to_string(),
            table_type: TableType::Managed,
            data_columns: vec![Column::new("c", "bigint")],
            partition_columns: if partitioned {
                vec![Column::new("p", "string")]
            } else {
                vec![]
            },
            location: Some(PathBuf::from("/warehouse/db/t")),
            parameters: HashMap::new(),
        }
    }

    fn table_and_more() -> TableAndMore {
        TableAndMore::new(
            test_table(true),
            ctx(),
            None,
            Some(PathBuf::from("/staging/q1/t")),
            None,
            false,
            PartitionStatistics::basic_only(BasicStatistics::new(1, 10, 100, 0)),
            PartitionStatistics::empty(),
        )
        .unwrap()
    }

    fn partition_and_more(value: &str) -> PartitionAndMore {
        let mut parameters = HashMap::new();
        parameters.insert(QUERY_ID_PARAM.to_string(), "q1".to_string());
        PartitionAndMore::new(
            Partition {
                schema_name: "db".to_string(),
                table_name: "t".to_string(),
                values: vec![value.to_string()],
                location: PathBuf::from(format!("/warehouse/db/t/p={value}")),
                parameters,
            },
            ctx(),
            format!("/staging/q1/p={value}"),
            None,
            PartitionStatistics::empty(),
            PartitionStatistics::empty(),
        )
    }

    fn seeded_catalog(temp: &TempDir, partition_values: &[&str]) -> FileCatalog {
        let catalog = FileCatalog::new(temp.path().join("catalog")).unwrap();
        catalog.create_database(Database::new("db", "admin")).unwrap();
        catalog
            .create_table(test_table(true), PrincipalPrivileges::default())
            .unwrap();
        let partitions: Vec<PartitionWithStatistics> = partition_values
            .iter()
            .map(|value| {
                PartitionWithStatistics::new(
                    Partition {
                        schema_name: "db".to_string(),
                        table_name: "t".to_string(),
                        values: vec![value.to_string()],
                        location: PathBuf::from(format!("/warehouse/db/t/p={value}")),
                        parameters: HashMap::new(),
                    },
                    format!("p={value}"),
                    PartitionStatistics::empty(),
                )
            })
            .collect();
        catalog.add_partitions("db", "t", &partitions).unwrap();
        catalog
    }

    #[test]
    fn test_get_table_overlay() {
        let temp = TempDir::new().unwrap();
        let catalog = seeded_catalog(&temp, &[]);
        let mut actions = ActionLog::new();

        // No action: catalog answer
        let overlay = ReadOverlay::new(&actions, &catalog);
        assert!(overlay.get_table(&key()).unwrap().is_some());

        // Drop: absent
        actions.drop_table(ctx(), key()).unwrap();
        let overlay = ReadOverlay::new(&actions, &catalog);
        assert!(overlay.get_table(&key()).unwrap().is_none());

        // Drop + create: buffered table
        actions.create_table(table_and_more()).unwrap();
        let overlay = ReadOverlay::new(&actions, &catalog);
        assert!(overlay.get_table(&key()).unwrap().is_some());
    }

    #[test]
    fn test_get_partition_is_augmented() {
        let temp = TempDir::new().unwrap();
        let catalog = seeded_catalog(&temp, &[]);
        let mut actions = ActionLog::new();
        actions.add_partition(partition_and_more("a")).unwrap();

        let overlay = ReadOverlay::new(&actions, &catalog);
        let partition = overlay
            .get_partition(&key(), &["a".to_string()])
            .unwrap()
            .unwrap();
        // Staged location, not the final one
        assert_eq!(partition.location, PathBuf::from("/staging/q1/p=a"));
    }

    #[test]
    fn test_get_partition_names_overlay() {
        let temp = TempDir::new().unwrap();
        let catalog = seeded_catalog(&temp, &["1", "2", "3"]);
        let mut actions = ActionLog::new();
        actions
            .drop_partition(ctx(), key(), vec!["2".to_string()])
            .unwrap();
        actions.add_partition(partition_and_more("4")).unwrap();

        let overlay = ReadOverlay::new(&actions, &catalog);
        let mut names = overlay.get_partition_names(&key(), None).unwrap().unwrap();
        names.sort();
        assert_eq!(names, vec!["p=1", "p=3", "p=4"]);

        let filtered = overlay
            .get_partition_names(&key(), Some(&["1".to_string()]))
            .unwrap()
            .unwrap();
        assert_eq!(filtered, vec!["p=1"]);

        let all = overlay
            .get_partition_names(&key(), Some(&["".to_string()]))
            .unwrap()
            .unwrap();
        assert_eq!(all.len(), 3);
    }

    #[test]
    fn test_get_partition_names_conflict_on_foreign_add() {
        let temp = TempDir::new().unwrap();
        let catalog = seeded_catalog(&temp, &["4"]);
        let mut actions = ActionLog::new();
        // This transaction believes it is creating p=4, but the catalog
        // already has it: another transaction won
        actions.add_partition(partition_and_more("4")).unwrap();

        let overlay = ReadOverlay::new(&actions, &catalog);
        let result = overlay.get_partition_names(&key(), None);
        assert!(matches!(result, Err(MetastoreError::TransactionConflict(_))));
    }

    #[test]
    fn test_get_partition_names_created_table_ignores_catalog() {
        let temp = TempDir::new().unwrap();
        let catalog = seeded_catalog(&temp, &["old"]);
        let mut actions = ActionLog::new();
        // Drop + recreate: the old catalog partitions belong to the dropped
        // incarnation
        actions.drop_table(ctx(), key()).unwrap();
        actions.create_table(table_and_more()).unwrap();
        actions.add_partition(partition_and_more("new")).unwrap();

        let overlay = ReadOverlay::new(&actions, &catalog);
        let names = overlay.get_partition_names(&key(), None).unwrap().unwrap();
        assert_eq!(names, vec!["p=new"]);
    }

    #[test]
    fn test_get_partition_names_dropped_by_other_transaction() {
        let temp = TempDir::new().unwrap();
        let catalog = FileCatalog::new(temp.path().join("catalog")).unwrap();
        let mut actions = ActionLog::new();
        // The table is visible through the action log but vanished from the
        // catalog
        actions.insert_into_table(table_and_more()).unwrap();

        let overlay = ReadOverlay::new(&actions, &catalog);
        let result = overlay.get_partition_names(&key(), None);
        assert!(matches!(result, Err(MetastoreError::TransactionConflict(_))));
    }

    #[test]
    fn test_get_partitions_by_names_mixed() {
        let temp = TempDir::new().unwrap();
        let catalog = seeded_catalog(&temp, &["1", "2"]);
        let mut actions = ActionLog::new();
        actions
            .drop_partition(ctx(), key(), vec!["2".to_string()])
            .unwrap();

        let overlay = ReadOverlay::new(&actions, &catalog);
        let result = overlay
            .get_partitions_by_names(&key(), &["p=1".to_string(), "p=2".to_string()])
            .unwrap();
        assert!(result["p=1"].is_some());
        assert!(result["p=2"].is_none());
    }

    #[test]
    fn test_table_statistics_overlay() {
        let temp = TempDir::new().unwrap();
        let catalog = seeded_catalog(&temp, &[]);
        let mut actions = ActionLog::new();
        actions.drop_table(ctx(), key()).unwrap();
        actions.create_table(table_and_more()).unwrap();

        let overlay = ReadOverlay::new(&actions, &catalog);
        let statistics = overlay.get_table_statistics(&key()).unwrap();
        assert_eq!(statistics.basic.row_count, Some(10));
    }

    #[test]
    fn test_listing_guard() {
        let temp = TempDir::new().unwrap();
        let catalog = seeded_catalog(&temp, &[]);
        let mut actions = ActionLog::new();

        let overlay = ReadOverlay::new(&actions, &catalog);
        assert_eq!(overlay.get_all_tables("db").unwrap().unwrap(), vec!["t"]);

        actions.drop_table(ctx(), key()).unwrap();
        let overlay = ReadOverlay::new(&actions, &catalog);
        assert!(matches!(
            overlay.get_all_tables("db"),
            Err(MetastoreError::NotSupported(_))
        ));
        assert!(matches!(
            overlay.get_all_views("db"),
            Err(MetastoreError::NotSupported(_))
        ));
    }
}
