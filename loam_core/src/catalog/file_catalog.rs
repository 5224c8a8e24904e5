//! File-backed catalog.
//!
//! Storage layout:
//! ```text
//! {base_path}/
//! +-- .lock                         # fs2 exclusive lock for mutations
//! +-- roles.json                    # roles and role grants
//! +-- databases/
//! |   +-- {db}.json                 # Database
//! +-- tables/
//! |   +-- {db}/{table}.json         # table, privileges, statistics
//! +-- partitions/
//!     +-- {db}/{table}/{name}.json  # partition, name, statistics
//! ```
//!
//! Partition names used as file names have `/` encoded as `__`. Every write
//! goes through a temp file followed by a rename, so readers never observe a
//! partially written entity. Mutations take a cross-process exclusive lock;
//! reads are lock-free and may race writers, which is exactly the contract
//! the coordinator assumes of an external catalog.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use fs2::FileExt;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::error::CatalogError;
use super::types::*;
use super::{Catalog, StatisticsUpdate};
use crate::stats::PartitionStatistics;

const LOCK_FILE: &str = ".lock";
const ROLES_FILE: &str = "roles.json";
const DATABASES_DIR: &str = "databases";
const TABLES_DIR: &str = "tables";
const PARTITIONS_DIR: &str = "partitions";

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredTable {
    table: Table,
    privileges: PrincipalPrivileges,
    statistics: PartitionStatistics,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredPartition {
    partition: Partition,
    name: String,
    statistics: PartitionStatistics,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct StoredRoles {
    /// role name -> grantor
    roles: HashMap<String, String>,
    grants: Vec<RoleGrant>,
}

pub struct FileCatalog {
    base_path: PathBuf,
}

impl FileCatalog {
    pub fn new(base_path: impl AsRef<Path>) -> Result<Self, CatalogError> {
        let base_path = base_path.as_ref().to_path_buf();
        fs::create_dir_all(base_path.join(DATABASES_DIR))?;
        fs::create_dir_all(base_path.join(TABLES_DIR))?;
        fs::create_dir_all(base_path.join(PARTITIONS_DIR))?;
        Ok(Self { base_path })
    }

    /// Acquire the exclusive mutation lock.
    ///
    /// Returns the lock file handle; the lock is held until the handle is
    /// dropped.
    fn acquire_lock(&self) -> Result<fs::File, CatalogError> {
        let lock_path = self.base_path.join(LOCK_FILE);
        let lock_file = fs::OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(&lock_path)
            .map_err(|_| CatalogError::LockError(lock_path.clone()))?;
        lock_file
            .lock_exclusive()
            .map_err(|_| CatalogError::LockError(lock_path))?;
        Ok(lock_file)
    }

    fn database_path(&self, name: &str) -> PathBuf {
        self.base_path.join(DATABASES_DIR).join(format!("{name}.json"))
    }

    fn table_path(&self, schema: &str, table: &str) -> PathBuf {
        self.base_path
            .join(TABLES_DIR)
            .join(schema)
            .join(format!("{table}.json"))
    }

    fn partitions_dir(&self, schema: &str, table: &str) -> PathBuf {
        self.base_path.join(PARTITIONS_DIR).join(schema).join(table)
    }

    fn partition_path(&self, schema: &str, table: &str, name: &str) -> PathBuf {
        self.partitions_dir(schema, table)
            .join(format!("{}.json", encode_name(name)))
    }

    fn read_json<T: DeserializeOwned>(&self, path: &Path) -> Result<Option<T>, CatalogError> {
        let json = match fs::read_to_string(path) {
            Ok(json) => json,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        Ok(Some(serde_json::from_str(&json)?))
    }

    /// Write atomically: temp file in the same directory, then rename
    fn write_json<T: Serialize>(&self, path: &Path, value: &T) -> Result<(), CatalogError> {
        let parent = path
            .parent()
            .ok_or_else(|| CatalogError::Other(format!("no parent for {}", path.display())))?;
        fs::create_dir_all(parent)?;
        let temp_path = parent.join(format!(".{}.tmp", Uuid::new_v4()));
        let json = serde_json::to_string_pretty(value)?;
        fs::write(&temp_path, &json)?;
        fs::rename(&temp_path, path)?;
        Ok(())
    }

    fn read_stored_table(
        &self,
        schema: &str,
        table: &str,
    ) -> Result<Option<StoredTable>, CatalogError> {
        self.read_json(&self.table_path(schema, table))
    }

    fn require_stored_table(&self, schema: &str, table: &str) -> Result<StoredTable, CatalogError> {
        self.read_stored_table(schema, table)?
            .ok_or_else(|| CatalogError::TableNotFound(SchemaTableName::new(schema, table)))
    }

    fn read_roles(&self) -> Result<StoredRoles, CatalogError> {
        Ok(self
            .read_json(&self.base_path.join(ROLES_FILE))?
            .unwrap_or_default())
    }

    fn write_roles(&self, roles: &StoredRoles) -> Result<(), CatalogError> {
        self.write_json(&self.base_path.join(ROLES_FILE), roles)
    }

    /// Names of entries in a directory, dot-entries skipped, `.json` stripped
    fn list_entries(&self, dir: &Path) -> Result<Vec<String>, CatalogError> {
        let entries = match fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        let mut names = Vec::new();
        for entry in entries {
            let entry = entry?;
            let file_name = entry.file_name();
            let Some(name) = file_name.to_str() else {
                continue;
            };
            if name.starts_with('.') {
                continue;
            }
            names.push(name.trim_end_matches(".json").to_string());
        }
        names.sort();
        Ok(names)
    }

    fn list_stored_partitions(
        &self,
        schema: &str,
        table: &str,
    ) -> Result<Vec<StoredPartition>, CatalogError> {
        let dir = self.partitions_dir(schema, table);
        let mut stored = Vec::new();
        for encoded in self.list_entries(&dir)? {
            if let Some(partition) =
                self.read_json::<StoredPartition>(&dir.join(format!("{encoded}.json")))?
            {
                stored.push(partition);
            }
        }
        stored.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(stored)
    }
}

/// Partition names contain `/`; encode it for use as a file name
fn encode_name(name: &str) -> String {
    name.replace('/', "__")
}

impl Catalog for FileCatalog {
    fn get_database(&self, name: &str) -> Result<Option<Database>, CatalogError> {
        self.read_json(&self.database_path(name))
    }

    fn list_databases(&self) -> Result<Vec<String>, CatalogError> {
        self.list_entries(&self.base_path.join(DATABASES_DIR))
    }

    fn create_database(&self, database: Database) -> Result<(), CatalogError> {
        let _lock = self.acquire_lock()?;
        let path = self.database_path(&database.name);
        if path.exists() {
            return Err(CatalogError::DatabaseAlreadyExists(database.name));
        }
        self.write_json(&path, &database)
    }

    fn drop_database(&self, name: &str) -> Result<(), CatalogError> {
        let _lock = self.acquire_lock()?;
        let path = self.database_path(name);
        if !path.exists() {
            return Err(CatalogError::DatabaseNotFound(name.to_string()));
        }
        if !self.list_entries(&self.base_path.join(TABLES_DIR).join(name))?.is_empty() {
            return Err(CatalogError::Other(format!("Database {name} is not empty")));
        }
        fs::remove_file(path)?;
        let _ = fs::remove_dir_all(self.base_path.join(TABLES_DIR).join(name));
        let _ = fs::remove_dir_all(self.base_path.join(PARTITIONS_DIR).join(name));
        Ok(())
    }

    fn rename_database(&self, name: &str, new_name: &str) -> Result<(), CatalogError> {
        let _lock = self.acquire_lock()?;
        let mut database = self
            .read_json::<Database>(&self.database_path(name))?
            .ok_or_else(|| CatalogError::DatabaseNotFound(name.to_string()))?;
        if self.database_path(new_name).exists() {
            return Err(CatalogError::DatabaseAlreadyExists(new_name.to_string()));
        }
        database.name = new_name.to_string();
        self.write_json(&self.database_path(new_name), &database)?;
        fs::remove_file(self.database_path(name))?;

        // Move the schema's table and partition trees, rewriting the schema
        // name embedded in each table
        let old_tables = self.base_path.join(TABLES_DIR).join(name);
        if old_tables.exists() {
            let new_tables = self.base_path.join(TABLES_DIR).join(new_name);
            fs::rename(&old_tables, &new_tables)?;
            for table_name in self.list_entries(&new_tables)? {
                if let Some(mut stored) = self.read_stored_table(new_name, &table_name)? {
                    stored.table.schema_name = new_name.to_string();
                    self.write_json(&self.table_path(new_name, &table_name), &stored)?;
                }
            }
        }
        let old_partitions = self.base_path.join(PARTITIONS_DIR).join(name);
        if old_partitions.exists() {
            fs::rename(&old_partitions, self.base_path.join(PARTITIONS_DIR).join(new_name))?;
        }
        Ok(())
    }

    fn get_table(&self, schema: &str, table: &str) -> Result<Option<Table>, CatalogError> {
        Ok(self.read_stored_table(schema, table)?.map(|s| s.table))
    }

    fn get_all_tables(&self, schema: &str) -> Result<Option<Vec<String>>, CatalogError> {
        if !self.database_path(schema).exists() {
            return Ok(None);
        }
        let mut tables = Vec::new();
        for name in self.list_entries(&self.base_path.join(TABLES_DIR).join(schema))? {
            if let Some(stored) = self.read_stored_table(schema, &name)? {
                if !stored.table.is_view() {
                    tables.push(name);
                }
            }
        }
        Ok(Some(tables))
    }

    fn get_all_views(&self, schema: &str) -> Result<Option<Vec<String>>, CatalogError> {
        if !self.database_path(schema).exists() {
            return Ok(None);
        }
        let mut views = Vec::new();
        for name in self.list_entries(&self.base_path.join(TABLES_DIR).join(schema))? {
            if let Some(stored) = self.read_stored_table(schema, &name)? {
                if stored.table.is_view() {
                    views.push(name);
                }
            }
        }
        Ok(Some(views))
    }

    fn create_table(
        &self,
        table: Table,
        privileges: PrincipalPrivileges,
    ) -> Result<(), CatalogError> {
        let _lock = self.acquire_lock()?;
        if !self.database_path(&table.schema_name).exists() {
            return Err(CatalogError::DatabaseNotFound(table.schema_name));
        }
        let path = self.table_path(&table.schema_name, &table.table_name);
        if path.exists() {
            return Err(CatalogError::TableAlreadyExists(table.schema_table_name()));
        }
        let stored = StoredTable {
            table,
            privileges,
            statistics: PartitionStatistics::empty(),
        };
        self.write_json(&path, &stored)
    }

    fn drop_table(&self, schema: &str, table: &str) -> Result<(), CatalogError> {
        let _lock = self.acquire_lock()?;
        let path = self.table_path(schema, table);
        if !path.exists() {
            return Err(CatalogError::TableNotFound(SchemaTableName::new(schema, table)));
        }
        fs::remove_file(path)?;
        let _ = fs::remove_dir_all(self.partitions_dir(schema, table));
        Ok(())
    }

    fn replace_table(
        &self,
        schema: &str,
        table: &str,
        new_table: Table,
        privileges: PrincipalPrivileges,
    ) -> Result<(), CatalogError> {
        let _lock = self.acquire_lock()?;
        let stored = self.require_stored_table(schema, table)?;
        let replacement = StoredTable {
            table: new_table,
            privileges,
            statistics: stored.statistics,
        };
        self.write_json(&self.table_path(schema, table), &replacement)
    }

    fn rename_table(
        &self,
        schema: &str,
        table: &str,
        new_schema: &str,
        new_table: &str,
    ) -> Result<(), CatalogError> {
        let _lock = self.acquire_lock()?;
        let mut stored = self.require_stored_table(schema, table)?;
        if !self.database_path(new_schema).exists() {
            return Err(CatalogError::DatabaseNotFound(new_schema.to_string()));
        }
        let new_path = self.table_path(new_schema, new_table);
        if new_path.exists() {
            return Err(CatalogError::TableAlreadyExists(SchemaTableName::new(
                new_schema, new_table,
            )));
        }
        stored.table.schema_name = new_schema.to_string();
        stored.table.table_name = new_table.to_string();
        self.write_json(&new_path, &stored)?;
        fs::remove_file(self.table_path(schema, table))?;

        let old_partitions = self.partitions_dir(schema, table);
        if old_partitions.exists() {
            let new_partitions = self.partitions_dir(new_schema, new_table);
            if let Some(parent) = new_partitions.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::rename(&old_partitions, &new_partitions)?;
        }
        Ok(())
    }

    fn add_column(&self, schema: &str, table: &str, column: Column) -> Result<(), CatalogError> {
        let _lock = self.acquire_lock()?;
        let mut stored = self.require_stored_table(schema, table)?;
        let exists = stored
            .table
            .data_columns
            .iter()
            .chain(stored.table.partition_columns.iter())
            .any(|c| c.name == column.name);
        if exists {
            return Err(CatalogError::Other(format!(
                "Column {} already exists in table {}.{}",
                column.name, schema, table
            )));
        }
        stored.table.data_columns.push(column);
        self.write_json(&self.table_path(schema, table), &stored)
    }

    fn rename_column(
        &self,
        schema: &str,
        table: &str,
        old_name: &str,
        new_name: &str,
    ) -> Result<(), CatalogError> {
        let _lock = self.acquire_lock()?;
        let mut stored = self.require_stored_table(schema, table)?;
        if stored.table.partition_columns.iter().any(|c| c.name == old_name) {
            return Err(CatalogError::Other(format!(
                "Renaming partition column {old_name} is not supported"
            )));
        }
        let column = stored
            .table
            .data_columns
            .iter_mut()
            .find(|c| c.name == old_name)
            .ok_or_else(|| CatalogError::ColumnNotFound {
                table: SchemaTableName::new(schema, table),
                column: old_name.to_string(),
            })?;
        column.name = new_name.to_string();
        self.write_json(&self.table_path(schema, table), &stored)
    }

    fn drop_column(&self, schema: &str, table: &str, column: &str) -> Result<(), CatalogError> {
        let _lock = self.acquire_lock()?;
        let mut stored = self.require_stored_table(schema, table)?;
        let before = stored.table.data_columns.len();
        stored.table.data_columns.retain(|c| c.name != column);
        if stored.table.data_columns.len() == before {
            return Err(CatalogError::ColumnNotFound {
                table: SchemaTableName::new(schema, table),
                column: column.to_string(),
            });
        }
        self.write_json(&self.table_path(schema, table), &stored)
    }

    fn get_partition(
        &self,
        schema: &str,
        table: &str,
        values: &[String],
    ) -> Result<Option<Partition>, CatalogError> {
        for stored in self.list_stored_partitions(schema, table)? {
            if stored.partition.values == values {
                return Ok(Some(stored.partition));
            }
        }
        Ok(None)
    }

    fn get_partition_names(
        &self,
        schema: &str,
        table: &str,
    ) -> Result<Option<Vec<String>>, CatalogError> {
        if self.read_stored_table(schema, table)?.is_none() {
            return Ok(None);
        }
        Ok(Some(
            self.list_stored_partitions(schema, table)?
                .into_iter()
                .map(|stored| stored.name)
                .collect(),
        ))
    }

    fn get_partition_names_by_parts(
        &self,
        schema: &str,
        table: &str,
        parts: &[String],
    ) -> Result<Option<Vec<String>>, CatalogError> {
        if self.read_stored_table(schema, table)?.is_none() {
            return Ok(None);
        }
        Ok(Some(
            self.list_stored_partitions(schema, table)?
                .into_iter()
                .filter(|stored| partition_values_match(&stored.partition.values, parts))
                .map(|stored| stored.name)
                .collect(),
        ))
    }

    fn get_partitions_by_names(
        &self,
        schema: &str,
        table: &str,
        names: &[String],
    ) -> Result<HashMap<String, Option<Partition>>, CatalogError> {
        let mut result = HashMap::new();
        for name in names {
            let stored =
                self.read_json::<StoredPartition>(&self.partition_path(schema, table, name))?;
            result.insert(name.clone(), stored.map(|s| s.partition));
        }
        Ok(result)
    }

    fn add_partitions(
        &self,
        schema: &str,
        table: &str,
        partitions: &[PartitionWithStatistics],
    ) -> Result<(), CatalogError> {
        let _lock = self.acquire_lock()?;
        self.require_stored_table(schema, table)?;
        for partition in partitions {
            if self.partition_path(schema, table, &partition.name).exists() {
                return Err(CatalogError::PartitionAlreadyExists {
                    table: SchemaTableName::new(schema, table),
                    values: partition.partition.values.clone(),
                });
            }
        }
        for partition in partitions {
            let stored = StoredPartition {
                partition: partition.partition.clone(),
                name: partition.name.clone(),
                statistics: partition.statistics.clone(),
            };
            self.write_json(&self.partition_path(schema, table, &partition.name), &stored)?;
        }
        Ok(())
    }

    fn drop_partition(
        &self,
        schema: &str,
        table: &str,
        values: &[String],
        _delete_data: bool,
    ) -> Result<(), CatalogError> {
        let _lock = self.acquire_lock()?;
        for stored in self.list_stored_partitions(schema, table)? {
            if stored.partition.values == values {
                fs::remove_file(self.partition_path(schema, table, &stored.name))?;
                return Ok(());
            }
        }
        Err(CatalogError::PartitionNotFound {
            table: SchemaTableName::new(schema, table),
            values: values.to_vec(),
        })
    }

    fn alter_partition(
        &self,
        schema: &str,
        table: &str,
        partition: &PartitionWithStatistics,
    ) -> Result<(), CatalogError> {
        let _lock = self.acquire_lock()?;
        let path = self.partition_path(schema, table, &partition.name);
        if !path.exists() {
            return Err(CatalogError::PartitionNotFound {
                table: SchemaTableName::new(schema, table),
                values: partition.partition.values.clone(),
            });
        }
        let stored = StoredPartition {
            partition: partition.partition.clone(),
            name: partition.name.clone(),
            statistics: partition.statistics.clone(),
        };
        self.write_json(&path, &stored)
    }

    fn get_table_statistics(
        &self,
        schema: &str,
        table: &str,
    ) -> Result<PartitionStatistics, CatalogError> {
        Ok(self.require_stored_table(schema, table)?.statistics)
    }

    fn get_partition_statistics(
        &self,
        schema: &str,
        table: &str,
        partition_names: &[String],
    ) -> Result<HashMap<String, PartitionStatistics>, CatalogError> {
        let mut result = HashMap::new();
        for name in partition_names {
            if let Some(stored) =
                self.read_json::<StoredPartition>(&self.partition_path(schema, table, name))?
            {
                result.insert(name.clone(), stored.statistics);
            }
        }
        Ok(result)
    }

    fn update_table_statistics(
        &self,
        schema: &str,
        table: &str,
        update: StatisticsUpdate<'_>,
    ) -> Result<(), CatalogError> {
        let _lock = self.acquire_lock()?;
        let mut stored = self.require_stored_table(schema, table)?;
        stored.statistics = update(stored.statistics);
        self.write_json(&self.table_path(schema, table), &stored)
    }

    fn update_partition_statistics(
        &self,
        schema: &str,
        table: &str,
        partition_name: &str,
        update: StatisticsUpdate<'_>,
    ) -> Result<(), CatalogError> {
        let _lock = self.acquire_lock()?;
        let path = self.partition_path(schema, table, partition_name);
        let mut stored = self
            .read_json::<StoredPartition>(&path)?
            .ok_or_else(|| CatalogError::PartitionNotFound {
                table: SchemaTableName::new(schema, table),
                values: partition_values_from_name(partition_name),
            })?;
        stored.statistics = update(stored.statistics);
        self.write_json(&path, &stored)
    }

    fn get_supported_column_statistics(
        &self,
        type_name: &str,
    ) -> Result<Vec<ColumnStatisticKind>, CatalogError> {
        let supported = match type_name {
            "tinyint" | "smallint" | "int" | "bigint" | "double" | "real" | "date"
            | "timestamp" => vec![
                ColumnStatisticKind::MinMax,
                ColumnStatisticKind::NullCount,
                ColumnStatisticKind::DistinctCount,
            ],
            "varchar" | "string" | "char" => vec![
                ColumnStatisticKind::NullCount,
                ColumnStatisticKind::DistinctCount,
                ColumnStatisticKind::TotalSize,
            ],
            "varbinary" => vec![ColumnStatisticKind::NullCount, ColumnStatisticKind::TotalSize],
            _ => vec![ColumnStatisticKind::NullCount],
        };
        Ok(supported)
    }

    fn list_roles(&self) -> Result<Vec<String>, CatalogError> {
        let mut roles: Vec<String> = self.read_roles()?.roles.into_keys().collect();
        roles.sort();
        Ok(roles)
    }

    fn create_role(&self, role: &str, grantor: &str) -> Result<(), CatalogError> {
        let _lock = self.acquire_lock()?;
        let mut stored = self.read_roles()?;
        if stored.roles.contains_key(role) {
            return Err(CatalogError::Other(format!("Role already exists: {role}")));
        }
        stored.roles.insert(role.to_string(), grantor.to_string());
        self.write_roles(&stored)
    }

    fn drop_role(&self, role: &str) -> Result<(), CatalogError> {
        let _lock = self.acquire_lock()?;
        let mut stored = self.read_roles()?;
        if stored.roles.remove(role).is_none() {
            return Err(CatalogError::RoleNotFound(role.to_string()));
        }
        stored.grants.retain(|grant| grant.role != role);
        self.write_roles(&stored)
    }

    fn grant_roles(
        &self,
        roles: &[String],
        grantees: &[Principal],
        admin_option: bool,
        _grantor: &Principal,
    ) -> Result<(), CatalogError> {
        let _lock = self.acquire_lock()?;
        let mut stored = self.read_roles()?;
        for role in roles {
            if !stored.roles.contains_key(role) {
                return Err(CatalogError::RoleNotFound(role.clone()));
            }
            for grantee in grantees {
                let grant = RoleGrant {
                    role: role.clone(),
                    grantee: grantee.clone(),
                    admin_option,
                };
                if !stored.grants.contains(&grant) {
                    stored.grants.retain(|g| {
                        !(g.role == grant.role && g.grantee == grant.grantee)
                    });
                    stored.grants.push(grant);
                }
            }
        }
        self.write_roles(&stored)
    }

    fn revoke_roles(
        &self,
        roles: &[String],
        grantees: &[Principal],
        _admin_option: bool,
    ) -> Result<(), CatalogError> {
        let _lock = self.acquire_lock()?;
        let mut stored = self.read_roles()?;
        stored.grants.retain(|grant| {
            !(roles.contains(&grant.role) && grantees.contains(&grant.grantee))
        });
        self.write_roles(&stored)
    }

    fn list_role_grants(&self, principal: &Principal) -> Result<Vec<RoleGrant>, CatalogError> {
        let stored = self.read_roles()?;
        Ok(stored
            .grants
            .into_iter()
            .filter(|grant| grant.grantee == *principal)
            .collect())
    }

    fn list_table_privileges(
        &self,
        schema: &str,
        table: &str,
        principal: Option<&Principal>,
    ) -> Result<Vec<PrivilegeGrant>, CatalogError> {
        let stored = self.require_stored_table(schema, table)?;
        Ok(stored
            .privileges
            .grants
            .into_iter()
            .filter(|grant| principal.map_or(true, |p| grant.grantee == *p))
            .collect())
    }

    fn grant_table_privileges(
        &self,
        schema: &str,
        table: &str,
        grants: &[PrivilegeGrant],
    ) -> Result<(), CatalogError> {
        let _lock = self.acquire_lock()?;
        let mut stored = self.require_stored_table(schema, table)?;
        for grant in grants {
            if !stored.privileges.grants.contains(grant) {
                stored.privileges.grants.push(grant.clone());
            }
        }
        self.write_json(&self.table_path(schema, table), &stored)
    }

    fn revoke_table_privileges(
        &self,
        schema: &str,
        table: &str,
        grants: &[PrivilegeGrant],
    ) -> Result<(), CatalogError> {
        let _lock = self.acquire_lock()?;
        let mut stored = self.require_stored_table(schema, table)?;
        stored.privileges.grants.retain(|grant| !grants.contains(grant));
        self.write_json(&self.table_path(schema, table), &stored)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn catalog() -> (FileCatalog, TempDir) {
        let temp = TempDir::new().unwrap();
        let catalog = FileCatalog::new(temp.path()).unwrap();
        catalog
            .create_database(Database::new("db", "admin"))
            .unwrap();
        (catalog, temp)
    }

    fn table(name: &str) -> Table {
        Table {
            schema_name: "db".to_string(),
            table_name: name.to_string(),
            owner: "alice".to_string(),
            table_type: TableType::Managed,
            data_columns: vec![Column::new("c", "bigint")],
            partition_columns: vec![Column::new("ds", "string")],
            location: Some(PathBuf::from(format!("/warehouse/db/{name}"))),
            parameters: HashMap::new(),
        }
    }

    fn partition(table_name: &str, value: &str) -> PartitionWithStatistics {
        let partition = Partition {
            schema_name: "db".to_string(),
            table_name: table_name.to_string(),
            values: vec![value.to_string()],
            location: PathBuf::from(format!("/warehouse/db/{table_name}/ds={value}")),
            parameters: HashMap::new(),
        };
        PartitionWithStatistics::new(partition, format!("ds={value}"), PartitionStatistics::empty())
    }

    #[test]
    fn test_create_and_get_table() {
        let (catalog, _temp) = catalog();
        catalog
            .create_table(table("t"), PrincipalPrivileges::owner("alice"))
            .unwrap();

        let fetched = catalog.get_table("db", "t").unwrap().unwrap();
        assert_eq!(fetched.table_name, "t");
        assert!(catalog.get_table("db", "missing").unwrap().is_none());
    }

    #[test]
    fn test_create_table_twice_fails() {
        let (catalog, _temp) = catalog();
        catalog
            .create_table(table("t"), PrincipalPrivileges::default())
            .unwrap();
        let result = catalog.create_table(table("t"), PrincipalPrivileges::default());
        assert!(matches!(result, Err(CatalogError::TableAlreadyExists(_))));
    }

    #[test]
    fn test_create_table_requires_database() {
        let (catalog, _temp) = catalog();
        let mut orphan = table("t");
        orphan.schema_name = "nope".to_string();
        let result = catalog.create_table(orphan, PrincipalPrivileges::default());
        assert!(matches!(result, Err(CatalogError::DatabaseNotFound(_))));
    }

    #[test]
    fn test_drop_table_removes_partitions() {
        let (catalog, _temp) = catalog();
        catalog
            .create_table(table("t"), PrincipalPrivileges::default())
            .unwrap();
        catalog
            .add_partitions("db", "t", &[partition("t", "a")])
            .unwrap();
        catalog.drop_table("db", "t").unwrap();

        assert!(catalog.get_table("db", "t").unwrap().is_none());
        assert_eq!(catalog.get_partition_names("db", "t").unwrap(), None);
    }

    #[test]
    fn test_partitions_roundtrip() {
        let (catalog, _temp) = catalog();
        catalog
            .create_table(table("t"), PrincipalPrivileges::default())
            .unwrap();
        catalog
            .add_partitions("db", "t", &[partition("t", "a"), partition("t", "b")])
            .unwrap();

        let names = catalog.get_partition_names("db", "t").unwrap().unwrap();
        assert_eq!(names, vec!["ds=a", "ds=b"]);

        let fetched = catalog
            .get_partition("db", "t", &["a".to_string()])
            .unwrap()
            .unwrap();
        assert_eq!(fetched.values, vec!["a"]);

        let by_names = catalog
            .get_partitions_by_names("db", "t", &["ds=a".to_string(), "ds=x".to_string()])
            .unwrap();
        assert!(by_names["ds=a"].is_some());
        assert!(by_names["ds=x"].is_none());
    }

    #[test]
    fn test_partition_names_by_parts() {
        let (catalog, _temp) = catalog();
        catalog
            .create_table(table("t"), PrincipalPrivileges::default())
            .unwrap();
        catalog
            .add_partitions("db", "t", &[partition("t", "a"), partition("t", "b")])
            .unwrap();

        let names = catalog
            .get_partition_names_by_parts("db", "t", &["a".to_string()])
            .unwrap()
            .unwrap();
        assert_eq!(names, vec!["ds=a"]);

        let all = catalog
            .get_partition_names_by_parts("db", "t", &["".to_string()])
            .unwrap()
            .unwrap();
        assert_eq!(all.len(), 2);

        assert_eq!(
            catalog.get_partition_names_by_parts("db", "missing", &[]).unwrap(),
            None
        );
    }

    #[test]
    fn test_add_duplicate_partition_fails() {
        let (catalog, _temp) = catalog();
        catalog
            .create_table(table("t"), PrincipalPrivileges::default())
            .unwrap();
        catalog
            .add_partitions("db", "t", &[partition("t", "a")])
            .unwrap();
        let result = catalog.add_partitions("db", "t", &[partition("t", "a")]);
        assert!(matches!(result, Err(CatalogError::PartitionAlreadyExists { .. })));
    }

    #[test]
    fn test_drop_partition() {
        let (catalog, _temp) = catalog();
        catalog
            .create_table(table("t"), PrincipalPrivileges::default())
            .unwrap();
        catalog
            .add_partitions("db", "t", &[partition("t", "a")])
            .unwrap();
        catalog
            .drop_partition("db", "t", &["a".to_string()], false)
            .unwrap();

        let result = catalog.drop_partition("db", "t", &["a".to_string()], false);
        assert!(matches!(result, Err(CatalogError::PartitionNotFound { .. })));
    }

    #[test]
    fn test_update_statistics() {
        let (catalog, _temp) = catalog();
        catalog
            .create_table(table("t"), PrincipalPrivileges::default())
            .unwrap();

        catalog
            .update_table_statistics("db", "t", &|mut stats| {
                stats.basic.row_count = Some(42);
                stats
            })
            .unwrap();
        let stats = catalog.get_table_statistics("db", "t").unwrap();
        assert_eq!(stats.basic.row_count, Some(42));
    }

    #[test]
    fn test_views_listed_separately() {
        let (catalog, _temp) = catalog();
        catalog
            .create_table(table("t"), PrincipalPrivileges::default())
            .unwrap();
        let mut view = table("v");
        view.table_type = TableType::View;
        view.location = None;
        catalog
            .create_table(view, PrincipalPrivileges::default())
            .unwrap();

        assert_eq!(catalog.get_all_tables("db").unwrap().unwrap(), vec!["t"]);
        assert_eq!(catalog.get_all_views("db").unwrap().unwrap(), vec!["v"]);
        assert_eq!(catalog.get_all_tables("absent").unwrap(), None);
    }

    #[test]
    fn test_rename_table_moves_partitions() {
        let (catalog, _temp) = catalog();
        catalog
            .create_table(table("t"), PrincipalPrivileges::default())
            .unwrap();
        catalog
            .add_partitions("db", "t", &[partition("t", "a")])
            .unwrap();

        catalog.rename_table("db", "t", "db", "renamed").unwrap();
        assert!(catalog.get_table("db", "t").unwrap().is_none());
        let renamed = catalog.get_table("db", "renamed").unwrap().unwrap();
        assert_eq!(renamed.table_name, "renamed");
        assert_eq!(
            catalog.get_partition_names("db", "renamed").unwrap().unwrap(),
            vec!["ds=a"]
        );
    }

    #[test]
    fn test_roles_and_grants() {
        let (catalog, _temp) = catalog();
        catalog.create_role("analyst", "admin").unwrap();
        catalog
            .grant_roles(
                &["analyst".to_string()],
                &[Principal::user("bob")],
                false,
                &Principal::user("admin"),
            )
            .unwrap();

        assert_eq!(catalog.list_roles().unwrap(), vec!["analyst"]);
        let grants = catalog.list_role_grants(&Principal::user("bob")).unwrap();
        assert_eq!(grants.len(), 1);
        assert_eq!(grants[0].role, "analyst");

        catalog
            .revoke_roles(&["analyst".to_string()], &[Principal::user("bob")], false)
            .unwrap();
        assert!(catalog.list_role_grants(&Principal::user("bob")).unwrap().is_empty());
    }

    #[test]
    fn test_column_operations() {
        let (catalog, _temp) = catalog();
        catalog
            .create_table(table("t"), PrincipalPrivileges::default())
            .unwrap();

        catalog.add_column("db", "t", Column::new("d", "varchar")).unwrap();
        catalog.rename_column("db", "t", "d", "e").unwrap();
        let fetched = catalog.get_table("db", "t").unwrap().unwrap();
        assert!(fetched.data_columns.iter().any(|c| c.name == "e"));

        catalog.drop_column("db", "t", "e").unwrap();
        let result = catalog.drop_column("db", "t", "e");
        assert!(matches!(result, Err(CatalogError::ColumnNotFound { .. })));
    }

    #[test]
    fn test_table_privileges() {
        let (catalog, _temp) = catalog();
        catalog
            .create_table(table("t"), PrincipalPrivileges::owner("alice"))
            .unwrap();

        let grant = PrivilegeGrant {
            privilege: Privilege::Select,
            grantee: Principal::user("bob"),
            grant_option: false,
        };
        catalog
            .grant_table_privileges("db", "t", std::slice::from_ref(&grant))
            .unwrap();

        let bob = Principal::user("bob");
        let grants = catalog.list_table_privileges("db", "t", Some(&bob)).unwrap();
        assert_eq!(grants, vec![grant.clone()]);

        catalog
            .revoke_table_privileges("db", "t", &[grant])
            .unwrap();
        assert!(catalog.list_table_privileges("db", "t", Some(&bob)).unwrap().is_empty());
    }
}
