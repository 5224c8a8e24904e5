//! Catalog contract and a file-backed implementation.
//!
//! The coordinator treats the catalog as a remote, non-transactional service:
//! calls may fail, and concurrent writers may mutate entities between calls.
//! `Catalog` captures exactly the operations the coordinator consumes;
//! `FileCatalog` is a JSON-file-per-entity implementation for local use and
//! tests.

pub mod error;
pub mod file_catalog;
pub mod types;

use std::collections::HashMap;

pub use error::CatalogError;
pub use file_catalog::FileCatalog;
pub use types::{
    make_partition_name, partition_values_from_name, partition_values_match, query_id, Column,
    ColumnStatisticKind, Database, Partition, PartitionWithStatistics, Principal, PrincipalKind,
    PrincipalPrivileges, Privilege, PrivilegeGrant, RoleGrant, SchemaTableName, Table, TableType,
    QUERY_ID_PARAM,
};

use crate::stats::PartitionStatistics;

/// Transformation applied to existing statistics by the update operations
pub type StatisticsUpdate<'a> = &'a dyn Fn(PartitionStatistics) -> PartitionStatistics;

/// The catalog operations the coordinator consumes.
///
/// Reads of missing entities return `Ok(None)` where the caller routinely
/// races other writers (`get_*`), and typed errors where absence is a caller
/// mistake (mutations).
pub trait Catalog: Send + Sync {
    // === Databases ===

    fn get_database(&self, name: &str) -> Result<Option<Database>, CatalogError>;

    fn list_databases(&self) -> Result<Vec<String>, CatalogError>;

    fn create_database(&self, database: Database) -> Result<(), CatalogError>;

    fn drop_database(&self, name: &str) -> Result<(), CatalogError>;

    fn rename_database(&self, name: &str, new_name: &str) -> Result<(), CatalogError>;

    // === Tables ===

    fn get_table(&self, schema: &str, table: &str) -> Result<Option<Table>, CatalogError>;

    /// All table names of a schema; `None` if the schema does not exist
    fn get_all_tables(&self, schema: &str) -> Result<Option<Vec<String>>, CatalogError>;

    /// All view names of a schema; `None` if the schema does not exist
    fn get_all_views(&self, schema: &str) -> Result<Option<Vec<String>>, CatalogError>;

    fn create_table(
        &self,
        table: Table,
        privileges: PrincipalPrivileges,
    ) -> Result<(), CatalogError>;

    fn drop_table(&self, schema: &str, table: &str) -> Result<(), CatalogError>;

    /// Replace a table definition wholesale, keeping its partitions
    fn replace_table(
        &self,
        schema: &str,
        table: &str,
        new_table: Table,
        privileges: PrincipalPrivileges,
    ) -> Result<(), CatalogError>;

    fn rename_table(
        &self,
        schema: &str,
        table: &str,
        new_schema: &str,
        new_table: &str,
    ) -> Result<(), CatalogError>;

    fn add_column(&self, schema: &str, table: &str, column: Column) -> Result<(), CatalogError>;

    fn rename_column(
        &self,
        schema: &str,
        table: &str,
        old_name: &str,
        new_name: &str,
    ) -> Result<(), CatalogError>;

    fn drop_column(&self, schema: &str, table: &str, column: &str) -> Result<(), CatalogError>;

    // === Partitions ===

    fn get_partition(
        &self,
        schema: &str,
        table: &str,
        values: &[String],
    ) -> Result<Option<Partition>, CatalogError>;

    /// All partition names of a table; `None` if the table does not exist
    fn get_partition_names(
        &self,
        schema: &str,
        table: &str,
    ) -> Result<Option<Vec<String>>, CatalogError>;

    /// Partition names matching a positional value pattern (empty slot
    /// matches anything); `None` if the table does not exist
    fn get_partition_names_by_parts(
        &self,
        schema: &str,
        table: &str,
        parts: &[String],
    ) -> Result<Option<Vec<String>>, CatalogError>;

    /// Partitions looked up by canonical name; missing names map to `None`
    fn get_partitions_by_names(
        &self,
        schema: &str,
        table: &str,
        names: &[String],
    ) -> Result<HashMap<String, Option<Partition>>, CatalogError>;

    fn add_partitions(
        &self,
        schema: &str,
        table: &str,
        partitions: &[PartitionWithStatistics],
    ) -> Result<(), CatalogError>;

    fn drop_partition(
        &self,
        schema: &str,
        table: &str,
        values: &[String],
        delete_data: bool,
    ) -> Result<(), CatalogError>;

    fn alter_partition(
        &self,
        schema: &str,
        table: &str,
        partition: &PartitionWithStatistics,
    ) -> Result<(), CatalogError>;

    // === Statistics ===

    fn get_table_statistics(
        &self,
        schema: &str,
        table: &str,
    ) -> Result<PartitionStatistics, CatalogError>;

    fn get_partition_statistics(
        &self,
        schema: &str,
        table: &str,
        partition_names: &[String],
    ) -> Result<HashMap<String, PartitionStatistics>, CatalogError>;

    fn update_table_statistics(
        &self,
        schema: &str,
        table: &str,
        update: StatisticsUpdate<'_>,
    ) -> Result<(), CatalogError>;

    fn update_partition_statistics(
        &self,
        schema: &str,
        table: &str,
        partition_name: &str,
        update: StatisticsUpdate<'_>,
    ) -> Result<(), CatalogError>;

    fn get_supported_column_statistics(
        &self,
        type_name: &str,
    ) -> Result<Vec<ColumnStatisticKind>, CatalogError>;

    // === Roles and privileges ===

    fn list_roles(&self) -> Result<Vec<String>, CatalogError>;

    fn create_role(&self, role: &str, grantor: &str) -> Result<(), CatalogError>;

    fn drop_role(&self, role: &str) -> Result<(), CatalogError>;

    fn grant_roles(
        &self,
        roles: &[String],
        grantees: &[Principal],
        admin_option: bool,
        grantor: &Principal,
    ) -> Result<(), CatalogError>;

    fn revoke_roles(
        &self,
        roles: &[String],
        grantees: &[Principal],
        admin_option: bool,
    ) -> Result<(), CatalogError>;

    fn list_role_grants(&self, principal: &Principal) -> Result<Vec<RoleGrant>, CatalogError>;

    fn list_table_privileges(
        &self,
        schema: &str,
        table: &str,
        principal: Option<&Principal>,
    ) -> Result<Vec<PrivilegeGrant>, CatalogError>;

    fn grant_table_privileges(
        &self,
        schema: &str,
        table: &str,
        grants: &[PrivilegeGrant],
    ) -> Result<(), CatalogError>;

    fn revoke_table_privileges(
        &self,
        schema: &str,
        table: &str,
        grants: &[PrivilegeGrant],
    ) -> Result<(), CatalogError>;
}
