//! Catalog model types.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;

use crate::stats::PartitionStatistics;

/// Table/partition parameter carrying the id of the query that wrote the
/// entity. Writers tag everything they create with it; the coordinator uses
/// it to recognize its own work after partial failures and to scope cleanup.
pub const QUERY_ID_PARAM: &str = "loam_query_id";

/// Read the query-id tag out of an entity's parameters
pub fn query_id(parameters: &HashMap<String, String>) -> Option<&str> {
    parameters.get(QUERY_ID_PARAM).map(|s| s.as_str())
}

/// Stable key of a table
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SchemaTableName {
    pub schema: String,
    pub table: String,
}

impl SchemaTableName {
    pub fn new(schema: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            schema: schema.into(),
            table: table.into(),
        }
    }
}

impl fmt::Display for SchemaTableName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.schema, self.table)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Database {
    pub name: String,
    pub location: Option<PathBuf>,
    pub owner: String,
    pub parameters: HashMap<String, String>,
}

impl Database {
    pub fn new(name: impl Into<String>, owner: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            location: None,
            owner: owner.into(),
            parameters: HashMap::new(),
        }
    }

    pub fn with_location(mut self, location: impl Into<PathBuf>) -> Self {
        self.location = Some(location.into());
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TableType {
    Managed,
    External,
    View,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    pub type_name: String,
    pub comment: Option<String>,
}

impl Column {
    pub fn new(name: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            type_name: type_name.into(),
            comment: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Table {
    pub schema_name: String,
    pub table_name: String,
    pub owner: String,
    pub table_type: TableType,
    pub data_columns: Vec<Column>,
    pub partition_columns: Vec<Column>,
    /// Storage location; absent for views
    pub location: Option<PathBuf>,
    pub parameters: HashMap<String, String>,
}

impl Table {
    pub fn schema_table_name(&self) -> SchemaTableName {
        SchemaTableName::new(self.schema_name.clone(), self.table_name.clone())
    }

    pub fn is_managed(&self) -> bool {
        self.table_type == TableType::Managed
    }

    pub fn is_view(&self) -> bool {
        self.table_type == TableType::View
    }

    pub fn is_partitioned(&self) -> bool {
        !self.partition_columns.is_empty()
    }

    pub fn query_id(&self) -> Option<&str> {
        query_id(&self.parameters)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Partition {
    pub schema_name: String,
    pub table_name: String,
    /// Partition column values, in partition-column order
    pub values: Vec<String>,
    pub location: PathBuf,
    pub parameters: HashMap<String, String>,
}

impl Partition {
    pub fn schema_table_name(&self) -> SchemaTableName {
        SchemaTableName::new(self.schema_name.clone(), self.table_name.clone())
    }

    pub fn query_id(&self) -> Option<&str> {
        query_id(&self.parameters)
    }
}

/// A partition together with its canonical name and statistics, as handed to
/// catalog mutation calls
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartitionWithStatistics {
    pub partition: Partition,
    pub name: String,
    pub statistics: PartitionStatistics,
}

impl PartitionWithStatistics {
    pub fn new(partition: Partition, name: impl Into<String>, statistics: PartitionStatistics) -> Self {
        Self {
            partition,
            name: name.into(),
            statistics,
        }
    }
}

/// Canonical partition name: `col=val` pairs joined with `/`
pub fn make_partition_name(partition_columns: &[Column], values: &[String]) -> String {
    partition_columns
        .iter()
        .zip(values.iter())
        .map(|(column, value)| format!("{}={}", column.name, value))
        .collect::<Vec<_>>()
        .join("/")
}

/// Positional partition filter: an empty pattern slot matches anything, a
/// non-empty slot matches by equality, and values beyond the pattern match.
pub fn partition_values_match(values: &[String], pattern: &[String]) -> bool {
    for (i, part) in pattern.iter().enumerate() {
        if part.is_empty() {
            continue;
        }
        if values.get(i) != Some(part) {
            return false;
        }
    }
    true
}

/// Partition values out of a canonical partition name
pub fn partition_values_from_name(name: &str) -> Vec<String> {
    name.split('/')
        .map(|part| match part.split_once('=') {
            Some((_, value)) => value.to_string(),
            None => part.to_string(),
        })
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PrincipalKind {
    User,
    Role,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Principal {
    pub kind: PrincipalKind,
    pub name: String,
}

impl Principal {
    pub fn user(name: impl Into<String>) -> Self {
        Self {
            kind: PrincipalKind::User,
            name: name.into(),
        }
    }

    pub fn role(name: impl Into<String>) -> Self {
        Self {
            kind: PrincipalKind::Role,
            name: name.into(),
        }
    }
}

impl fmt::Display for Principal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            PrincipalKind::User => write!(f, "user {}", self.name),
            PrincipalKind::Role => write!(f, "role {}", self.name),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Privilege {
    Select,
    Insert,
    Update,
    Delete,
    Ownership,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PrivilegeGrant {
    pub privilege: Privilege,
    pub grantee: Principal,
    pub grant_option: bool,
}

/// Privileges attached to a table at creation time
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PrincipalPrivileges {
    pub grants: Vec<PrivilegeGrant>,
}

impl PrincipalPrivileges {
    pub fn new(grants: Vec<PrivilegeGrant>) -> Self {
        Self { grants }
    }

    /// Full ownership for a single user
    pub fn owner(user: impl Into<String>) -> Self {
        Self {
            grants: vec![PrivilegeGrant {
                privilege: Privilege::Ownership,
                grantee: Principal::user(user),
                grant_option: true,
            }],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RoleGrant {
    pub role: String,
    pub grantee: Principal,
    pub admin_option: bool,
}

/// Column statistic kinds a catalog can persist for a given column type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ColumnStatisticKind {
    MinMax,
    NullCount,
    DistinctCount,
    TotalSize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_table_name_display() {
        let name = SchemaTableName::new("db", "t");
        assert_eq!(name.to_string(), "db.t");
    }

    #[test]
    fn test_make_partition_name() {
        let columns = vec![Column::new("ds", "string"), Column::new("hour", "int")];
        let values = vec!["2026-08-01".to_string(), "7".to_string()];
        assert_eq!(make_partition_name(&columns, &values), "ds=2026-08-01/hour=7");
    }

    #[test]
    fn test_partition_values_from_name() {
        assert_eq!(
            partition_values_from_name("ds=2026-08-01/hour=7"),
            vec!["2026-08-01".to_string(), "7".to_string()]
        );
    }

    #[test]
    fn test_partition_values_match() {
        let values = vec!["1".to_string(), "a".to_string()];
        assert!(partition_values_match(&values, &[]));
        assert!(partition_values_match(&values, &["".to_string()]));
        assert!(partition_values_match(&values, &["1".to_string()]));
        assert!(partition_values_match(&values, &["1".to_string(), "a".to_string()]));
        assert!(partition_values_match(&values, &["".to_string(), "a".to_string()]));
        assert!(!partition_values_match(&values, &["2".to_string()]));
        assert!(!partition_values_match(&values, &["1".to_string(), "b".to_string()]));
    }

    #[test]
    fn test_query_id_tag() {
        let mut parameters = HashMap::new();
        assert_eq!(query_id(&parameters), None);
        parameters.insert(QUERY_ID_PARAM.to_string(), "q42".to_string());
        assert_eq!(query_id(&parameters), Some("q42"));
    }

    #[test]
    fn test_table_predicates() {
        let table = Table {
            schema_name: "db".to_string(),
            table_name: "t".to_string(),
            owner: "alice".to_string(),
            table_type: TableType::Managed,
            data_columns: vec![Column::new("c", "bigint")],
            partition_columns: vec![],
            location: Some(PathBuf::from("/warehouse/db/t")),
            parameters: HashMap::new(),
        };
        assert!(table.is_managed());
        assert!(!table.is_partitioned());
        assert!(!table.is_view());
        assert_eq!(table.schema_table_name(), SchemaTableName::new("db", "t"));
    }
}
