use std::path::PathBuf;
use thiserror::Error;

use super::types::SchemaTableName;

#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Database not found: {0}")]
    DatabaseNotFound(String),

    #[error("Database already exists: {0}")]
    DatabaseAlreadyExists(String),

    #[error("Table not found: {0}")]
    TableNotFound(SchemaTableName),

    #[error("Table already exists: {0}")]
    TableAlreadyExists(SchemaTableName),

    #[error("Partition {values:?} of table {table} not found")]
    PartitionNotFound {
        table: SchemaTableName,
        values: Vec<String>,
    },

    #[error("Partition {values:?} of table {table} already exists")]
    PartitionAlreadyExists {
        table: SchemaTableName,
        values: Vec<String>,
    },

    #[error("Column {column} of table {table} not found")]
    ColumnNotFound {
        table: SchemaTableName,
        column: String,
    },

    #[error("Role not found: {0}")]
    RoleNotFound(String),

    #[error("Corrupted statistics for {0}")]
    CorruptedStatistics(String),

    #[error("Failed to acquire catalog lock at {0}")]
    LockError(PathBuf),

    #[error("Catalog error: {0}")]
    Other(String),
}

impl CatalogError {
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            CatalogError::DatabaseNotFound(_)
                | CatalogError::TableNotFound(_)
                | CatalogError::PartitionNotFound { .. }
                | CatalogError::ColumnNotFound { .. }
                | CatalogError::RoleNotFound(_)
        )
    }
}
