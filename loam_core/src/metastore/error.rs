//! Error taxonomy surfaced by the coordinator.

use std::path::PathBuf;
use thiserror::Error;

use crate::catalog::{CatalogError, SchemaTableName};
use crate::fs::FsError;

/// Errors raised by the transactional metastore buffer
#[derive(Error, Debug)]
pub enum MetastoreError {
    /// An external mutation by another writer invalidated an assumption made
    /// earlier in this transaction
    #[error("Transaction conflict: {0}")]
    TransactionConflict(String),

    #[error("Not supported: {0}")]
    NotSupported(String),

    /// Caller violated a precondition of the requested operation
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

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

    #[error("Target directory already exists: {0}")]
    PathAlreadyExists(PathBuf),

    #[error("Filesystem error: {0}")]
    Filesystem(String),

    #[error("Table {0} was dropped by another transaction during the query")]
    TableDroppedDuringQuery(SchemaTableName),

    #[error("Corrupted statistics: {0}")]
    CorruptedStatistics(String),

    /// Catalog-side failure; `causes` aggregates up to five underlying
    /// failures when several irreversible operations failed at once
    #[error("Metastore error: {message}")]
    Metastore {
        message: String,
        causes: Vec<String>,
    },
}

impl MetastoreError {
    pub fn metastore(message: impl Into<String>) -> Self {
        MetastoreError::Metastore {
            message: message.into(),
            causes: Vec::new(),
        }
    }

    /// Underlying failures attached to an aggregated metastore error
    pub fn suppressed(&self) -> &[String] {
        match self {
            MetastoreError::Metastore { causes, .. } => causes,
            _ => &[],
        }
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, MetastoreError::TransactionConflict(_))
    }
}

impl From<CatalogError> for MetastoreError {
    fn from(e: CatalogError) -> Self {
        match e {
            CatalogError::DatabaseNotFound(name) => MetastoreError::DatabaseNotFound(name),
            CatalogError::DatabaseAlreadyExists(name) => MetastoreError::DatabaseAlreadyExists(name),
            CatalogError::TableNotFound(table) => MetastoreError::TableNotFound(table),
            CatalogError::TableAlreadyExists(table) => MetastoreError::TableAlreadyExists(table),
            CatalogError::PartitionNotFound { table, values } => {
                MetastoreError::PartitionNotFound { table, values }
            }
            CatalogError::PartitionAlreadyExists { table, values } => {
                MetastoreError::PartitionAlreadyExists { table, values }
            }
            CatalogError::CorruptedStatistics(entity) => {
                MetastoreError::CorruptedStatistics(entity)
            }
            other => MetastoreError::metastore(other.to_string()),
        }
    }
}

impl From<FsError> for MetastoreError {
    fn from(e: FsError) -> Self {
        MetastoreError::Filesystem(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_catalog_error_mapping() {
        let e: MetastoreError = CatalogError::TableNotFound(SchemaTableName::new("db", "t")).into();
        assert!(matches!(e, MetastoreError::TableNotFound(_)));

        let e: MetastoreError = CatalogError::Other("boom".to_string()).into();
        assert!(matches!(e, MetastoreError::Metastore { .. }));
    }

    #[test]
    fn test_suppressed_causes() {
        let e = MetastoreError::Metastore {
            message: "failed".to_string(),
            causes: vec!["cause1".to_string(), "cause2".to_string()],
        };
        assert_eq!(e.suppressed().len(), 2);
        assert!(MetastoreError::metastore("plain").suppressed().is_empty());
    }
}
