//! loam - a semi-transactional metastore coordinator.
//!
//! A query engine mutating an external catalog plus a plain filesystem has
//! no transaction to lean on: the catalog applies every call immediately and
//! the filesystem only offers `rename`, `delete` and `exists`. loam buffers
//! all schema and data mutations of one query in memory, answers reads as if
//! they had been applied, and at commit time drives an ordered forward/undo
//! protocol that moves staged files into place before touching the catalog,
//! unwinds precisely on failure, and defers irreversible drops until
//! everything else has succeeded.
//!
//! The crate is organized leaves-first:
//! - [`fs`] - primitive filesystem contract and a local implementation
//! - [`stats`] - statistics model and merge/subtract arithmetic
//! - [`catalog`] - catalog contract, model types, and a file-backed
//!   implementation
//! - [`metastore`] - the coordinator: action log, write intents, rename
//!   pipeline, committer, and the `TransactionalMetastore` front

pub mod catalog;
pub mod fs;
pub mod metastore;
pub mod stats;

pub use catalog::{Catalog, CatalogError, FileCatalog, SchemaTableName};
pub use fs::{Fs, FsError, LocalFs, OpContext};
pub use metastore::{MetastoreConfig, MetastoreError, TransactionalMetastore, WriteMode};
pub use stats::PartitionStatistics;
