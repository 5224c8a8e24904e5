//! Buffered-action and write-intent types.

use std::path::PathBuf;

use crate::catalog::{Partition, PrincipalPrivileges, SchemaTableName, Table};
use crate::fs::OpContext;
use crate::stats::PartitionStatistics;

use super::error::MetastoreError;

/// How a write declares it will lay files down
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    /// Files are written to a staging directory and moved to the target at
    /// commit
    StageAndMove,
    /// Files are written directly into a target directory created by this
    /// query
    DirectNew,
    /// Files are written directly into a directory that already exists and
    /// may hold other writers' files
    DirectExisting,
}

/// A staging-area registration made before any data is written.
///
/// The mode determines how rollback cleans up after the query.
#[derive(Debug, Clone)]
pub struct WriteIntent {
    pub mode: WriteMode,
    pub ctx: OpContext,
    pub query_id: String,
    pub root_path: PathBuf,
    pub table: SchemaTableName,
}

impl WriteIntent {
    pub fn new(
        mode: WriteMode,
        ctx: OpContext,
        root_path: impl Into<PathBuf>,
        table: SchemaTableName,
    ) -> Self {
        let query_id = ctx.query_id.clone();
        Self {
            mode,
            ctx,
            query_id,
            root_path: root_path.into(),
            table,
        }
    }
}

/// Buffer lifecycle state. Transitions are monotonic; `Finished` is
/// absorbing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxState {
    Empty,
    SharedBuffered,
    ExclusiveBuffered,
    Finished,
}

impl TxState {
    /// Reads are served only before an exclusive operation is buffered and
    /// before the transaction finishes
    pub fn is_readable(self) -> bool {
        matches!(self, TxState::Empty | TxState::SharedBuffered)
    }
}

/// Kind of a pending action
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionKind {
    Add,
    Alter,
    InsertExisting,
    Drop,
}

/// A pending mutation recorded against a table or partition key.
///
/// `Drop` carries only the identity it was requested under; every other
/// variant carries the staged entity and its extras.
#[derive(Debug, Clone)]
pub enum Action<T> {
    Add(T),
    Alter(T),
    InsertExisting(T),
    Drop(OpContext),
}

/// Access to the context embedded in action payloads
pub trait ActionData {
    fn ctx(&self) -> &OpContext;
}

impl<T: ActionData> Action<T> {
    pub fn kind(&self) -> ActionKind {
        match self {
            Action::Add(_) => ActionKind::Add,
            Action::Alter(_) => ActionKind::Alter,
            Action::InsertExisting(_) => ActionKind::InsertExisting,
            Action::Drop(_) => ActionKind::Drop,
        }
    }

    pub fn ctx(&self) -> &OpContext {
        match self {
            Action::Add(data) | Action::Alter(data) | Action::InsertExisting(data) => data.ctx(),
            Action::Drop(ctx) => ctx,
        }
    }

    /// Payload of the action; `None` for drops
    pub fn data(&self) -> Option<&T> {
        match self {
            Action::Add(data) | Action::Alter(data) | Action::InsertExisting(data) => Some(data),
            Action::Drop(_) => None,
        }
    }
}

/// A staged table plus everything commit needs to move it into place
#[derive(Debug, Clone)]
pub struct TableAndMore {
    pub table: Table,
    pub ctx: OpContext,
    pub principal_privileges: Option<PrincipalPrivileges>,
    /// Where the staged data currently lives; required when `file_names` is
    /// present
    pub current_location: Option<PathBuf>,
    pub file_names: Option<Vec<String>>,
    pub ignore_existing: bool,
    /// Statistics of the table as it will exist after commit
    pub statistics: PartitionStatistics,
    /// Delta contributed by this transaction
    pub statistics_update: PartitionStatistics,
}

impl TableAndMore {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        table: Table,
        ctx: OpContext,
        principal_privileges: Option<PrincipalPrivileges>,
        current_location: Option<PathBuf>,
        file_names: Option<Vec<String>>,
        ignore_existing: bool,
        statistics: PartitionStatistics,
        statistics_update: PartitionStatistics,
    ) -> Result<Self, MetastoreError> {
        if file_names.is_some() && current_location.is_none() {
            return Err(MetastoreError::InvalidRequest(
                "file names require a current location".to_string(),
            ));
        }
        Ok(Self {
            table,
            ctx,
            principal_privileges,
            current_location,
            file_names,
            ignore_existing,
            statistics,
            statistics_update,
        })
    }

    pub fn schema_table_name(&self) -> SchemaTableName {
        self.table.schema_table_name()
    }
}

impl ActionData for TableAndMore {
    fn ctx(&self) -> &OpContext {
        &self.ctx
    }
}

/// A staged partition plus everything commit needs to move it into place
#[derive(Debug, Clone)]
pub struct PartitionAndMore {
    pub partition: Partition,
    pub ctx: OpContext,
    /// Where the staged data currently lives
    pub current_location: PathBuf,
    pub file_names: Option<Vec<String>>,
    /// Statistics of the partition as it will exist after commit
    pub statistics: PartitionStatistics,
    /// Delta contributed by this transaction
    pub statistics_update: PartitionStatistics,
}

impl PartitionAndMore {
    pub fn new(
        partition: Partition,
        ctx: OpContext,
        current_location: impl Into<PathBuf>,
        file_names: Option<Vec<String>>,
        statistics: PartitionStatistics,
        statistics_update: PartitionStatistics,
    ) -> Self {
        Self {
            partition,
            ctx,
            current_location: current_location.into(),
            file_names,
            statistics,
            statistics_update,
        }
    }

    pub fn schema_table_name(&self) -> SchemaTableName {
        self.partition.schema_table_name()
    }
}

impl ActionData for PartitionAndMore {
    fn ctx(&self) -> &OpContext {
        &self.ctx
    }
}

/// Where reads of a table's partitions start from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableSource {
    /// The table pre-dates this transaction; the catalog's partition list is
    /// the base
    PreExisting,
    /// The table was created (or replaced) by this transaction; reads start
    /// from an empty partition list
    CreatedInThisTransaction,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{Column, TableType};
    use std::collections::HashMap;

    fn test_table() -> Table {
        Table {
            schema_name: "db".to_string(),
            table_name: "t".to_string(),
            owner: "alice".to_string(),
            table_type: TableType::Managed,
            data_columns: vec![Column::new("c", "bigint")],
            partition_columns: vec![],
            location: Some(PathBuf::from("/warehouse/db/t")),
            parameters: HashMap::new(),
        }
    }

    #[test]
    fn test_file_names_require_current_location() {
        let result = TableAndMore::new(
            test_table(),
            OpContext::new("alice", "q1"),
            None,
            None,
            Some(vec!["f1".to_string()]),
            false,
            PartitionStatistics::empty(),
            PartitionStatistics::empty(),
        );
        assert!(matches!(result, Err(MetastoreError::InvalidRequest(_))));
    }

    #[test]
    fn test_action_kind_and_ctx() {
        let data = TableAndMore::new(
            test_table(),
            OpContext::new("alice", "q1"),
            None,
            None,
            None,
            false,
            PartitionStatistics::empty(),
            PartitionStatistics::empty(),
        )
        .unwrap();

        let action = Action::Add(data);
        assert_eq!(action.kind(), ActionKind::Add);
        assert_eq!(action.ctx().user, "alice");
        assert!(action.data().is_some());

        let drop: Action<TableAndMore> = Action::Drop(OpContext::new("bob", "q2"));
        assert_eq!(drop.kind(), ActionKind::Drop);
        assert_eq!(drop.ctx().user, "bob");
        assert!(drop.data().is_none());
    }

    #[test]
    fn test_write_intent_captures_query_id() {
        let intent = WriteIntent::new(
            WriteMode::StageAndMove,
            OpContext::new("alice", "q7"),
            "/staging/q7",
            SchemaTableName::new("db", "t"),
        );
        assert_eq!(intent.query_id, "q7");
        assert_eq!(intent.mode, WriteMode::StageAndMove);
    }

    #[test]
    fn test_state_readability() {
        assert!(TxState::Empty.is_readable());
        assert!(TxState::SharedBuffered.is_readable());
        assert!(!TxState::ExclusiveBuffered.is_readable());
        assert!(!TxState::Finished.is_readable());
    }
}
