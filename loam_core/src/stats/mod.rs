//! Statistics model and arithmetic.
//!
//! The coordinator buffers statistics alongside every staged write and needs
//! three combinators at commit time:
//!
//! - `merge` - combine the current statistics with an insert delta
//! - `reduce` - field-wise ADD / SUBTRACT of basic statistics (SUBTRACT is
//!   the undo of a merged delta)
//! - `overlay` - explicit set-statistics: new fields win, missing fields
//!   keep the old value, column statistics are replaced

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Field-wise reduction operator for basic statistics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReduceOperator {
    Add,
    Subtract,
}

/// File-level statistics of a table or partition.
///
/// Each field is optional; an absent field means the value is unknown, and
/// combining an unknown with anything yields unknown.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BasicStatistics {
    pub file_count: Option<i64>,
    pub row_count: Option<i64>,
    pub total_size: Option<i64>,
    pub raw_data_size: Option<i64>,
}

impl BasicStatistics {
    pub fn new(file_count: i64, row_count: i64, total_size: i64, raw_data_size: i64) -> Self {
        Self {
            file_count: Some(file_count),
            row_count: Some(row_count),
            total_size: Some(total_size),
            raw_data_size: Some(raw_data_size),
        }
    }

    /// Statistics with every field unknown
    pub fn unknown() -> Self {
        Self::default()
    }
}

/// Per-column statistics.
///
/// Range bounds are kept as integers; non-integer column types only carry
/// the counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnStatistics {
    pub null_count: Option<i64>,
    pub distinct_count: Option<i64>,
    pub min: Option<i64>,
    pub max: Option<i64>,
    pub total_size: Option<i64>,
}

/// Statistics of a table or a single partition
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PartitionStatistics {
    pub basic: BasicStatistics,
    pub columns: HashMap<String, ColumnStatistics>,
}

impl PartitionStatistics {
    pub fn new(basic: BasicStatistics, columns: HashMap<String, ColumnStatistics>) -> Self {
        Self { basic, columns }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    /// Statistics carrying only basic file-level counters
    pub fn basic_only(basic: BasicStatistics) -> Self {
        Self {
            basic,
            columns: HashMap::new(),
        }
    }
}

fn combine(a: Option<i64>, b: Option<i64>, operator: ReduceOperator) -> Option<i64> {
    match (a, b) {
        (Some(a), Some(b)) => Some(match operator {
            ReduceOperator::Add => a + b,
            ReduceOperator::Subtract => a - b,
        }),
        _ => None,
    }
}

/// Field-wise reduction of basic statistics
pub fn reduce(
    first: &BasicStatistics,
    second: &BasicStatistics,
    operator: ReduceOperator,
) -> BasicStatistics {
    BasicStatistics {
        file_count: combine(first.file_count, second.file_count, operator),
        row_count: combine(first.row_count, second.row_count, operator),
        total_size: combine(first.total_size, second.total_size, operator),
        raw_data_size: combine(first.raw_data_size, second.raw_data_size, operator),
    }
}

fn merge_columns(
    current: &ColumnStatistics,
    delta: &ColumnStatistics,
) -> ColumnStatistics {
    ColumnStatistics {
        null_count: combine(current.null_count, delta.null_count, ReduceOperator::Add),
        // Distinct values of the union are unknown in general; the larger
        // side is the best lower bound we can report.
        distinct_count: match (current.distinct_count, delta.distinct_count) {
            (Some(a), Some(b)) => Some(a.max(b)),
            _ => None,
        },
        min: match (current.min, delta.min) {
            (Some(a), Some(b)) => Some(a.min(b)),
            _ => None,
        },
        max: match (current.max, delta.max) {
            (Some(a), Some(b)) => Some(a.max(b)),
            _ => None,
        },
        total_size: combine(current.total_size, delta.total_size, ReduceOperator::Add),
    }
}

/// Combine current statistics with an insert delta.
///
/// Basic counters add; column statistics combine per column, and a column
/// present on only one side stays unknown (dropped), since half-merged
/// column statistics are worse than none.
pub fn merge(current: &PartitionStatistics, delta: &PartitionStatistics) -> PartitionStatistics {
    let mut columns = HashMap::new();
    for (name, current_stats) in &current.columns {
        if let Some(delta_stats) = delta.columns.get(name) {
            columns.insert(name.clone(), merge_columns(current_stats, delta_stats));
        }
    }
    PartitionStatistics {
        basic: reduce(&current.basic, &delta.basic, ReduceOperator::Add),
        columns,
    }
}

/// Explicit set-statistics: fields present in `update` win, absent fields
/// keep the current value, and column statistics are replaced wholesale.
pub fn overlay(current: &PartitionStatistics, update: &PartitionStatistics) -> PartitionStatistics {
    PartitionStatistics {
        basic: BasicStatistics {
            file_count: update.basic.file_count.or(current.basic.file_count),
            row_count: update.basic.row_count.or(current.basic.row_count),
            total_size: update.basic.total_size.or(current.basic.total_size),
            raw_data_size: update.basic.raw_data_size.or(current.basic.raw_data_size),
        },
        columns: update.columns.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn basic(files: i64, rows: i64) -> BasicStatistics {
        BasicStatistics {
            file_count: Some(files),
            row_count: Some(rows),
            total_size: None,
            raw_data_size: None,
        }
    }

    #[test]
    fn test_reduce_add_and_subtract() {
        let a = BasicStatistics::new(2, 100, 1000, 4000);
        let b = BasicStatistics::new(1, 50, 500, 2000);

        let sum = reduce(&a, &b, ReduceOperator::Add);
        assert_eq!(sum.file_count, Some(3));
        assert_eq!(sum.row_count, Some(150));

        let diff = reduce(&sum, &b, ReduceOperator::Subtract);
        assert_eq!(diff, a);
    }

    #[test]
    fn test_reduce_unknown_is_sticky() {
        let a = basic(2, 100);
        let b = BasicStatistics::new(1, 50, 500, 2000);

        let sum = reduce(&a, &b, ReduceOperator::Add);
        assert_eq!(sum.file_count, Some(3));
        assert_eq!(sum.total_size, None);
        assert_eq!(sum.raw_data_size, None);
    }

    #[test]
    fn test_merge_adds_basic() {
        let current = PartitionStatistics::basic_only(basic(2, 100));
        let delta = PartitionStatistics::basic_only(basic(1, 10));

        let merged = merge(&current, &delta);
        assert_eq!(merged.basic.file_count, Some(3));
        assert_eq!(merged.basic.row_count, Some(110));
    }

    #[test]
    fn test_merge_drops_one_sided_columns() {
        let mut current = PartitionStatistics::basic_only(basic(1, 1));
        current.columns.insert(
            "a".to_string(),
            ColumnStatistics {
                null_count: Some(5),
                min: Some(0),
                max: Some(10),
                ..Default::default()
            },
        );
        let mut delta = PartitionStatistics::basic_only(basic(1, 1));
        delta.columns.insert(
            "a".to_string(),
            ColumnStatistics {
                null_count: Some(2),
                min: Some(-3),
                max: Some(7),
                ..Default::default()
            },
        );
        delta
            .columns
            .insert("only_in_delta".to_string(), ColumnStatistics::default());

        let merged = merge(&current, &delta);
        let a = &merged.columns["a"];
        assert_eq!(a.null_count, Some(7));
        assert_eq!(a.min, Some(-3));
        assert_eq!(a.max, Some(10));
        assert!(!merged.columns.contains_key("only_in_delta"));
    }

    #[test]
    fn test_overlay_new_fields_win() {
        let current = PartitionStatistics::basic_only(BasicStatistics::new(2, 100, 1000, 4000));
        let update = PartitionStatistics::basic_only(BasicStatistics {
            row_count: Some(42),
            ..Default::default()
        });

        let overlaid = overlay(&current, &update);
        assert_eq!(overlaid.basic.row_count, Some(42));
        assert_eq!(overlaid.basic.file_count, Some(2));
        assert!(overlaid.columns.is_empty());
    }

    #[test]
    fn test_empty_statistics() {
        let stats = PartitionStatistics::empty();
        assert_eq!(stats.basic, BasicStatistics::unknown());
        assert!(stats.columns.is_empty());
    }
}
