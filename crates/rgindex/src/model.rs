//! Per-file statistics index: one [`RowGroupStats`] per row group, one
//! [`ColumnStats`] per leaf column.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::IndexError;
use crate::value::Value;

/// Footer statistics for one column chunk
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnStats {
    /// Dotted schema path of the leaf column (e.g. `Year`, `payload.id`)
    pub column_name: String,

    /// Lower bound of non-null values, if known
    pub min: Option<Value>,

    /// Upper bound of non-null values, if known
    pub max: Option<Value>,

    pub null_count: Option<u64>,

    pub distinct_count: Option<u64>,
}

impl ColumnStats {
    /// Column with no statistics at all
    pub fn unknown(column_name: impl Into<String>) -> Self {
        Self {
            column_name: column_name.into(),
            min: None,
            max: None,
            null_count: None,
            distinct_count: None,
        }
    }

    /// Column with both bounds known
    pub fn with_range(column_name: impl Into<String>, min: Value, max: Value) -> Self {
        Self {
            min: Some(min),
            max: Some(max),
            ..Self::unknown(column_name)
        }
    }

    pub fn with_null_count(mut self, null_count: u64) -> Self {
        self.null_count = Some(null_count);
        self
    }

    /// True when at least one bound can be used for pruning
    pub fn has_bounds(&self) -> bool {
        self.min.is_some() || self.max.is_some()
    }
}

/// Statistics for one row group
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RowGroupStats {
    /// Zero-based ordinal within the file
    pub row_group_id: u32,

    pub row_count: u64,

    /// Column statistics keyed by column name
    pub columns: BTreeMap<String, ColumnStats>,
}

impl RowGroupStats {
    pub fn new(row_group_id: u32, row_count: u64) -> Self {
        Self {
            row_group_id,
            row_count,
            columns: BTreeMap::new(),
        }
    }

    pub fn with_column(mut self, stats: ColumnStats) -> Self {
        self.insert(stats);
        self
    }

    pub fn insert(&mut self, stats: ColumnStats) {
        self.columns.insert(stats.column_name.clone(), stats);
    }

    pub fn column(&self, name: &str) -> Option<&ColumnStats> {
        self.columns.get(name)
    }
}

/// Ordered row group statistics for one file version
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileIndex {
    /// Stable identity of the source file (its object store path)
    pub file_id: String,

    pub row_group_count: u32,

    pub groups: Vec<RowGroupStats>,
}

impl FileIndex {
    /// Builds an index, renumbering groups by position so ids stay ordinal
    pub fn new(file_id: impl Into<String>, groups: Vec<RowGroupStats>) -> Self {
        let groups: Vec<RowGroupStats> = groups
            .into_iter()
            .enumerate()
            .map(|(i, mut group)| {
                group.row_group_id = i as u32;
                group
            })
            .collect();

        Self {
            file_id: file_id.into(),
            row_group_count: groups.len() as u32,
            groups,
        }
    }

    /// Checks `groups.len() == row_group_count`, `groups[i].row_group_id == i`,
    /// and that float bounds are finite
    pub fn validate(&self) -> Result<(), IndexError> {
        if self.groups.len() != self.row_group_count as usize {
            return Err(IndexError::CountMismatch {
                declared: self.row_group_count,
                actual: self.groups.len(),
            });
        }

        for (position, group) in self.groups.iter().enumerate() {
            if group.row_group_id as usize != position {
                return Err(IndexError::OutOfOrder {
                    position,
                    found: group.row_group_id,
                });
            }

            for stats in group.columns.values() {
                let non_finite = [&stats.min, &stats.max]
                    .into_iter()
                    .flatten()
                    .any(|v| matches!(v, Value::Float(f) if !f.is_finite()));
                if non_finite {
                    return Err(IndexError::NonFiniteBound {
                        row_group_id: group.row_group_id,
                        column: stats.column_name.clone(),
                    });
                }
            }
        }

        Ok(())
    }

    pub fn total_rows(&self) -> u64 {
        self.groups.iter().map(|g| g.row_count).sum()
    }

    pub fn group(&self, row_group_id: u32) -> Option<&RowGroupStats> {
        self.groups.get(row_group_id as usize)
    }
}

/// Outcome of evaluating a predicate against one row group's statistics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PruneDecision {
    /// Provably no row in the group can match
    Skip,
    /// The group must be scanned
    Keep,
}
