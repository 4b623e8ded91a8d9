//! Synthetic grouped integer workload for benchmarks and the CLI

use crate::error::{QueryError, Result};
use crate::types::{ColumnType, Datum, Row, RowSchema};

/// How much of the grouping is known sorted in a generated workload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ordering {
    /// Every grouping column is an ordered column
    Ordered,
    /// Only the first grouping column is ordered
    PartiallyOrdered,
    Unordered,
}

impl Ordering {
    /// Ordered subsequence of `group_columns` to declare for this mode
    pub fn ordered_columns(&self, group_columns: &[usize]) -> Vec<usize> {
        match self {
            Ordering::Ordered => group_columns.to_vec(),
            Ordering::PartiallyOrdered => group_columns.iter().take(1).copied().collect(),
            Ordering::Unordered => Vec::new(),
        }
    }
}

/// Generator of integer rows with `group_size^(k+1)` rows for `k` grouped
/// columns.
///
/// Grouped columns take values in `0..group_size`; the first grouped column
/// varies slowest, so the rows come out sorted by the grouped columns in
/// the order given. Every other column `j` of row `i` holds `i + j`.
#[derive(Debug, Clone)]
pub struct GroupedIntRows {
    group_size: usize,
    num_cols: usize,
    grouped_cols: Vec<usize>,
}

impl GroupedIntRows {
    pub fn new(group_size: usize, num_cols: usize, grouped_cols: Vec<usize>) -> Result<Self> {
        if group_size == 0 {
            return Err(QueryError::InvalidArgument("group size must be positive".into()));
        }
        if let Some(&c) = grouped_cols.iter().find(|&&c| c >= num_cols) {
            return Err(QueryError::InvalidArgument(format!(
                "grouped column {} out of range for {} columns",
                c, num_cols
            )));
        }
        Ok(Self {
            group_size,
            num_cols,
            grouped_cols,
        })
    }

    pub fn schema(&self) -> RowSchema {
        RowSchema::from_types(std::iter::repeat(ColumnType::Int).take(self.num_cols))
    }

    pub fn num_rows(&self) -> usize {
        self.group_size.pow(self.grouped_cols.len() as u32 + 1)
    }

    /// Number of distinct groups over the grouped columns
    pub fn num_groups(&self) -> usize {
        self.group_size.pow(self.grouped_cols.len() as u32)
    }

    fn grouped_value(&self, row: usize, rank: usize) -> i64 {
        let scale = self.group_size.pow(rank as u32);
        ((row % (scale * self.group_size)) / scale) as i64
    }

    pub fn row(&self, i: usize) -> Row {
        (0..self.num_cols)
            .map(|j| match self.grouped_cols.iter().position(|&c| c == j) {
                Some(pos) => Datum::Int(self.grouped_value(i, self.grouped_cols.len() - pos)),
                None => Datum::Int((i + j) as i64),
            })
            .collect()
    }

    pub fn rows(&self) -> Vec<Row> {
        (0..self.num_rows()).map(|i| self.row(i)).collect()
    }
}

/// `num_rows` x `num_cols` integer rows where column `j` of row `i` holds
/// `i + j`
pub fn int_rows(num_rows: usize, num_cols: usize) -> Vec<Row> {
    (0..num_rows)
        .map(|i| (0..num_cols).map(|j| Datum::Int((i + j) as i64)).collect())
        .collect()
}
