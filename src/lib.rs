//! Grouping and aggregation row processor
//!
//! Consumes a stream of typed rows, partitions them into groups by a key,
//! applies aggregate functions per group and emits one row per group. When
//! part of the grouping key is known to arrive sorted, completed groups are
//! emitted early so memory stays bounded by the groups sharing the current
//! sorted prefix.

pub mod error;
pub mod execution;
pub mod physical;
pub mod types;
pub mod workload;

// Re-export main types
pub use error::{QueryError, Result};
pub use execution::{cancellation, AggregatorConfig, CancelHandle, CancelSignal};
pub use physical::{
    AggregateFunction, AggregationSpec, Aggregator, AggregatorSpec, AggregatorStats, RowSink,
    RowSource, RunOutcome,
};
pub use types::{ColumnType, Datum, Row, RowSchema};
