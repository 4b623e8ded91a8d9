//! Physical execution of grouping and aggregation
//!
//! Rows flow from a [`RowSource`] through the [`Aggregator`] into a
//! [`RowSink`]. Inside, a [`GroupKeyCodec`] routes each row to a bucket in
//! the [`BucketStore`], and each bucket holds one [`Accumulator`] per
//! aggregation.

pub mod accumulator;
mod aggregator;
mod arrow_adapter;
mod bucket;
mod eviction;
mod group_key;
mod spec;
mod transport;

pub use accumulator::{Accumulator, AccumulatorFactory};
pub use aggregator::*;
pub use arrow_adapter::*;
pub use bucket::{Bucket, BucketMut, BucketStore};
pub use eviction::OrderedPrefixTracker;
pub use group_key::{GroupKey, GroupKeyCodec};
pub use spec::*;
pub use transport::*;
