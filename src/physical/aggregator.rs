//! Grouping aggregator
//!
//! Consumes rows from a [`RowSource`], folds them into one bucket per group
//! and emits one row per group to a [`RowSink`]. When a prefix of the
//! grouping columns is known to arrive sorted, groups are emitted as soon as
//! the input moves past their prefix instead of at end of input.

use crate::error::{QueryError, Result};
use crate::execution::{create_memory_pool, AggregatorConfig, CancelSignal, SharedMemoryPool};
use crate::physical::accumulator::AccumulatorFactory;
use crate::physical::bucket::{Bucket, BucketStore};
use crate::physical::eviction::OrderedPrefixTracker;
use crate::physical::group_key::GroupKeyCodec;
use crate::physical::spec::AggregatorSpec;
use crate::physical::transport::{RowSink, RowSource, Trailer};
use crate::types::{ColumnType, Datum, Row, RowSchema};
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Lifecycle of an aggregator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    /// Built and validated, no row read yet
    Init,
    Running,
    Draining,
    Done,
}

/// How a run that did not fail ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    Completed,
    Cancelled,
}

/// Counters collected during a run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AggregatorStats {
    pub rows_read: u64,
    pub groups_created: u64,
    pub rows_emitted: u64,
    /// Most buckets live at any one time
    pub peak_live_buckets: usize,
    /// Buckets emitted before end of input by ordered-prefix eviction
    pub evictions: u64,
    pub elapsed: Duration,
}

/// Per-aggregation routing resolved at build time
#[derive(Debug)]
struct AggregationPlan {
    inputs: Vec<usize>,
    filter: Option<usize>,
}

impl AggregationPlan {
    /// Only rows whose filter value is TRUE contribute; NULL and FALSE do not.
    fn admits(&self, row: &[Datum]) -> bool {
        match self.filter {
            Some(col) => matches!(row[col], Datum::Bool(true)),
            None => true,
        }
    }
}

enum Flow {
    Continue,
    Cancelled,
}

/// Grouping and aggregation processor
pub struct Aggregator {
    spec: AggregatorSpec,
    input_schema: RowSchema,
    output_schema: RowSchema,
    input_types: Vec<ColumnType>,
    config: AggregatorConfig,
    codec: GroupKeyCodec,
    factories: Arc<[AccumulatorFactory]>,
    plans: Vec<AggregationPlan>,
    pool: SharedMemoryPool,
    state: RunState,
    stats: AggregatorStats,
}

impl fmt::Debug for Aggregator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Aggregator")
            .field("spec", &self.spec)
            .field("state", &self.state)
            .field("stats", &self.stats)
            .finish()
    }
}

impl Aggregator {
    /// Validate `spec` against the schemas and resolve every accumulator.
    /// `output_schema` must match the types the aggregations produce.
    pub fn try_new(
        spec: AggregatorSpec,
        input_schema: RowSchema,
        output_schema: RowSchema,
        config: AggregatorConfig,
    ) -> Result<Self> {
        let expected = spec.output_schema(&input_schema)?;
        if expected.column_types() != output_schema.column_types() {
            return Err(QueryError::TypeMismatch(format!(
                "output schema [{}] does not match aggregation result types [{}]",
                join_types(&output_schema.column_types()),
                join_types(&expected.column_types())
            )));
        }

        let mut factories = Vec::with_capacity(spec.aggregations.len());
        let mut plans = Vec::with_capacity(spec.aggregations.len());
        for agg in &spec.aggregations {
            let types: Vec<ColumnType> = agg
                .input_columns
                .iter()
                .filter_map(|&c| input_schema.column_type(c))
                .collect();
            factories.push(AccumulatorFactory::try_new(agg.func, &types, agg.distinct)?);
            plans.push(AggregationPlan {
                inputs: agg.input_columns.clone(),
                filter: agg.filter_column,
            });
        }

        let codec = GroupKeyCodec::new(&spec.group_columns, &spec.ordered_group_columns);
        let aggs: Vec<String> = spec.aggregations.iter().map(|a| a.to_string()).collect();
        debug!(
            group_columns = ?spec.group_columns,
            ordered_columns = ?spec.ordered_group_columns,
            aggregations = %aggs.join(", "),
            "built aggregator"
        );

        Ok(Self {
            input_types: input_schema.column_types(),
            pool: create_memory_pool(config.memory_limit),
            spec,
            input_schema,
            output_schema,
            config,
            codec,
            factories: factories.into(),
            plans,
            state: RunState::Init,
            stats: AggregatorStats::default(),
        })
    }

    /// Account bucket memory against a pool shared with other operators
    /// instead of a private one sized by the config.
    pub fn with_memory_pool(mut self, pool: SharedMemoryPool) -> Self {
        self.pool = pool;
        self
    }

    pub fn spec(&self) -> &AggregatorSpec {
        &self.spec
    }

    pub fn input_schema(&self) -> &RowSchema {
        &self.input_schema
    }

    pub fn output_schema(&self) -> &RowSchema {
        &self.output_schema
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    pub fn stats(&self) -> &AggregatorStats {
        &self.stats
    }

    /// Drive `source` to exhaustion, emitting one row per group into `sink`.
    ///
    /// The sink is closed with exactly one trailer unless pushing to it
    /// failed. Cancellation is observed whenever the run waits on the source
    /// or the sink; a cancelled run emits nothing further and reports
    /// [`RunOutcome::Cancelled`].
    pub async fn run(
        &mut self,
        source: &mut dyn RowSource,
        sink: &mut dyn RowSink,
        mut cancel: CancelSignal,
    ) -> Result<RunOutcome> {
        if self.state != RunState::Init {
            return Err(QueryError::Internal(format!(
                "aggregator already ran (state {:?})",
                self.state
            )));
        }
        let start = Instant::now();
        self.state = RunState::Running;

        let result = match self.check_source(source) {
            Ok(()) => self.run_inner(source, sink, &mut cancel).await,
            Err(e) => Err(e),
        };
        self.state = RunState::Done;
        self.stats.elapsed = start.elapsed();

        match result {
            Ok(Flow::Continue) => {
                sink.close(Trailer::Completed).await;
                info!(
                    rows_read = self.stats.rows_read,
                    groups = self.stats.groups_created,
                    rows_emitted = self.stats.rows_emitted,
                    peak_live_buckets = self.stats.peak_live_buckets,
                    evictions = self.stats.evictions,
                    elapsed_ms = self.stats.elapsed.as_millis() as u64,
                    "aggregation complete"
                );
                Ok(RunOutcome::Completed)
            }
            Ok(Flow::Cancelled) => {
                warn!(rows_read = self.stats.rows_read, "aggregation cancelled");
                sink.close(Trailer::Cancelled).await;
                Ok(RunOutcome::Cancelled)
            }
            Err(e) => {
                warn!(error = %e, rows_read = self.stats.rows_read, "aggregation aborted");
                if !matches!(e, QueryError::Sink(_)) {
                    sink.close(Trailer::Failed(&e)).await;
                }
                Err(e)
            }
        }
    }

    fn check_source(&self, source: &dyn RowSource) -> Result<()> {
        let declared = source.schema().column_types();
        if declared != self.input_types {
            return Err(QueryError::TypeMismatch(format!(
                "row source produces [{}], aggregator expects [{}]",
                join_types(&declared),
                join_types(&self.input_types)
            )));
        }
        Ok(())
    }

    async fn run_inner(
        &mut self,
        source: &mut dyn RowSource,
        sink: &mut dyn RowSink,
        cancel: &mut CancelSignal,
    ) -> Result<Flow> {
        let mut store = BucketStore::new(
            Arc::clone(&self.factories),
            self.codec.prefix_len(),
            self.config.recycle_limit,
            Arc::clone(&self.pool),
        );
        let mut tracker = OrderedPrefixTracker::new(self.codec.prefix_len());
        let mut key = Vec::with_capacity(self.codec.key_columns().len());
        let mut args = Vec::new();

        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Ok(Flow::Cancelled),
                row = source.next_row() => row?,
            };
            let Some(row) = next else { break };
            self.stats.rows_read += 1;
            self.validate_row(&row)?;

            self.codec.encode_into(&row, &mut key);
            if let Some(done) = tracker.observe(&key) {
                let evicted = store.evict_prefix(&done)?;
                debug!(
                    prefix = %crate::types::format_row(&done),
                    buckets = evicted.len(),
                    "evicting groups"
                );
                self.stats.evictions += evicted.len() as u64;
                if let Flow::Cancelled = self.emit_all(&mut store, evicted, sink, cancel).await? {
                    return Ok(Flow::Cancelled);
                }
            }

            let mut bucket = store.get_or_create(&key)?;
            for (idx, plan) in self.plans.iter().enumerate() {
                if !plan.admits(&row) {
                    continue;
                }
                match plan.inputs.as_slice() {
                    [] => bucket.add(idx, &[])?,
                    [col] => bucket.add(idx, std::slice::from_ref(&row[*col]))?,
                    cols => {
                        args.clear();
                        args.extend(cols.iter().map(|&c| row[c].clone()));
                        bucket.add(idx, &args)?;
                    }
                }
            }
            bucket.account()?;
        }

        self.state = RunState::Draining;
        // An ungrouped aggregate over no rows still produces one row.
        if store.groups_created() == 0 && self.codec.is_global() {
            store.get_or_create(&[])?;
        }
        tracker.take();
        let remaining = store.drain_all();
        self.stats.groups_created = store.groups_created();
        self.stats.peak_live_buckets = store.peak_live();
        self.emit_all(&mut store, remaining, sink, cancel).await
    }

    /// Finalize and push each bucket, returning it to the store for reuse.
    async fn emit_all(
        &mut self,
        store: &mut BucketStore,
        buckets: Vec<Bucket>,
        sink: &mut dyn RowSink,
        cancel: &mut CancelSignal,
    ) -> Result<Flow> {
        for bucket in buckets {
            let row = bucket.finalize()?;
            store.recycle(bucket);
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Ok(Flow::Cancelled),
                pushed = sink.push(row) => pushed.map_err(into_sink_error)?,
            }
            self.stats.rows_emitted += 1;
        }
        self.stats.groups_created = store.groups_created();
        self.stats.peak_live_buckets = store.peak_live();
        Ok(Flow::Continue)
    }

    fn validate_row(&self, row: &Row) -> Result<()> {
        if row.len() != self.input_types.len() {
            return Err(QueryError::Decode(format!(
                "row {} has {} columns, expected {}",
                self.stats.rows_read,
                row.len(),
                self.input_types.len()
            )));
        }
        for (idx, (value, ty)) in row.iter().zip(&self.input_types).enumerate() {
            if !value.conforms_to(*ty) {
                return Err(QueryError::Decode(format!(
                    "row {} column {}: expected {}, found {}",
                    self.stats.rows_read, idx, ty, value
                )));
            }
        }
        Ok(())
    }
}

fn into_sink_error(e: QueryError) -> QueryError {
    match e {
        QueryError::Sink(_) => e,
        other => QueryError::Sink(other.to_string()),
    }
}

fn join_types(types: &[ColumnType]) -> String {
    types
        .iter()
        .map(|t| t.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::execution::cancellation;
    use crate::physical::spec::{AggregateFunction, AggregationSpec};
    use crate::physical::transport::{MemoryRowSource, RowBuffer, RunEnd};

    fn int_schema(n: usize) -> RowSchema {
        RowSchema::from_types(std::iter::repeat(ColumnType::Int).take(n))
    }

    fn build(spec: AggregatorSpec, input: RowSchema) -> Aggregator {
        let output = spec.output_schema(&input).unwrap();
        Aggregator::try_new(spec, input, output, AggregatorConfig::default()).unwrap()
    }

    #[test]
    fn test_output_schema_must_match() {
        let spec = AggregatorSpec::new(vec![AggregationSpec::new(AggregateFunction::Sum, [0])]);
        let err = Aggregator::try_new(
            spec,
            int_schema(1),
            int_schema(1),
            AggregatorConfig::default(),
        )
        .unwrap_err();
        assert!(matches!(err, QueryError::TypeMismatch(_)));
    }

    #[tokio::test]
    async fn test_state_transitions() {
        let spec = AggregatorSpec::new(vec![AggregationSpec::count_rows()]);
        let mut agg = build(spec, int_schema(1));
        assert_eq!(agg.state(), RunState::Init);

        let mut source = MemoryRowSource::new(int_schema(1), vec![vec![Datum::Int(1)]]);
        let mut sink = RowBuffer::new();
        let outcome = agg.run(&mut source, &mut sink, CancelSignal::never()).await.unwrap();
        assert_eq!(outcome, RunOutcome::Completed);
        assert_eq!(agg.state(), RunState::Done);
        assert_eq!(sink.rows(), &[vec![Datum::Int(1)]]);

        // A finished aggregator cannot be run again
        let mut source = MemoryRowSource::new(int_schema(1), vec![]);
        let mut sink = RowBuffer::new();
        assert!(agg.run(&mut source, &mut sink, CancelSignal::never()).await.is_err());
    }

    #[tokio::test]
    async fn test_source_schema_checked() {
        let spec = AggregatorSpec::new(vec![AggregationSpec::count_rows()]);
        let mut agg = build(spec, int_schema(1));
        let mut source = MemoryRowSource::new(RowSchema::from_types([ColumnType::String]), vec![]);
        let mut sink = RowBuffer::new();
        let err = agg.run(&mut source, &mut sink, CancelSignal::never()).await.unwrap_err();
        assert!(matches!(err, QueryError::TypeMismatch(_)));
        assert!(matches!(sink.end(), Some(RunEnd::Failed(_))));
    }

    #[tokio::test]
    async fn test_cancel_before_start_emits_nothing() {
        let spec = AggregatorSpec::new(vec![AggregationSpec::count_rows()]);
        let mut agg = build(spec, int_schema(1));
        let (handle, signal) = cancellation();
        handle.cancel();

        let mut source = MemoryRowSource::new(int_schema(1), vec![vec![Datum::Int(1)]]);
        let mut sink = RowBuffer::new();
        let outcome = agg.run(&mut source, &mut sink, signal).await.unwrap();
        assert_eq!(outcome, RunOutcome::Cancelled);
        assert!(sink.rows().is_empty());
        assert_eq!(sink.end(), Some(&RunEnd::Cancelled));
        assert_eq!(agg.stats().rows_read, 0);
    }

    #[tokio::test]
    async fn test_filter_gate_is_per_aggregation() {
        let schema = RowSchema::from_types([ColumnType::Int, ColumnType::Bool]);
        let spec = AggregatorSpec::new(vec![
            AggregationSpec::new(AggregateFunction::Count, [0]).filtered(1),
            AggregationSpec::new(AggregateFunction::Count, [0]),
        ]);
        let mut agg = build(spec, schema.clone());
        let rows = vec![
            vec![Datum::Int(1), Datum::Bool(true)],
            vec![Datum::Int(2), Datum::Bool(false)],
            vec![Datum::Int(3), Datum::Null],
        ];
        let mut source = MemoryRowSource::new(schema, rows);
        let mut sink = RowBuffer::new();
        agg.run(&mut source, &mut sink, CancelSignal::never()).await.unwrap();
        assert_eq!(sink.rows(), &[vec![Datum::Int(1), Datum::Int(3)]]);
    }

    #[tokio::test]
    async fn test_runtime_type_mismatch_is_decode_error() {
        let spec = AggregatorSpec::new(vec![AggregationSpec::new(AggregateFunction::Sum, [0])]);
        let mut agg = build(spec, int_schema(1));
        let mut source = MemoryRowSource::new(
            int_schema(1),
            vec![vec![Datum::Int(1)], vec![Datum::from("two")]],
        );
        let mut sink = RowBuffer::new();
        let err = agg.run(&mut source, &mut sink, CancelSignal::never()).await.unwrap_err();
        assert!(matches!(err, QueryError::Decode(_)));
        assert!(sink.rows().is_empty());
    }
}
