//! Aggregation CLI

use clap::{Parser, Subcommand, ValueEnum};
use query_aggregate::physical::{
    AggregateFunction, AggregationSpec, Aggregator, AggregatorSpec, MemoryRowSource, RowBuffer,
};
use query_aggregate::types::{format_row, Row};
use query_aggregate::workload::{GroupedIntRows, Ordering};
use query_aggregate::{AggregatorConfig, CancelSignal, Result};
use std::time::Instant;

#[derive(Parser)]
#[command(name = "query-aggregate")]
#[command(about = "Grouping and aggregation over generated integer workloads")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum OrderingArg {
    Ordered,
    Partial,
    Unordered,
}

impl From<OrderingArg> for Ordering {
    fn from(arg: OrderingArg) -> Self {
        match arg {
            OrderingArg::Ordered => Ordering::Ordered,
            OrderingArg::Partial => Ordering::PartiallyOrdered,
            OrderingArg::Unordered => Ordering::Unordered,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Aggregate a generated grouped workload
    Run {
        /// Aggregate function (e.g. SUM, COUNT, STDDEV)
        #[arg(short, long, default_value = "SUM")]
        func: String,

        /// Rows per group, and distinct values per grouped column
        #[arg(short, long, default_value = "10")]
        group_size: usize,

        /// Number of grouped columns
        #[arg(short = 'k', long, default_value = "2")]
        grouped: usize,

        /// How much of the grouping key to declare sorted
        #[arg(short, long, value_enum, default_value = "ordered")]
        ordering: OrderingArg,

        /// Aggregate distinct values only
        #[arg(long)]
        distinct: bool,

        /// Memory budget for live groups, in bytes
        #[arg(long)]
        memory_limit: Option<usize>,

        /// Print the output rows
        #[arg(short, long)]
        print: bool,
    },

    /// Run one function under every ordering mode and compare results
    Compare {
        /// Aggregate function
        #[arg(short, long, default_value = "SUM")]
        func: String,

        /// Rows per group
        #[arg(short, long, default_value = "10")]
        group_size: usize,

        /// Number of grouped columns
        #[arg(short = 'k', long, default_value = "2")]
        grouped: usize,
    },

    /// List the supported aggregate functions
    Functions,
}

struct Workload {
    rows: GroupedIntRows,
    group_columns: Vec<usize>,
    value_column: usize,
}

impl Workload {
    fn new(group_size: usize, grouped: usize) -> Result<Self> {
        let group_columns: Vec<usize> = (0..grouped).collect();
        let rows = GroupedIntRows::new(group_size, grouped + 1, group_columns.clone())?;
        Ok(Self {
            rows,
            group_columns,
            value_column: grouped,
        })
    }
}

struct RunReport {
    rows: Vec<Row>,
    elapsed_ms: f64,
    peak_live_buckets: usize,
}

async fn aggregate(
    workload: &Workload,
    func: AggregateFunction,
    distinct: bool,
    ordering: Ordering,
    config: AggregatorConfig,
) -> Result<RunReport> {
    let mut agg_spec = AggregationSpec::new(func, [workload.value_column]);
    if distinct {
        agg_spec = agg_spec.distinct();
    }
    let spec = AggregatorSpec::new(vec![agg_spec])
        .with_group_columns(workload.group_columns.clone())
        .with_ordered_group_columns(ordering.ordered_columns(&workload.group_columns));
    let input = workload.rows.schema();
    let output = spec.output_schema(&input)?;

    let mut aggregator = Aggregator::try_new(spec, input.clone(), output, config)?;
    let mut source = MemoryRowSource::new(input, workload.rows.rows());
    let mut sink = RowBuffer::new();

    let start = Instant::now();
    aggregator.run(&mut source, &mut sink, CancelSignal::never()).await?;
    let elapsed_ms = start.elapsed().as_secs_f64() * 1000.0;

    Ok(RunReport {
        rows: sink.into_rows(),
        elapsed_ms,
        peak_live_buckets: aggregator.stats().peak_live_buckets,
    })
}

fn sorted_strings(rows: &[Row]) -> Vec<String> {
    let mut out: Vec<String> = rows.iter().map(|r| format_row(r)).collect();
    out.sort();
    out
}

async fn execute(command: Commands) -> Result<()> {
    match command {
        Commands::Run {
            func,
            group_size,
            grouped,
            ordering,
            distinct,
            memory_limit,
            print,
        } => {
            let func: AggregateFunction = func.parse()?;
            let workload = Workload::new(group_size, grouped)?;
            let mut config = AggregatorConfig::new();
            if let Some(limit) = memory_limit {
                config = config.with_memory_limit(limit);
            }

            println!(
                "{}({}@{}) over {} rows, {} groups",
                func,
                if distinct { "DISTINCT " } else { "" },
                workload.value_column,
                workload.rows.num_rows(),
                workload.rows.num_groups()
            );
            let report = aggregate(&workload, func, distinct, ordering.into(), config).await?;
            if print {
                for row in &report.rows {
                    println!("{}", format_row(row));
                }
            }
            println!(
                "{} rows in {:.2} ms, peak live groups {}",
                report.rows.len(),
                report.elapsed_ms,
                report.peak_live_buckets
            );
        }

        Commands::Compare {
            func,
            group_size,
            grouped,
        } => {
            let func: AggregateFunction = func.parse()?;
            let workload = Workload::new(group_size, grouped)?;

            let mut baseline: Option<Vec<String>> = None;
            for ordering in [Ordering::Ordered, Ordering::PartiallyOrdered, Ordering::Unordered] {
                let report =
                    aggregate(&workload, func, false, ordering, AggregatorConfig::new()).await?;
                let rows = sorted_strings(&report.rows);
                let expected = baseline.get_or_insert_with(|| rows.clone());
                let matches = *expected == rows;
                println!(
                    "{:<18} {:>8.2} ms  peak live groups {:>6}  {}",
                    format!("{:?}", ordering),
                    report.elapsed_ms,
                    report.peak_live_buckets,
                    if matches { "ok" } else { "MISMATCH" }
                );
            }
        }

        Commands::Functions => {
            for func in AggregateFunction::ALL {
                println!("{}", func);
            }
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() {
    // Set up logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let cli = Cli::parse();

    if let Err(e) = execute(cli.command).await {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
