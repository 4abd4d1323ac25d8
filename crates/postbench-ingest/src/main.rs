//! postbench command-line driver.
//!
//! Loads configuration from `POSTBENCH_*` environment variables, lets flags
//! override it, and runs one of the benchmark harnesses.
//!
//! # Usage
//!
//! ```bash
//! # Copy the first 550k lines of the remote dataset to a local file
//! postbench fetch --lines 550000
//!
//! # Time every strategy at two volumes
//! postbench ingest --volumes 110000,550000 --batch-size 2000
//!
//! # Time only the file strategies, with metrics on :9091
//! postbench --metrics-port 9091 ingest --strategies file-single-row,file-batched
//!
//! # Compare the aggregation methods
//! postbench aggregate --iterations 5,20
//!
//! # Materialize and count the joined table
//! postbench query --preset joined-table
//! ```

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand, ValueEnum};
use postbench_core::metrics::{init_metrics, start_metrics_server};
use postbench_ingest::queries::{joined_table_queries, row_count_queries};
use postbench_ingest::{
    AggregationBenchmark, AggregationMethod, BenchConfig, BenchmarkResults, BenchmarkRunner,
    HttpSource, NamedQuery, QueryReport, Strategy, ensure_schema, execute_and_report,
    open_connection, stream_to_file,
};
use std::num::NonZeroUsize;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Ingestion-strategy benchmarks for tweet data.
#[derive(Parser, Debug)]
#[command(name = "postbench")]
#[command(about = "Benchmark ingestion strategies for newline-delimited tweets")]
#[command(version)]
struct Args {
    /// SQLite database path
    #[arg(long, global = true)]
    db_path: Option<PathBuf>,

    /// Where to write the results JSON
    #[arg(long, global = true)]
    results_path: Option<PathBuf>,

    /// Metrics HTTP server port (0 to disable)
    #[arg(long, global = true, default_value = "0")]
    metrics_port: u16,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Copy the first N lines of the remote dataset to a local file
    Fetch {
        /// Number of lines to copy
        #[arg(long)]
        lines: usize,

        /// Remote dataset URL
        #[arg(long)]
        url: Option<String>,

        /// Destination file
        #[arg(long, short)]
        output: Option<PathBuf>,
    },

    /// Time ingestion strategies across record volumes
    Ingest {
        /// Strategies to run (comma-separated, default: all)
        #[arg(long, value_delimiter = ',')]
        strategies: Option<Vec<String>>,

        /// Record volumes (comma-separated)
        #[arg(long, value_delimiter = ',')]
        volumes: Option<Vec<usize>>,

        /// Records per flush for the batched strategy
        #[arg(long)]
        batch_size: Option<NonZeroUsize>,

        /// Local dataset for the file strategies
        #[arg(long)]
        data_file: Option<PathBuf>,

        /// Remote dataset URL for the network strategies
        #[arg(long)]
        url: Option<String>,
    },

    /// Time the three per-actor aggregation methods
    Aggregate {
        /// Methods to run (comma-separated, default: all)
        #[arg(long, value_delimiter = ',')]
        methods: Option<Vec<String>>,

        /// Iteration counts (comma-separated)
        #[arg(long, value_delimiter = ',')]
        iterations: Option<Vec<usize>>,

        /// Local dataset for the in-memory passes
        #[arg(long)]
        data_file: Option<PathBuf>,
    },

    /// Run named statements against the store and time them
    Query {
        /// Built-in statement set
        #[arg(long, value_enum)]
        preset: Option<Preset>,

        /// Extra statement as DESCRIPTION=SQL (repeatable)
        #[arg(long = "sql")]
        statements: Vec<String>,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum Preset {
    /// Distinct row count of each relation
    RowCounts,
    /// Create and count the post/actor/location join
    JoinedTable,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("info".parse()?)
                .add_directive("postbench_ingest=debug".parse()?),
        )
        .init();

    let args = Args::parse();
    let mut config = BenchConfig::from_env().context("Failed to load configuration")?;
    if let Some(db_path) = args.db_path.clone() {
        config.db_path = db_path;
    }
    if let Some(results_path) = args.results_path.clone() {
        config.results_path = results_path;
    }

    if args.metrics_port > 0 {
        let metrics_handle = init_metrics();
        start_metrics_server(args.metrics_port, metrics_handle)
            .await
            .context("Failed to start metrics server")?;
    }

    // Measurements are synchronous and must not overlap; keep them on one
    // blocking thread so the metrics server stays responsive.
    tokio::task::spawn_blocking(move || run(args.command, config))
        .await
        .context("Benchmark task panicked")?
}

fn run(command: Command, mut config: BenchConfig) -> Result<()> {
    match command {
        Command::Fetch { lines, url, output } => {
            if let Some(url) = url {
                config.source_url = url;
            }
            if let Some(output) = output {
                config.download_path = output;
            }
            fetch(&config, lines)
        }
        Command::Ingest {
            strategies,
            volumes,
            batch_size,
            data_file,
            url,
        } => {
            if let Some(volumes) = volumes {
                config.volumes = volumes;
            }
            if let Some(batch_size) = batch_size {
                config.batch_size = batch_size;
            }
            if let Some(data_file) = data_file {
                config.data_file = data_file;
            }
            if let Some(url) = url {
                config.source_url = url;
            }
            let strategies = match strategies {
                Some(names) => names
                    .iter()
                    .map(|name| name.parse::<Strategy>())
                    .collect::<postbench_ingest::Result<Vec<_>>>()?,
                None => Strategy::ALL.to_vec(),
            };
            ingest(&config, &strategies)
        }
        Command::Aggregate {
            methods,
            iterations,
            data_file,
        } => {
            if let Some(iterations) = iterations {
                config.iteration_counts = iterations;
            }
            if let Some(data_file) = data_file {
                config.data_file = data_file;
            }
            let methods = match methods {
                Some(names) => names
                    .iter()
                    .map(|name| name.parse::<AggregationMethod>())
                    .collect::<postbench_ingest::Result<Vec<_>>>()?,
                None => AggregationMethod::ALL.to_vec(),
            };
            aggregate(&config, &methods)
        }
        Command::Query { preset, statements } => {
            let mut queries = match preset {
                Some(Preset::RowCounts) => row_count_queries(),
                Some(Preset::JoinedTable) => joined_table_queries(),
                None => Vec::new(),
            };
            for raw in &statements {
                queries.push(parse_statement(raw)?);
            }
            if queries.is_empty() {
                bail!("Nothing to run: pass --preset or --sql");
            }
            query(&config, &queries)
        }
    }
}

fn fetch(config: &BenchConfig, lines: usize) -> Result<()> {
    tracing::info!("Fetching {} lines from {}", lines, config.source_url);
    let source = HttpSource::new(config.http()).context("Failed to build HTTP client")?;
    let report = stream_to_file(&source, &config.download_path, lines)
        .with_context(|| format!("Failed to copy {}", config.source_url))?;

    println!(
        "Copied {} lines to {} in {:.3}s",
        report.records_ingested,
        config.download_path.display(),
        report.elapsed_secs()
    );
    Ok(())
}

fn ingest(config: &BenchConfig, strategies: &[Strategy]) -> Result<()> {
    tracing::info!(
        "Benchmarking {} strategies at volumes {:?} (batch size {})",
        strategies.len(),
        config.volumes,
        config.batch_size
    );
    let runner = BenchmarkRunner::new(config.runner_config());
    let results = runner.sweep(strategies, &config.volumes);

    print_summary("INGESTION", config, &results);
    write_results(config, &results)
}

fn aggregate(config: &BenchConfig, methods: &[AggregationMethod]) -> Result<()> {
    {
        let conn = open_connection(&config.store()).context("Failed to open store")?;
        ensure_schema(&conn).context("Failed to prepare schema")?;
    }
    let bench = AggregationBenchmark::new(&config.data_file, config.store());
    let results = bench.sweep_methods(methods, &config.iteration_counts);

    print_summary("AGGREGATION", config, &results);
    write_results(config, &results)
}

fn query(config: &BenchConfig, queries: &[NamedQuery]) -> Result<()> {
    let conn = open_connection(&config.store()).context("Failed to open store")?;
    ensure_schema(&conn).context("Failed to prepare schema")?;
    let report = execute_and_report(&conn, queries).context("Query failed")?;
    print_query_report(&report);
    Ok(())
}

/// Parse `DESCRIPTION=SQL`; without a description the SQL names itself.
fn parse_statement(raw: &str) -> Result<NamedQuery> {
    let (description, sql) = match raw.split_once('=') {
        Some((description, sql))
            if !description.trim().is_empty() && !description.contains(char::is_whitespace) =>
        {
            (description.trim(), sql.trim())
        }
        _ => (raw.trim(), raw.trim()),
    };
    if sql.is_empty() {
        bail!("Empty statement: {raw:?}");
    }
    Ok(NamedQuery::new(description, sql))
}

fn write_results(config: &BenchConfig, results: &BenchmarkResults) -> Result<()> {
    results
        .write_json(&config.results_path)
        .with_context(|| format!("Failed to write {}", config.results_path.display()))?;
    tracing::info!("Results written to {}", config.results_path.display());
    Ok(())
}

fn print_summary(title: &str, config: &BenchConfig, results: &BenchmarkResults) {
    println!("\n══════════════════════════════════════════════════════════════════");
    println!("{title} SUMMARY");
    println!("══════════════════════════════════════════════════════════════════\n");

    println!("Database:    {}", config.db_path.display());
    println!("Data file:   {}", config.data_file.display());
    println!("Results:     {}", config.results_path.display());
    println!();
    println!("╭─────────────────────────────────────────────────────────────────╮");
    println!("│ {:<24} {:>14} {:>20}     │", "Method", "Size", "Elapsed (s)");
    println!("├─────────────────────────────────────────────────────────────────┤");
    for (key, elapsed) in results.iter() {
        println!(
            "│ {:<24} {:>14} {:>20.4}     │",
            key.label,
            key.size,
            elapsed.as_secs_f64()
        );
    }
    println!("╰─────────────────────────────────────────────────────────────────╯");

    if !results.failures().is_empty() {
        println!();
        println!("Failed measurements: {}", results.failures().len());
        for failure in results.failures() {
            println!("  - {} at {}: {}", failure.label, failure.size, failure.error);
        }
    }
}

fn print_query_report(report: &QueryReport) {
    println!("\n══════════════════════════════════════════════════════════════════");
    println!("QUERY SUMMARY");
    println!("══════════════════════════════════════════════════════════════════\n");

    for timing in &report.timings {
        let outcome = match (&timing.first_value, timing.rows_changed) {
            (Some(value), _) => value.clone(),
            (None, Some(rows)) => format!("{rows} rows changed"),
            (None, None) => "completed".to_string(),
        };
        println!(
            "{:<32} {:>10.4}s  {}",
            timing.description,
            timing.elapsed.as_secs_f64(),
            outcome
        );
    }
    println!();
    println!("Total: {:.4}s", report.total.as_secs_f64());
}
