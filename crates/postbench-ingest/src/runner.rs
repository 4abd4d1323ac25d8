//! Benchmark runner: times one strategy at one volume, or a whole sweep.

use crate::ingest::{IngestReport, Strategy, insert_batched, insert_per_record, stream_to_file};
use crate::results::BenchmarkResults;
use crate::schema::ensure_schema;
use crate::source::{FileSource, HttpConfig, HttpSource};
use crate::store::{InsertStatements, StoreConfig, open_connection};
use crate::Result;
use std::num::NonZeroUsize;
use std::path::PathBuf;

/// Everything a strategy needs besides the volume.
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    pub store: StoreConfig,
    /// Local copy read by the file strategies.
    pub data_file: PathBuf,
    /// Destination written by stream-to-file.
    pub download_path: PathBuf,
    pub http: HttpConfig,
    pub batch_size: NonZeroUsize,
    pub statements: InsertStatements,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            store: StoreConfig::default(),
            data_file: PathBuf::from("./data/tweets.json"),
            download_path: PathBuf::from("./data/tweets.json"),
            http: HttpConfig::default(),
            batch_size: NonZeroUsize::new(2000).unwrap_or(NonZeroUsize::MIN),
            statements: InsertStatements::standard(),
        }
    }
}

/// One completed measurement.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub strategy: Strategy,
    pub volume: usize,
    pub report: IngestReport,
}

impl RunOutcome {
    pub fn elapsed_secs(&self) -> f64 {
        self.report.elapsed_secs()
    }
}

/// Runs strategies one after another; nothing here overlaps.
pub struct BenchmarkRunner {
    config: RunnerConfig,
}

impl BenchmarkRunner {
    pub fn new(config: RunnerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RunnerConfig {
        &self.config
    }

    /// Run the strategy named `strategy_name` for `volume` records.
    pub fn run(&self, strategy_name: &str, volume: usize) -> Result<RunOutcome> {
        self.run_strategy(strategy_name.parse()?, volume)
    }

    /// Run one strategy. Schema setup and source construction happen before
    /// the strategy starts its clock.
    pub fn run_strategy(&self, strategy: Strategy, volume: usize) -> Result<RunOutcome> {
        let config = &self.config;
        if strategy.writes_store() {
            let conn = open_connection(&config.store)?;
            ensure_schema(&conn)?;
        }

        tracing::info!("Running {} for {} records", strategy, volume);
        let report = match strategy {
            Strategy::StreamToFile => {
                let source = HttpSource::new(config.http.clone())?;
                stream_to_file(&source, &config.download_path, volume)?
            }
            Strategy::NetworkDirect => {
                let source = HttpSource::new(config.http.clone())?;
                insert_per_record(&config.store, &config.statements, &source, volume)?
            }
            Strategy::FileSingleRow => {
                let source = FileSource::new(&config.data_file);
                insert_per_record(&config.store, &config.statements, &source, volume)?
            }
            Strategy::FileBatched => {
                let source = FileSource::new(&config.data_file);
                insert_batched(
                    &config.store,
                    &config.statements,
                    &source,
                    volume,
                    config.batch_size,
                )?
            }
        };

        metrics::histogram!("benchmark_run_seconds", "strategy" => strategy.as_str())
            .record(report.elapsed_secs());
        tracing::info!(
            "{} at {} records took {:.3}s",
            strategy,
            volume,
            report.elapsed_secs()
        );

        Ok(RunOutcome {
            strategy,
            volume,
            report,
        })
    }

    /// Run every strategy at every volume, in order.
    ///
    /// A failed measurement is logged and recorded as a failure; the sweep
    /// moves on to the next one.
    pub fn sweep(&self, strategies: &[Strategy], volumes: &[usize]) -> BenchmarkResults {
        let mut results = BenchmarkResults::new();
        metrics::gauge!("benchmark_running").set(1.0);

        for &volume in volumes {
            for &strategy in strategies {
                match self.run_strategy(strategy, volume) {
                    Ok(outcome) => {
                        results.record(strategy.as_str(), volume, outcome.report.elapsed);
                    }
                    Err(e) => {
                        tracing::warn!("{} at {} records failed: {}", strategy, volume, e);
                        metrics::counter!("benchmark_failures_total").increment(1);
                        results.record_failure(strategy.as_str(), volume, &e);
                    }
                }
            }
        }

        metrics::gauge!("benchmark_running").set(0.0);
        results
    }
}
