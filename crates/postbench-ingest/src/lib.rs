//! Ingestion-strategy benchmarks for newline-delimited tweet data.
//!
//! This crate loads posts into SQLite under competing ingestion strategies
//! and times them, and times three ways of computing a per-actor aggregate.
//!
//! # Modules
//!
//! - [`source`] - Line source adapters (local file, HTTP stream)
//! - [`schema`] / [`store`] - Relations and insert-if-absent writes
//! - [`ingest`] - The four ingestion strategies
//! - [`runner`] - Times strategies across volumes
//! - [`aggregate`] - Declarative vs structured vs pattern aggregation
//! - [`queries`] - Named ad hoc statements with timings
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐
//! │   LineSource    │  (local file, HTTP stream)
//! └────────┬────────┘
//!          │
//!          ▼
//! ┌─────────────────┐
//! │  RecordReader   │  Normalizes lines, skips malformed ones
//! └────────┬────────┘
//!          │
//!          ▼
//! ┌─────────────────┐
//! │    Strategy     │  Per-record writes or same-kind batches
//! └────────┬────────┘
//!          │
//!          ▼
//! ┌─────────────────┐
//! │     SQLite      │  actor / location / post
//! └────────┬────────┘
//!          │
//!          ▼
//! ┌─────────────────┐
//! │BenchmarkResults │  (strategy, volume) -> elapsed, exported as JSON
//! └─────────────────┘
//! ```

pub mod aggregate;
pub mod config;
pub mod error;
pub mod ingest;
pub mod queries;
pub mod results;
pub mod runner;
pub mod schema;
pub mod source;
pub mod store;

// Re-export commonly used types at crate root
pub use error::{Error, Result};

pub use aggregate::{AggregationBenchmark, AggregationMethod};
pub use config::BenchConfig;
pub use ingest::{
    IngestContext, IngestReport, Strategy, insert_batched, insert_per_record, stream_to_file,
};
pub use queries::{NamedQuery, QueryReport, StatementKind, execute_and_report};
pub use results::BenchmarkResults;
pub use runner::{BenchmarkRunner, RunOutcome, RunnerConfig};
pub use schema::ensure_schema;
pub use source::{FileSource, HttpConfig, HttpSource, LineSource};
pub use store::{InsertStatements, StoreConfig, open_connection};
