//! Prometheus metrics helpers for postbench.
//!
//! Ingestion strategies and benchmark runners record through the `metrics`
//! facade. Without an installed recorder every call is a no-op, so library
//! code never has to check whether metrics are enabled.
//!
//! # Usage
//!
//! ```rust,ignore
//! use postbench_core::metrics::{init_metrics, start_metrics_server};
//!
//! #[tokio::main]
//! async fn main() {
//!     let handle = init_metrics();
//!     start_metrics_server(9091, handle).await.unwrap();
//!
//!     metrics::counter!("ingest_records_total").increment(1);
//! }
//! ```
//!
//! # Metric Naming Conventions
//!
//! - Prefix: component (`ingest_`, `benchmark_`, `aggregate_`)
//! - Suffix: unit or type (`_total`, `_seconds`)
//! - Labels: `source`, `strategy` or `method` only, all low cardinality

use axum::{Router, routing::get};
use metrics::{describe_counter, describe_gauge, describe_histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::net::SocketAddr;

/// Initialize the Prometheus metrics recorder.
///
/// # Panics
///
/// Panics if called more than once (the recorder can only be installed once).
pub fn init_metrics() -> PrometheusHandle {
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .expect("Failed to install Prometheus recorder");

    register_common_metrics();

    handle
}

/// Like [`init_metrics`] but returns `None` if a recorder is already installed.
pub fn try_init_metrics() -> Option<PrometheusHandle> {
    let handle = PrometheusBuilder::new().install_recorder().ok()?;
    register_common_metrics();
    Some(handle)
}

/// Start the Prometheus metrics HTTP server.
///
/// Serves `/metrics` on the given port from a background task and returns
/// once the listener is bound.
pub async fn start_metrics_server(
    port: u16,
    handle: PrometheusHandle,
) -> Result<(), std::io::Error> {
    let app = Router::new().route(
        "/metrics",
        get(move || {
            let handle = handle.clone();
            async move { handle.render() }
        }),
    );

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("Metrics server listening on http://{}/metrics", addr);

    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            tracing::error!("Metrics server stopped: {}", e);
        }
    });

    Ok(())
}

/// Register descriptions for the metrics postbench records.
fn register_common_metrics() {
    // =========================================================================
    // Ingestion
    // =========================================================================

    describe_counter!(
        "ingest_records_total",
        "Records normalized and written by an ingestion strategy (label: source)"
    );
    describe_counter!(
        "ingest_records_malformed_total",
        "Lines skipped as malformed during ingestion (label: source)"
    );
    describe_counter!(
        "ingest_batches_flushed_total",
        "Multi-row batch flushes committed by the batched strategy"
    );
    describe_counter!(
        "ingest_lines_copied_total",
        "Lines copied verbatim by the stream-to-file strategy"
    );

    // =========================================================================
    // Benchmark runs
    // =========================================================================

    describe_histogram!(
        "benchmark_run_seconds",
        "Wall-clock time of one benchmark measurement (labels: strategy or method)"
    );
    describe_counter!(
        "benchmark_failures_total",
        "Benchmark measurements aborted by a transport or store error"
    );
    describe_gauge!(
        "benchmark_running",
        "Whether a benchmark sweep is currently running (1=yes, 0=no)"
    );

    // =========================================================================
    // Aggregation
    // =========================================================================

    describe_counter!(
        "aggregate_iterations_total",
        "Aggregation iterations executed (label: method)"
    );
}
