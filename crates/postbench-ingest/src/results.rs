//! Benchmark result collection and export.
//!
//! Results are kept as an ordered mapping from (strategy or method, volume or
//! iteration count) to elapsed time. Rendering them is somebody else's job;
//! this module only hands them over as JSON.

use crate::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

/// Key of one measurement: what ran, and how much of it.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct MeasurementKey {
    /// Strategy or aggregation method name.
    pub label: String,
    /// Record volume or iteration count.
    pub size: usize,
}

impl MeasurementKey {
    pub fn new(label: impl Into<String>, size: usize) -> Self {
        Self {
            label: label.into(),
            size,
        }
    }
}

/// A measurement that was aborted instead of timed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Failure {
    pub label: String,
    pub size: usize,
    pub error: String,
}

/// Ordered timings plus the measurements that failed.
#[derive(Debug, Clone, Default)]
pub struct BenchmarkResults {
    timings: BTreeMap<MeasurementKey, Duration>,
    failures: Vec<Failure>,
}

impl BenchmarkResults {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a timing, replacing any earlier one for the same key.
    pub fn record(&mut self, label: &str, size: usize, elapsed: Duration) {
        self.timings.insert(MeasurementKey::new(label, size), elapsed);
    }

    pub fn record_failure(&mut self, label: &str, size: usize, error: impl ToString) {
        self.failures.push(Failure {
            label: label.to_string(),
            size,
            error: error.to_string(),
        });
    }

    pub fn get(&self, label: &str, size: usize) -> Option<Duration> {
        self.timings.get(&MeasurementKey::new(label, size)).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&MeasurementKey, &Duration)> {
        self.timings.iter()
    }

    /// Timings for one label as `(size, seconds)`, smallest size first.
    pub fn series(&self, label: &str) -> Vec<(usize, f64)> {
        self.timings
            .iter()
            .filter(|(key, _)| key.label == label)
            .map(|(key, elapsed)| (key.size, elapsed.as_secs_f64()))
            .collect()
    }

    pub fn failures(&self) -> &[Failure] {
        &self.failures
    }

    pub fn len(&self) -> usize {
        self.timings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timings.is_empty()
    }

    /// Fold another result set into this one.
    pub fn merge(&mut self, other: BenchmarkResults) {
        self.timings.extend(other.timings);
        self.failures.extend(other.failures);
    }

    /// Serializable snapshot stamped with the current time.
    pub fn to_report(&self) -> ResultsReport {
        ResultsReport {
            generated_at: Utc::now(),
            rows: self
                .timings
                .iter()
                .map(|(key, elapsed)| ResultRow {
                    label: key.label.clone(),
                    size: key.size,
                    elapsed_secs: elapsed.as_secs_f64(),
                })
                .collect(),
            failures: self.failures.clone(),
        }
    }

    /// Write the report as pretty-printed JSON, creating parent directories.
    pub fn write_json(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(&self.to_report())?;
        std::fs::write(path, json)?;
        Ok(())
    }
}

/// One timed measurement in exported form.
#[derive(Debug, Clone, Serialize)]
pub struct ResultRow {
    pub label: String,
    pub size: usize,
    pub elapsed_secs: f64,
}

/// Exported result set.
#[derive(Debug, Clone, Serialize)]
pub struct ResultsReport {
    pub generated_at: DateTime<Utc>,
    pub rows: Vec<ResultRow>,
    pub failures: Vec<Failure>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_results_are_ordered_by_label_then_size() {
        let mut results = BenchmarkResults::new();
        results.record("file-single-row", 550, Duration::from_millis(30));
        results.record("file-batched", 550, Duration::from_millis(5));
        results.record("file-single-row", 110, Duration::from_millis(10));

        let keys: Vec<_> = results
            .iter()
            .map(|(key, _)| (key.label.as_str(), key.size))
            .collect();
        assert_eq!(
            keys,
            vec![
                ("file-batched", 550),
                ("file-single-row", 110),
                ("file-single-row", 550)
            ]
        );
        assert_eq!(
            results.series("file-single-row"),
            vec![(110, 0.01), (550, 0.03)]
        );
    }

    #[test]
    fn test_rerun_replaces_timing() {
        let mut results = BenchmarkResults::new();
        results.record("declarative", 5, Duration::from_secs(2));
        results.record("declarative", 5, Duration::from_secs(1));

        assert_eq!(results.len(), 1);
        assert_eq!(results.get("declarative", 5), Some(Duration::from_secs(1)));
        assert_eq!(results.get("declarative", 20), None);
    }

    #[test]
    fn test_merge_keeps_failures() {
        let mut a = BenchmarkResults::new();
        a.record("network-direct", 10, Duration::from_secs(1));
        let mut b = BenchmarkResults::new();
        b.record_failure("network-direct", 20, "connection reset");

        a.merge(b);
        assert_eq!(a.len(), 1);
        assert_eq!(a.failures().len(), 1);
        assert_eq!(a.failures()[0].error, "connection reset");
    }

    #[test]
    fn test_write_json() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("out").join("results.json");

        let mut results = BenchmarkResults::new();
        results.record("file-batched", 100, Duration::from_millis(250));
        results.record_failure("stream-to-file", 100, "timed out");
        results.write_json(&path).unwrap();

        let value: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(value["rows"][0]["label"], "file-batched");
        assert_eq!(value["rows"][0]["size"], 100);
        assert_eq!(value["rows"][0]["elapsed_secs"], 0.25);
        assert_eq!(value["failures"][0]["label"], "stream-to-file");
        assert!(value["generated_at"].is_string());
    }
}
