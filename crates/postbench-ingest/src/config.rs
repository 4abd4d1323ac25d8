//! Benchmark configuration loaded from environment variables.

use crate::runner::RunnerConfig;
use crate::source::HttpConfig;
use crate::store::{InsertStatements, StoreConfig};
use crate::{Error, Result};
use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

const DEFAULT_SOURCE_URL: &str = "http://dbgroup.cdm.depaul.edu/DSC450/OneDayOfTweets.txt";

/// Benchmark configuration.
#[derive(Debug, Clone)]
pub struct BenchConfig {
    /// SQLite database the insert strategies write to.
    pub db_path: PathBuf,

    /// Local dataset read by the file strategies and the aggregation passes.
    pub data_file: PathBuf,

    /// Remote dataset streamed by the network strategies.
    pub source_url: String,

    /// Where stream-to-file writes its copy.
    pub download_path: PathBuf,

    /// Records per flush for the batched strategy.
    pub batch_size: NonZeroUsize,

    /// Record volumes swept by `ingest`.
    pub volumes: Vec<usize>,

    /// Iteration counts swept by `aggregate`.
    pub iteration_counts: Vec<usize>,

    /// JSON file results are written to.
    pub results_path: PathBuf,

    /// Overall HTTP request timeout. `None` waits indefinitely.
    pub http_timeout: Option<Duration>,
}

impl Default for BenchConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("./data/postbench.db"),
            data_file: PathBuf::from("./data/tweets.json"),
            source_url: DEFAULT_SOURCE_URL.to_string(),
            download_path: PathBuf::from("./data/tweets.json"),
            batch_size: NonZeroUsize::new(2000).unwrap_or(NonZeroUsize::MIN),
            volumes: vec![110_000, 550_000],
            iteration_counts: vec![5, 20],
            results_path: PathBuf::from("./data/results.json"),
            http_timeout: None,
        }
    }
}

impl BenchConfig {
    /// Load configuration from environment variables.
    ///
    /// Required:
    /// - None (all have defaults for local development)
    ///
    /// Optional:
    /// - `POSTBENCH_DB_PATH`: SQLite database (default: "./data/postbench.db")
    /// - `POSTBENCH_DATA_FILE`: Local dataset (default: "./data/tweets.json")
    /// - `POSTBENCH_SOURCE_URL`: Remote dataset URL
    /// - `POSTBENCH_DOWNLOAD_PATH`: stream-to-file destination (default: "./data/tweets.json")
    /// - `POSTBENCH_BATCH_SIZE`: Positive batch size (default: 2000)
    /// - `POSTBENCH_VOLUMES`: Comma-separated record volumes (default: "110000,550000")
    /// - `POSTBENCH_ITERATIONS`: Comma-separated iteration counts (default: "5,20")
    /// - `POSTBENCH_RESULTS_PATH`: Results JSON (default: "./data/results.json")
    /// - `POSTBENCH_HTTP_TIMEOUT_SECS`: Overall HTTP timeout, 0 for none (default: none)
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();

        let db_path = env_path("POSTBENCH_DB_PATH").unwrap_or(defaults.db_path);
        let data_file = env_path("POSTBENCH_DATA_FILE").unwrap_or(defaults.data_file);
        let source_url = std::env::var("POSTBENCH_SOURCE_URL").unwrap_or(defaults.source_url);
        let download_path =
            env_path("POSTBENCH_DOWNLOAD_PATH").unwrap_or(defaults.download_path);
        let results_path = env_path("POSTBENCH_RESULTS_PATH").unwrap_or(defaults.results_path);

        let batch_size = match std::env::var("POSTBENCH_BATCH_SIZE") {
            Ok(raw) => parse_batch_size(&raw)?,
            Err(_) => defaults.batch_size,
        };

        let volumes = match std::env::var("POSTBENCH_VOLUMES") {
            Ok(raw) => parse_list("POSTBENCH_VOLUMES", &raw)?,
            Err(_) => defaults.volumes,
        };

        let iteration_counts = match std::env::var("POSTBENCH_ITERATIONS") {
            Ok(raw) => parse_list("POSTBENCH_ITERATIONS", &raw)?,
            Err(_) => defaults.iteration_counts,
        };

        let http_timeout = match std::env::var("POSTBENCH_HTTP_TIMEOUT_SECS") {
            Ok(raw) => {
                let secs: u64 = parse_value("POSTBENCH_HTTP_TIMEOUT_SECS", &raw)?;
                (secs > 0).then(|| Duration::from_secs(secs))
            }
            Err(_) => defaults.http_timeout,
        };

        tracing::info!(
            db_path = %db_path.display(),
            data_file = %data_file.display(),
            source_url = %source_url,
            batch_size = batch_size.get(),
            volumes = ?volumes,
            iteration_counts = ?iteration_counts,
            "benchmark configuration loaded"
        );

        Ok(Self {
            db_path,
            data_file,
            source_url,
            download_path,
            batch_size,
            volumes,
            iteration_counts,
            results_path,
            http_timeout,
        })
    }

    pub fn store(&self) -> StoreConfig {
        StoreConfig {
            db_path: self.db_path.clone(),
        }
    }

    pub fn http(&self) -> HttpConfig {
        HttpConfig {
            url: self.source_url.clone(),
            timeout: self.http_timeout,
            ..Default::default()
        }
    }

    pub fn runner_config(&self) -> RunnerConfig {
        RunnerConfig {
            store: self.store(),
            data_file: self.data_file.clone(),
            download_path: self.download_path.clone(),
            http: self.http(),
            batch_size: self.batch_size,
            statements: InsertStatements::standard(),
        }
    }
}

fn env_path(key: &str) -> Option<PathBuf> {
    std::env::var(key).ok().map(PathBuf::from)
}

fn parse_value<T: FromStr>(key: &str, raw: &str) -> Result<T> {
    raw.trim()
        .parse()
        .map_err(|_| Error::Config(format!("{key}: invalid value {raw:?}")))
}

/// Parse a positive batch size.
pub fn parse_batch_size(raw: &str) -> Result<NonZeroUsize> {
    parse_value("batch size", raw)
}

/// Parse a comma-separated list of counts, ignoring empty entries.
pub fn parse_list(key: &str, raw: &str) -> Result<Vec<usize>> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| parse_value(key, s))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Mutex to serialize config tests that manipulate env vars.
    static ENV_MUTEX: Mutex<()> = Mutex::new(());

    const ENV_KEYS: &[&str] = &[
        "POSTBENCH_DB_PATH",
        "POSTBENCH_DATA_FILE",
        "POSTBENCH_SOURCE_URL",
        "POSTBENCH_DOWNLOAD_PATH",
        "POSTBENCH_BATCH_SIZE",
        "POSTBENCH_VOLUMES",
        "POSTBENCH_ITERATIONS",
        "POSTBENCH_RESULTS_PATH",
        "POSTBENCH_HTTP_TIMEOUT_SECS",
    ];

    /// Helper to run config tests with isolated env vars.
    fn with_env_vars<F: FnOnce()>(vars: &[(&str, &str)], f: F) {
        let _guard = ENV_MUTEX.lock().unwrap();

        let saved: Vec<_> = ENV_KEYS
            .iter()
            .map(|k| (*k, std::env::var(k).ok()))
            .collect();

        // SAFETY: Serialized by mutex; only test code touches these vars.
        unsafe {
            for k in ENV_KEYS {
                std::env::remove_var(k);
            }
            for (k, v) in vars {
                std::env::set_var(k, v);
            }
        }

        f();

        // SAFETY: Restoring original env state.
        unsafe {
            for (k, v) in &saved {
                match v {
                    Some(val) => std::env::set_var(k, val),
                    None => std::env::remove_var(k),
                }
            }
        }
    }

    #[test]
    fn config_defaults() {
        with_env_vars(&[], || {
            let config = BenchConfig::from_env().unwrap();
            assert_eq!(config.db_path, PathBuf::from("./data/postbench.db"));
            assert_eq!(config.source_url, DEFAULT_SOURCE_URL);
            assert_eq!(config.batch_size.get(), 2000);
            assert_eq!(config.volumes, vec![110_000, 550_000]);
            assert_eq!(config.iteration_counts, vec![5, 20]);
            assert_eq!(config.http_timeout, None);
        });
    }

    #[test]
    fn config_custom_values() {
        with_env_vars(
            &[
                ("POSTBENCH_DB_PATH", "/tmp/bench.db"),
                ("POSTBENCH_SOURCE_URL", "http://localhost:8000/tweets.txt"),
                ("POSTBENCH_BATCH_SIZE", " 500 "),
                ("POSTBENCH_VOLUMES", "10, 100,,1000"),
                ("POSTBENCH_ITERATIONS", "1"),
                ("POSTBENCH_HTTP_TIMEOUT_SECS", "90"),
            ],
            || {
                let config = BenchConfig::from_env().unwrap();
                assert_eq!(config.db_path, PathBuf::from("/tmp/bench.db"));
                assert_eq!(config.batch_size.get(), 500);
                assert_eq!(config.volumes, vec![10, 100, 1000]);
                assert_eq!(config.iteration_counts, vec![1]);
                assert_eq!(config.http_timeout, Some(Duration::from_secs(90)));

                let runner = config.runner_config();
                assert_eq!(runner.http.url, "http://localhost:8000/tweets.txt");
                assert_eq!(runner.store.db_path, config.db_path);
            },
        );
    }

    #[test]
    fn config_zero_batch_size_rejected() {
        with_env_vars(&[("POSTBENCH_BATCH_SIZE", "0")], || {
            let err = BenchConfig::from_env().unwrap_err();
            assert!(matches!(err, Error::Config(_)));
        });
    }

    #[test]
    fn config_bad_volume_rejected() {
        with_env_vars(&[("POSTBENCH_VOLUMES", "10,lots")], || {
            let err = BenchConfig::from_env().unwrap_err();
            assert!(err.to_string().contains("POSTBENCH_VOLUMES"));
        });
    }

    #[test]
    fn config_zero_timeout_disables_it() {
        with_env_vars(&[("POSTBENCH_HTTP_TIMEOUT_SECS", "0")], || {
            let config = BenchConfig::from_env().unwrap();
            assert_eq!(config.http_timeout, None);
        });
    }
}
