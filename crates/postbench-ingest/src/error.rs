//! Error types for ingestion and benchmarking.

use thiserror::Error;

/// Result type alias using the crate's error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that abort a strategy invocation or a benchmark measurement.
///
/// Record-level problems never show up here: strategies count malformed
/// records and keep going.
#[derive(Error, Debug)]
pub enum Error {
    /// SQLite error (constraint violation, I/O inside the store, bad SQL).
    #[error("Store error: {0}")]
    Store(#[from] rusqlite::Error),

    /// I/O error reading a source or writing a file.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP error opening or reading a network source.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON error serializing results.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Strategy name not recognized.
    #[error("Unknown ingestion strategy: {0}")]
    UnknownStrategy(String),

    /// Aggregation method name not recognized.
    #[error("Unknown aggregation method: {0}")]
    UnknownMethod(String),

    /// The store carries a schema version this build does not know.
    #[error("Unsupported schema version {found} (expected at most {supported})")]
    SchemaVersion {
        /// Version recorded in the store.
        found: i32,
        /// Highest version this build can use.
        supported: i32,
    },
}

impl Error {
    /// Whether the failure came from the record source rather than the store.
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Io(_) | Self::Http(_))
    }
}
