//! Error types for record normalization.

use thiserror::Error;

/// Result type alias using the crate's error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Reasons a raw record cannot be turned into entities.
///
/// Every variant is record-level: callers count it as a malformed record and
/// move on to the next line.
#[derive(Error, Debug)]
pub enum Error {
    /// The line is not valid JSON.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The line decoded to something other than a JSON object.
    #[error("record at position {position} is not a JSON object")]
    NotAnObject {
        /// Sequence position of the record within the source.
        position: usize,
    },

    /// A field that forms a primary or foreign key is missing or absent.
    #[error("record at position {position} is missing key field '{field}'")]
    MissingKey {
        /// Sequence position of the record within the source.
        position: usize,
        /// Dotted path of the missing field.
        field: &'static str,
    },
}
