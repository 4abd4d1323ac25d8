//! Record source adapters.
//!
//! Every ingestion strategy reads newline-delimited JSON through the
//! [`LineSource`] trait, so the strategies differ only in which source they
//! are handed and how often they write.
//!
//! # Available Sources
//!
//! - [`FileSource`] - Reads a local file from the start
//! - [`HttpSource`] - Streams a remote file over HTTP

mod file;
mod http;

pub use file::FileSource;
pub use http::{HttpConfig, HttpSource};

#[cfg(test)]
pub(crate) use http::test_server;

use crate::Result;
use std::io::BufRead;

/// A source of newline-delimited records.
///
/// Opening a source is the transport step: failures here are fatal to the
/// strategy invocation. Each call to [`LineSource::open`] starts again from
/// the first line.
pub trait LineSource {
    /// Short name for this kind of source (used in logs and metrics).
    fn name(&self) -> &'static str;

    /// Where the source reads from (path or URL).
    fn location(&self) -> String;

    /// Open a fresh reader positioned at the first line.
    fn open(&self) -> Result<Box<dyn BufRead>>;
}
