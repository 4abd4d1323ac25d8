//! HTTP stream source.
//!
//! The response body is read incrementally, so a run that stops after N
//! records never downloads the rest of the file.

use super::LineSource;
use crate::Result;
use std::io::{BufRead, BufReader};
use std::time::Duration;

/// Read buffer for the response body.
const READ_BUFFER_BYTES: usize = 64 * 1024;

/// Configuration for the HTTP source.
#[derive(Debug, Clone)]
pub struct HttpConfig {
    /// URL of the newline-delimited dataset.
    pub url: String,

    /// Timeout for establishing the connection.
    pub connect_timeout: Duration,

    /// Overall request timeout, including reading the body. `None` disables it.
    pub timeout: Option<Duration>,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            url: "http://dbgroup.cdm.depaul.edu/DSC450/OneDayOfTweets.txt".to_string(),
            connect_timeout: Duration::from_secs(30),
            timeout: None,
        }
    }
}

/// Streams records from an HTTP URL.
pub struct HttpSource {
    config: HttpConfig,
    client: reqwest::blocking::Client,
}

impl HttpSource {
    /// Build the source and its HTTP client.
    pub fn new(config: HttpConfig) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .connect_timeout(config.connect_timeout)
            .timeout(config.timeout)
            .build()?;
        Ok(Self { config, client })
    }

    pub fn config(&self) -> &HttpConfig {
        &self.config
    }
}

impl LineSource for HttpSource {
    fn name(&self) -> &'static str {
        "http"
    }

    fn location(&self) -> String {
        self.config.url.clone()
    }

    fn open(&self) -> Result<Box<dyn BufRead>> {
        let response = self
            .client
            .get(&self.config.url)
            .send()?
            .error_for_status()?;
        tracing::debug!(
            "Opened {} (status {}, content-length {:?})",
            self.config.url,
            response.status(),
            response.content_length()
        );
        Ok(Box::new(BufReader::with_capacity(READ_BUFFER_BYTES, response)))
    }
}
