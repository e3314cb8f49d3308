use std::path::PathBuf;
use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue};

use crate::retry::RetryPolicy;

pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/142.0.0.0 Safari/537.36";

/// Configurable options for the download and merge pipeline.
#[derive(Debug, Clone)]
pub struct DownloaderConfig {
    /// Connection timeout (time to establish the initial connection).
    pub connect_timeout: Duration,

    /// Read timeout (maximum time between receiving data chunks).
    pub read_timeout: Duration,

    /// Whether to follow redirects.
    pub follow_redirects: bool,

    /// User agent string.
    pub user_agent: String,

    /// Custom HTTP headers for requests (Referer etc.). Merged over the
    /// defaults, custom values winning.
    pub headers: HeaderMap,

    /// Upper bound on simultaneously active transfers across all items.
    pub max_concurrent_transfers: usize,

    /// Retry behavior for transient transfer failures.
    pub retry: RetryPolicy,

    /// How many times a failed mux is retried before falling back to the
    /// video-only track.
    pub merge_retries: u32,

    /// Directory final files and temp files are written to.
    pub output_dir: PathBuf,
}

impl Default for DownloaderConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(30),
            read_timeout: Duration::from_secs(30),
            follow_redirects: true,
            user_agent: DEFAULT_USER_AGENT.to_owned(),
            headers: HeaderMap::new(),
            max_concurrent_transfers: 3,
            retry: RetryPolicy::default(),
            merge_retries: 2,
            output_dir: PathBuf::from("."),
        }
    }
}

impl DownloaderConfig {
    pub fn with_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = dir.into();
        self
    }

    pub fn with_concurrency(mut self, n: usize) -> Self {
        self.max_concurrent_transfers = n.max(1);
        self
    }

    pub fn with_header(mut self, name: reqwest::header::HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Build the shared HTTP client all transfers go through.
    pub fn build_client(&self) -> Result<reqwest::Client, reqwest::Error> {
        let redirect = if self.follow_redirects {
            reqwest::redirect::Policy::limited(10)
        } else {
            reqwest::redirect::Policy::none()
        };

        reqwest::Client::builder()
            .user_agent(self.user_agent.clone())
            .default_headers(self.merged_headers())
            .connect_timeout(self.connect_timeout)
            .read_timeout(self.read_timeout)
            .redirect(redirect)
            .build()
    }

    fn merged_headers(&self) -> HeaderMap {
        let mut headers = Self::default_headers();
        for (name, value) in self.headers.iter() {
            headers.insert(name.clone(), value.clone());
        }
        headers
    }

    fn default_headers() -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(
            reqwest::header::ACCEPT_ENCODING,
            HeaderValue::from_static("gzip, deflate"),
        );
        headers.insert(
            reqwest::header::CONNECTION,
            HeaderValue::from_static("keep-alive"),
        );
        headers
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn custom_headers_override_defaults() {
        let config = DownloaderConfig::default().with_header(
            reqwest::header::ACCEPT_ENCODING,
            HeaderValue::from_static("identity"),
        );
        let merged = config.merged_headers();
        assert_eq!(
            merged.get(reqwest::header::ACCEPT_ENCODING).unwrap(),
            "identity"
        );
        assert!(merged.get(reqwest::header::CONNECTION).is_some());
    }

    #[test]
    fn concurrency_is_at_least_one() {
        let config = DownloaderConfig::default().with_concurrency(0);
        assert_eq!(config.max_concurrent_transfers, 1);
    }
}
