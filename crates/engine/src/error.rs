use reqwest::StatusCode;

/// Error taxonomy for the download and merge pipeline.
///
/// `Cancelled` is deliberately a variant here so it can flow through the
/// same `Result` channels as real failures, but callers map it to a
/// non-failure outcome before reporting.
#[derive(Debug, thiserror::Error)]
pub enum DownloadError {
    #[error("download cancelled")]
    Cancelled,

    #[error("invalid URL `{input}`: {reason}")]
    InvalidUrl { input: String, reason: String },

    #[error("HTTP request failed: {source}")]
    Network {
        #[from]
        source: reqwest::Error,
    },

    #[error("request rejected with HTTP {status} for {url}")]
    HttpStatus { status: StatusCode, url: String },

    #[error("operation timed out: {reason}")]
    Timeout { reason: String },

    #[error("size mismatch: expected {expected} bytes, wrote {actual}")]
    SizeMismatch { expected: u64, actual: u64 },

    #[error("I/O error: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },

    #[error("muxing tool unavailable")]
    MuxingUnavailable,

    #[error("muxing failed: {reason}")]
    MuxingFailed { reason: String },

    #[error("invalid manifest: {reason}")]
    InvalidManifest { reason: String },

    #[error("internal error: {reason}")]
    Internal { reason: String },
}

impl DownloadError {
    pub fn invalid_url(input: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidUrl {
            input: input.into(),
            reason: reason.into(),
        }
    }

    pub fn http_status(status: StatusCode, url: impl Into<String>) -> Self {
        Self::HttpStatus {
            status,
            url: url.into(),
        }
    }

    pub fn muxing_failed(reason: impl Into<String>) -> Self {
        Self::MuxingFailed {
            reason: reason.into(),
        }
    }

    pub fn invalid_manifest(reason: impl Into<String>) -> Self {
        Self::InvalidManifest {
            reason: reason.into(),
        }
    }

    /// Whether another attempt at the same operation can reasonably succeed.
    ///
    /// A 4xx status is a remote rejection and never retried; 5xx and 429
    /// are server-side conditions worth another attempt. Timeouts are
    /// treated identically to transient network errors.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Cancelled
            | Self::InvalidUrl { .. }
            | Self::MuxingUnavailable
            | Self::InvalidManifest { .. } => false,
            Self::HttpStatus { status, .. } => {
                status.is_server_error() || *status == StatusCode::TOO_MANY_REQUESTS
            }
            Self::Network { source } => is_retryable_reqwest_error(source),
            Self::Timeout { .. }
            | Self::SizeMismatch { .. }
            | Self::Io { .. }
            | Self::MuxingFailed { .. }
            | Self::Internal { .. } => true,
        }
    }
}

/// Classify a reqwest error as retryable or non-retryable.
///
/// Retryable: connect, timeout, request, and body read errors.
/// Non-retryable: redirect loops and builder misconfiguration.
pub fn is_retryable_reqwest_error(e: &reqwest::Error) -> bool {
    e.is_connect() || e.is_timeout() || e.is_request() || e.is_body() || e.is_decode()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_errors_are_not_retryable() {
        let err = DownloadError::http_status(StatusCode::FORBIDDEN, "http://a/b");
        assert!(!err.is_retryable());
        let err = DownloadError::http_status(StatusCode::NOT_FOUND, "http://a/b");
        assert!(!err.is_retryable());
    }

    #[test]
    fn server_errors_and_rate_limits_are_retryable() {
        let err = DownloadError::http_status(StatusCode::INTERNAL_SERVER_ERROR, "http://a/b");
        assert!(err.is_retryable());
        let err = DownloadError::http_status(StatusCode::TOO_MANY_REQUESTS, "http://a/b");
        assert!(err.is_retryable());
    }

    #[test]
    fn cancellation_is_terminal() {
        assert!(!DownloadError::Cancelled.is_retryable());
    }

    #[test]
    fn size_mismatch_is_retryable() {
        let err = DownloadError::SizeMismatch {
            expected: 1000,
            actual: 900,
        };
        assert!(err.is_retryable());
    }
}
