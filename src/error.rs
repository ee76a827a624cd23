//! Error types for sitefetch.
//!
//! Startup errors (bad configuration, unreadable input) surface through
//! [`Error`] and abort the run before any pipeline stage launches. Per-URL
//! fetch failures use the narrower [`FetchError`] and stay local to the fetch
//! task that hit them.

use thiserror::Error;

/// Result type alias for sitefetch operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for sitefetch
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable description of the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "max_concurrent_fetches")
        key: Option<String>,
    },

    /// Input file missing or unreadable
    #[error("cannot read input file '{path}': {source}")]
    InputUnreadable {
        /// Path that was supplied on the command line
        path: String,
        /// Underlying I/O error
        source: std::io::Error,
    },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP client construction or transport error
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Per-URL fetch failure that escaped its fetch task
    #[error("fetch error: {0}")]
    Fetch(#[from] FetchError),
}

/// Failure modes for a single URL fetch
///
/// These never cross stage boundaries as hard failures; the dispatch loop
/// logs them, the metrics collector counts them, and the item is dropped.
#[derive(Debug, Error)]
pub enum FetchError {
    /// The cancellation token fired before the fetch completed
    #[error("fetch of '{url}' cancelled during shutdown")]
    Cancelled {
        /// URL whose fetch was abandoned
        url: String,
    },

    /// The request exceeded the configured per-fetch timeout
    #[error("timeout fetching '{url}'")]
    Timeout {
        /// URL that timed out
        url: String,
    },

    /// TCP/TLS connection to the host failed
    #[error("connection failed for '{url}': {message}")]
    Connect {
        /// URL whose host was unreachable
        url: String,
        /// Transport-level detail
        message: String,
    },

    /// The server answered with a non-success status code
    #[error("HTTP {status} fetching '{url}'")]
    HttpStatus {
        /// URL that was rejected
        url: String,
        /// Status code returned by the server
        status: u16,
    },

    /// The response body could not be read to completion
    #[error("failed to read response body from '{url}': {message}")]
    Body {
        /// URL whose body read failed
        url: String,
        /// Underlying error detail
        message: String,
    },

    /// Any other transport-level failure
    #[error("failed to fetch '{url}': {message}")]
    Transport {
        /// URL that failed
        url: String,
        /// Underlying error detail
        message: String,
    },
}

impl FetchError {
    /// True when this failure was caused by shutdown, not by the remote end.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, FetchError::Cancelled { .. })
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fetch_error_displays_url() {
        let err = FetchError::HttpStatus {
            url: "http://example.com/a".to_string(),
            status: 404,
        };
        assert_eq!(err.to_string(), "HTTP 404 fetching 'http://example.com/a'");
    }

    #[test]
    fn cancelled_is_distinguished_from_other_failures() {
        let cancelled = FetchError::Cancelled {
            url: "http://example.com".to_string(),
        };
        let timeout = FetchError::Timeout {
            url: "http://example.com".to_string(),
        };
        assert!(cancelled.is_cancelled());
        assert!(!timeout.is_cancelled());
    }

    #[test]
    fn io_error_converts_into_main_error() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err: Error = io.into();
        assert!(matches!(err, Error::Io(_)));
    }
}
