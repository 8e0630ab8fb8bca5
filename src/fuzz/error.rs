//! Error types for the fuzzing engine.
//!
//! Configuration errors are fatal and reported before any request is issued.
//! Transport and store errors are scoped to a single candidate and never abort
//! a run. Classification has no error type: every status code maps to a verdict.

use std::fmt;
use std::path::PathBuf;

use serde::Serialize;
use thiserror::Error;

/// Fatal configuration problems detected before the run starts.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The target URL could not be parsed as an absolute URL.
    #[error("invalid target URL {url}: {reason}")]
    InvalidUrl {
        /// The rejected URL string.
        url: String,
        /// Why parsing failed.
        reason: String,
    },

    /// The target URL uses a scheme other than http or https.
    #[error("unsupported URL scheme '{scheme}' in {url}: expected http or https")]
    UnsupportedScheme {
        /// The rejected URL string.
        url: String,
        /// The scheme that was found.
        scheme: String,
    },

    /// The HTTP method name is not recognised.
    #[error("invalid HTTP method '{method}'")]
    InvalidMethod {
        /// The rejected method name.
        method: String,
    },

    /// The method list is empty.
    #[error("no HTTP methods configured: at least one is required")]
    NoMethods,

    /// Concurrency outside the supported range.
    #[error("invalid concurrency value {value}: must be between {min} and {max}")]
    InvalidConcurrency {
        /// The rejected value.
        value: usize,
        /// Smallest accepted value.
        min: usize,
        /// Largest accepted value.
        max: usize,
    },

    /// Request rate is zero, negative, or not finite.
    #[error("invalid request rate {value}: must be a finite number greater than zero")]
    InvalidRate {
        /// The rejected requests-per-second value.
        value: f64,
    },

    /// Token bucket capacity below one.
    #[error("invalid burst {value}: must be at least 1")]
    InvalidBurst {
        /// The rejected burst value.
        value: u32,
    },

    /// A timeout of zero was configured.
    #[error("invalid {field}: must be greater than zero")]
    InvalidTimeout {
        /// Which timeout setting was rejected.
        field: &'static str,
    },

    /// A header name or value is not valid HTTP.
    #[error("invalid header '{name}': {reason}")]
    InvalidHeader {
        /// The header name as given.
        name: String,
        /// Why it was rejected.
        reason: String,
    },

    /// A cookie name or value is not valid.
    #[error("invalid cookie '{name}': {reason}")]
    InvalidCookie {
        /// The cookie name as given.
        name: String,
        /// Why it was rejected.
        reason: String,
    },

    /// A status code outside 100..=599 in the include or exclude set.
    #[error("invalid status code {code}: must be between 100 and 599")]
    InvalidStatusCode {
        /// The rejected code.
        code: u16,
    },

    /// The output directory cannot be created or written to.
    #[error("output directory {path} is not writable: {source}")]
    OutputDirectory {
        /// The configured output directory.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// The HTTP client could not be constructed.
    #[error("failed to build HTTP client: {source}")]
    ClientBuild {
        /// The underlying reqwest error.
        #[source]
        source: reqwest::Error,
    },
}

impl ConfigError {
    /// Creates an invalid URL error.
    pub fn invalid_url(url: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidUrl {
            url: url.into(),
            reason: reason.into(),
        }
    }

    /// Creates an invalid header error.
    pub fn invalid_header(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidHeader {
            name: name.into(),
            reason: reason.into(),
        }
    }

    /// Creates an invalid cookie error.
    pub fn invalid_cookie(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidCookie {
            name: name.into(),
            reason: reason.into(),
        }
    }

    /// Creates an output directory error.
    pub fn output_directory(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::OutputDirectory {
            path: path.into(),
            source,
        }
    }
}

/// Kind of transport-level failure observed while probing a candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportErrorKind {
    /// The attempt exceeded the per-request timeout.
    Timeout,
    /// The server refused the TCP connection.
    ConnectionRefused,
    /// The connection was reset or closed mid-exchange.
    ConnectionReset,
    /// Host name resolution failed.
    Dns,
    /// TLS handshake or certificate failure.
    Tls,
    /// The redirect hop limit was exceeded.
    TooManyRedirects,
    /// The request URL was rejected by the client.
    InvalidUrl,
    /// Any other network failure.
    Other,
}

impl TransportErrorKind {
    /// Returns true when a retry has a reasonable chance of succeeding.
    #[must_use]
    pub fn is_transient(self) -> bool {
        matches!(self, Self::Timeout | Self::ConnectionReset)
    }

    /// Stable label used in logs and reports.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Timeout => "timeout",
            Self::ConnectionRefused => "connection refused",
            Self::ConnectionReset => "connection reset",
            Self::Dns => "dns failure",
            Self::Tls => "tls failure",
            Self::TooManyRedirects => "too many redirects",
            Self::InvalidUrl => "invalid url",
            Self::Other => "network error",
        }
    }
}

impl fmt::Display for TransportErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A transport failure for one probe attempt.
///
/// The source error is flattened to a message so outcomes can be cloned
/// into reports.
#[derive(Debug, Clone, Error)]
#[error("{kind} probing {url}: {message}")]
pub struct TransportError {
    /// The URL being probed.
    pub url: String,
    /// Classified failure kind.
    pub kind: TransportErrorKind,
    /// Human-readable detail from the underlying error.
    pub message: String,
}

impl TransportError {
    /// Creates a transport error.
    pub fn new(url: impl Into<String>, kind: TransportErrorKind, message: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            kind,
            message: message.into(),
        }
    }
}

/// Errors while persisting a hit's body to the content store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// File system error (create, write, rename).
    #[error("IO error writing to {path}: {source}")]
    Io {
        /// The file path where the error occurred.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// The response body stream failed before completion.
    #[error("body stream for {url} failed: {message}")]
    Stream {
        /// The URL whose body was being read.
        url: String,
        /// Detail from the stream error.
        message: String,
    },

    /// The follow-up request for the body failed.
    #[error("fetching body failed: {0}")]
    Fetch(#[from] TransportError),

    /// The follow-up request returned a different status than the probe.
    #[error("fetching body for {url} returned HTTP {status}")]
    FetchStatus {
        /// The URL that was fetched.
        url: String,
        /// The unexpected status.
        status: u16,
    },

    /// Bytes written differ from the declared Content-Length.
    #[error("truncated body for {path}: expected {expected_bytes} bytes, got {actual_bytes}")]
    Truncated {
        /// Path the body was destined for.
        path: PathBuf,
        /// Declared size in bytes.
        expected_bytes: u64,
        /// Actual bytes written.
        actual_bytes: u64,
    },

    /// The run was cancelled before the body was persisted.
    #[error("download cancelled")]
    Cancelled,
}

impl StoreError {
    /// Creates an IO error.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Creates a stream error.
    pub fn stream(url: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::Stream {
            url: url.into(),
            message: message.to_string(),
        }
    }
}

/// Errors that abort a run as a whole.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Configuration was invalid.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Semaphore was closed unexpectedly.
    #[error("semaphore closed unexpectedly")]
    SemaphoreClosed,
}
