//! Engine configuration.

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::time::Duration;

use super::classifier::StatusFilter;
use super::client::ClientSettings;
use super::constants::{
    DEFAULT_BURST, DEFAULT_CONNECT_TIMEOUT_SECS, DEFAULT_MAX_REDIRECTS, DEFAULT_OUTPUT_DIR,
    DEFAULT_REQUEST_TIMEOUT_SECS, DEFAULT_REQUESTS_PER_SECOND,
};
use super::engine::{DEFAULT_CONCURRENCY, MAX_CONCURRENCY, MIN_CONCURRENCY};
use super::error::ConfigError;
use super::retry::DEFAULT_MAX_RETRIES;
use super::target::{HttpMethod, TargetDescriptor};

/// Everything the engine needs for one run.
///
/// The wordlist is not part of the configuration: it reaches the engine as a
/// sequence of strings through [`super::FuzzEngine::generator`].
#[derive(Debug, Clone)]
pub struct FuzzConfig {
    /// Absolute http(s) base URL.
    pub target_url: String,
    /// Probe methods; every path is probed once per method, in this order.
    pub methods: Vec<HttpMethod>,
    /// Extra request headers, applied in order (later names replace earlier).
    pub headers: Vec<(String, String)>,
    /// Cookies sent with every request.
    pub cookies: Vec<(String, String)>,
    /// Request body template; `FUZZ` is replaced by the wordlist entry.
    pub body: Option<Vec<u8>>,
    /// Extensions appended to each entry in addition to the bare entry.
    pub extensions: Vec<String>,
    /// Number of concurrent workers.
    pub concurrency: usize,
    /// Request rate ceiling across all workers.
    pub requests_per_second: f64,
    /// Token-bucket capacity.
    pub burst: u32,
    /// Per-attempt request timeout.
    pub request_timeout: Duration,
    /// TCP connect timeout.
    pub connect_timeout: Duration,
    /// Retries after the first attempt for transient failures and 429s.
    pub max_retries: u32,
    /// Statuses that count as hits; empty means "anything interesting".
    pub status_include: BTreeSet<u16>,
    /// Statuses that never count as hits. Wins over the include-set.
    pub status_exclude: BTreeSet<u16>,
    /// Save hit bodies.
    pub download: bool,
    /// Where hit bodies go; created if absent.
    pub output_directory: PathBuf,
    /// Follow redirects instead of classifying the 3xx itself.
    pub follow_redirects: bool,
    /// Hop limit when following redirects.
    pub max_redirects: usize,
}

impl FuzzConfig {
    /// Creates a configuration with defaults for everything but the target.
    #[must_use]
    pub fn new(target_url: impl Into<String>) -> Self {
        Self {
            target_url: target_url.into(),
            methods: vec![HttpMethod::default()],
            headers: Vec::new(),
            cookies: Vec::new(),
            body: None,
            extensions: Vec::new(),
            concurrency: DEFAULT_CONCURRENCY,
            requests_per_second: DEFAULT_REQUESTS_PER_SECOND,
            burst: DEFAULT_BURST,
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
            connect_timeout: Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS),
            max_retries: DEFAULT_MAX_RETRIES,
            status_include: BTreeSet::new(),
            status_exclude: BTreeSet::new(),
            download: true,
            output_directory: PathBuf::from(DEFAULT_OUTPUT_DIR),
            follow_redirects: false,
            max_redirects: DEFAULT_MAX_REDIRECTS,
        }
    }

    /// Checks every field that can be checked without touching the network
    /// or the file system.
    ///
    /// # Errors
    ///
    /// Returns the first [`ConfigError`] found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.target_descriptor()?;

        if !(MIN_CONCURRENCY..=MAX_CONCURRENCY).contains(&self.concurrency) {
            return Err(ConfigError::InvalidConcurrency {
                value: self.concurrency,
                min: MIN_CONCURRENCY,
                max: MAX_CONCURRENCY,
            });
        }
        if !self.requests_per_second.is_finite() || self.requests_per_second <= 0.0 {
            return Err(ConfigError::InvalidRate {
                value: self.requests_per_second,
            });
        }
        if self.burst == 0 {
            return Err(ConfigError::InvalidBurst { value: self.burst });
        }
        if self.request_timeout.is_zero() {
            return Err(ConfigError::InvalidTimeout {
                field: "request timeout",
            });
        }
        if self.connect_timeout.is_zero() {
            return Err(ConfigError::InvalidTimeout {
                field: "connect timeout",
            });
        }
        self.status_filter()?;
        Ok(())
    }

    /// Builds the target descriptor from the URL, methods, headers, cookies and body.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidUrl`], [`ConfigError::UnsupportedScheme`]
    /// or [`ConfigError::NoMethods`].
    pub fn target_descriptor(&self) -> Result<TargetDescriptor, ConfigError> {
        let Some(&first) = self.methods.first() else {
            return Err(ConfigError::NoMethods);
        };
        let mut target = TargetDescriptor::new(&self.target_url, first)?
            .with_methods(self.methods.iter().copied());
        for (name, value) in &self.headers {
            target = target.with_header(name.clone(), value.clone());
        }
        for (name, value) in &self.cookies {
            target = target.with_cookie(name.clone(), value.clone());
        }
        if let Some(body) = &self.body {
            target = target.with_body(body.clone());
        }
        Ok(target)
    }

    /// Builds the validated status filter.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidStatusCode`] for codes outside 100..=599.
    pub fn status_filter(&self) -> Result<StatusFilter, ConfigError> {
        StatusFilter::new(
            self.status_include.iter().copied(),
            self.status_exclude.iter().copied(),
        )
    }

    /// Transport settings for the probe client.
    #[must_use]
    pub fn client_settings(&self) -> ClientSettings {
        ClientSettings {
            request_timeout: self.request_timeout,
            connect_timeout: self.connect_timeout,
            follow_redirects: self.follow_redirects,
            max_redirects: self.max_redirects,
        }
    }
}
