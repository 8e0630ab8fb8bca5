//! HTTP probe client.
//!
//! Wraps a single `reqwest::Client` configured from the run's
//! [`TargetDescriptor`]: default headers, timeouts and redirect policy. The
//! client is shared by all workers.
//!
//! The configured cookies go out as a fixed `Cookie` header. There is no
//! cookie store, so a `Set-Cookie` from one probed path never reaches the
//! requests for other paths.

use std::sync::Arc;
use std::time::{Duration, Instant};

use reqwest::header::{
    CONTENT_LENGTH, CONTENT_TYPE, COOKIE, HeaderMap, HeaderName, HeaderValue, RETRY_AFTER,
};
use reqwest::{Client, redirect};
use tracing::{debug, instrument};
use url::Url;

use super::candidate::Candidate;
use super::constants::{
    DEFAULT_CONNECT_TIMEOUT_SECS, DEFAULT_MAX_REDIRECTS, DEFAULT_REQUEST_TIMEOUT_SECS,
};
use super::error::{ConfigError, TransportError};
use super::rate_limiter::parse_retry_after;
use super::retry::{classify_transport, error_chain_text};
use super::target::{HttpMethod, TargetDescriptor};
use crate::user_agent;

/// Transport settings for the probe client.
#[derive(Debug, Clone)]
pub struct ClientSettings {
    /// Per-attempt timeout for the whole exchange: connect, send, response
    /// headers and reading the body.
    pub request_timeout: Duration,
    /// TCP connect timeout.
    pub connect_timeout: Duration,
    /// Follow 3xx responses instead of reporting them.
    pub follow_redirects: bool,
    /// Hop limit when following redirects.
    pub max_redirects: usize,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
            connect_timeout: Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS),
            follow_redirects: false,
            max_redirects: DEFAULT_MAX_REDIRECTS,
        }
    }
}

/// A received HTTP response, with the fields the classifier and store need
/// pulled out up front. The body has not been read yet.
#[derive(Debug)]
pub struct ProbeResponse {
    /// HTTP status code.
    pub status: u16,
    /// Declared Content-Length, if the server sent one.
    pub content_length: Option<u64>,
    /// Content-Type header value.
    pub content_type: Option<String>,
    /// Time from sending the request to receiving response headers.
    pub elapsed: Duration,
    /// Parsed Retry-After header.
    pub retry_after: Option<Duration>,
    /// The underlying response, for streaming the body.
    pub response: reqwest::Response,
}

impl ProbeResponse {
    fn from_response(response: reqwest::Response, elapsed: Duration) -> Self {
        let headers = response.headers();
        let content_length = header_str(headers, &CONTENT_LENGTH).and_then(|v| v.parse().ok());
        let content_type = header_str(headers, &CONTENT_TYPE).map(ToString::to_string);
        let retry_after = header_str(headers, &RETRY_AFTER).and_then(parse_retry_after);

        Self {
            status: response.status().as_u16(),
            content_length,
            content_type,
            elapsed,
            retry_after,
            response,
        }
    }

    /// Response headers.
    #[must_use]
    pub fn headers(&self) -> &HeaderMap {
        self.response.headers()
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: &HeaderName) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok()).map(str::trim)
}

/// Issues probe and fetch requests against one target.
#[derive(Debug, Clone)]
pub struct ProbeClient {
    client: Client,
    target: Arc<TargetDescriptor>,
}

impl ProbeClient {
    /// Builds the client.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidHeader`] or [`ConfigError::InvalidCookie`]
    /// for values that cannot be sent, [`ConfigError::InvalidTimeout`] for zero
    /// timeouts, and [`ConfigError::ClientBuild`] if reqwest rejects the setup.
    #[instrument(level = "debug", skip_all, fields(base_url = %target.base_url()))]
    pub fn new(target: Arc<TargetDescriptor>, settings: &ClientSettings) -> Result<Self, ConfigError> {
        if settings.request_timeout.is_zero() {
            return Err(ConfigError::InvalidTimeout {
                field: "request timeout",
            });
        }
        if settings.connect_timeout.is_zero() {
            return Err(ConfigError::InvalidTimeout {
                field: "connect timeout",
            });
        }

        let headers = build_header_map(&target)?;

        let redirect_policy = if settings.follow_redirects {
            redirect::Policy::limited(settings.max_redirects)
        } else {
            redirect::Policy::none()
        };

        let client = Client::builder()
            .connect_timeout(settings.connect_timeout)
            .timeout(settings.request_timeout)
            .gzip(true)
            .user_agent(user_agent::default_probe_user_agent())
            .default_headers(headers)
            .redirect(redirect_policy)
            .build()
            .map_err(|source| ConfigError::ClientBuild { source })?;

        debug!(
            request_timeout_ms = settings.request_timeout.as_millis(),
            follow_redirects = settings.follow_redirects,
            "probe client ready"
        );
        Ok(Self { client, target })
    }

    /// The target this client was configured for.
    #[must_use]
    pub fn target(&self) -> &TargetDescriptor {
        &self.target
    }

    /// Sends one probe for `candidate`.
    ///
    /// # Errors
    ///
    /// Returns a [`TransportError`] when no HTTP response was received.
    #[instrument(level = "debug", skip_all, fields(url = %candidate.url, method = %candidate.method))]
    pub async fn probe(&self, candidate: &Candidate) -> Result<ProbeResponse, TransportError> {
        self.send(candidate.method, &candidate.url, candidate.body.clone())
            .await
    }

    /// Issues a plain GET for `url`, used to fetch a hit's body after a HEAD probe.
    ///
    /// # Errors
    ///
    /// Returns a [`TransportError`] when no HTTP response was received.
    #[instrument(level = "debug", skip(self), fields(url = %url))]
    pub async fn fetch(&self, url: &Url) -> Result<ProbeResponse, TransportError> {
        self.send(HttpMethod::Get, url, None).await
    }

    async fn send(
        &self,
        method: HttpMethod,
        url: &Url,
        body: Option<Vec<u8>>,
    ) -> Result<ProbeResponse, TransportError> {
        let mut request = self.client.request(method.to_reqwest(), url.clone());
        if let Some(body) = body {
            request = request.body(body);
        }

        let started = Instant::now();
        match request.send().await {
            Ok(response) => {
                let probe = ProbeResponse::from_response(response, started.elapsed());
                debug!(status = probe.status, elapsed_ms = probe.elapsed.as_millis(), "response");
                Ok(probe)
            }
            Err(error) => {
                let kind = classify_transport(&error);
                debug!(kind = %kind, error = %error, "transport failure");
                Err(TransportError::new(url.as_str(), kind, error_chain_text(&error)))
            }
        }
    }
}

fn build_header_map(target: &TargetDescriptor) -> Result<HeaderMap, ConfigError> {
    let mut headers = HeaderMap::new();
    for (name, value) in target.headers() {
        let header_name = HeaderName::from_bytes(name.trim().as_bytes())
            .map_err(|e| ConfigError::invalid_header(name, e.to_string()))?;
        let header_value = HeaderValue::from_str(value.trim())
            .map_err(|e| ConfigError::invalid_header(name, e.to_string()))?;
        headers.insert(header_name, header_value);
    }

    for (name, value) in target.cookies() {
        validate_cookie(name, value)?;
    }
    if let Some(cookie) = target.cookie_header() {
        let value = HeaderValue::from_str(&cookie)
            .map_err(|e| ConfigError::invalid_cookie(&cookie, e.to_string()))?;
        headers.insert(COOKIE, value);
    }
    Ok(headers)
}

fn validate_cookie(name: &str, value: &str) -> Result<(), ConfigError> {
    if name.is_empty() {
        return Err(ConfigError::invalid_cookie(name, "empty name"));
    }
    let bad_name_char = |c: char| c.is_whitespace() || c.is_control() || "=;,\"".contains(c);
    if name.chars().any(bad_name_char) {
        return Err(ConfigError::invalid_cookie(name, "name contains a reserved character"));
    }
    let bad_value_char = |c: char| c.is_control() || c == ';' || c == ',';
    if value.chars().any(bad_value_char) {
        return Err(ConfigError::invalid_cookie(name, "value contains a reserved character"));
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn target() -> TargetDescriptor {
        TargetDescriptor::new("http://example.test", HttpMethod::Get).unwrap()
    }

    #[test]
    fn test_new_with_defaults() {
        let client = ProbeClient::new(Arc::new(target()), &ClientSettings::default());
        assert!(client.is_ok());
    }

    #[test]
    fn test_new_rejects_invalid_header_name() {
        let target = target().with_header("Bad Header", "x");
        let result = ProbeClient::new(Arc::new(target), &ClientSettings::default());
        assert!(matches!(result, Err(ConfigError::InvalidHeader { name, .. }) if name == "Bad Header"));
    }

    #[test]
    fn test_new_rejects_invalid_header_value() {
        let target = target().with_header("X-Token", "line\nbreak");
        let result = ProbeClient::new(Arc::new(target), &ClientSettings::default());
        assert!(matches!(result, Err(ConfigError::InvalidHeader { .. })));
    }

    #[test]
    fn test_new_rejects_invalid_cookie() {
        let target = target().with_cookie("bad name", "x");
        let result = ProbeClient::new(Arc::new(target), &ClientSettings::default());
        assert!(matches!(result, Err(ConfigError::InvalidCookie { .. })));

        let target = self::target().with_cookie("session", "a;b");
        let result = ProbeClient::new(Arc::new(target), &ClientSettings::default());
        assert!(matches!(result, Err(ConfigError::InvalidCookie { .. })));
    }

    #[test]
    fn test_new_rejects_zero_timeout() {
        let settings = ClientSettings {
            request_timeout: Duration::ZERO,
            ..ClientSettings::default()
        };
        let result = ProbeClient::new(Arc::new(target()), &settings);
        assert!(matches!(result, Err(ConfigError::InvalidTimeout { .. })));
    }

    #[test]
    fn test_header_map_carries_fixed_cookie_header() {
        let target = target()
            .with_header("X-Trace", "1")
            .with_cookie("session", "abc")
            .with_cookie("lang", "en");
        let headers = build_header_map(&target).unwrap();
        assert_eq!(headers.get(COOKIE).unwrap(), "lang=en; session=abc");
        assert_eq!(headers.get("x-trace").unwrap(), "1");
    }

    #[test]
    fn test_header_map_without_cookies_has_no_cookie_header() {
        let headers = build_header_map(&target()).unwrap();
        assert!(headers.get(COOKIE).is_none());
    }

    #[test]
    fn test_validate_cookie_accepts_plain_pairs() {
        assert!(validate_cookie("session", "abc123").is_ok());
        assert!(validate_cookie("lang", "").is_ok());
        assert!(validate_cookie("", "x").is_err());
    }
}
