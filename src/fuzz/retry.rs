//! Retry logic with exponential backoff for transient probe failures.
//!
//! A failed attempt is classified into a [`FailureType`]. The [`RetryPolicy`]
//! then decides whether another attempt is made and how long to wait first.
//!
//! # Example
//!
//! ```
//! use driller_core::{FailureType, RetryDecision, RetryPolicy};
//!
//! let policy = RetryPolicy::with_max_retries(2);
//! match policy.should_retry(FailureType::Transient, 1) {
//!     RetryDecision::Retry { delay, attempt } => {
//!         println!("retrying in {delay:?} (attempt {attempt})");
//!     }
//!     RetryDecision::DoNotRetry { reason } => println!("giving up: {reason}"),
//! }
//! ```

use std::error::Error as _;
use std::time::Duration;

use rand::Rng;
use tracing::{debug, instrument};

use super::error::TransportErrorKind;

/// Default number of retries after the first attempt.
pub const DEFAULT_MAX_RETRIES: u32 = 2;

/// Default base delay for exponential backoff.
const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(250);

/// Default maximum delay cap.
const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(8);

/// Default backoff multiplier (doubles each attempt).
const DEFAULT_BACKOFF_MULTIPLIER: f32 = 2.0;

/// Maximum jitter added to delays.
const MAX_JITTER: Duration = Duration::from_millis(100);

/// Classification of a failed probe attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureType {
    /// Temporary failure that may succeed on retry (timeout, connection reset).
    Transient,

    /// Failure that will not succeed regardless of retries (DNS, TLS, bad URL).
    Permanent,

    /// Server rate limiting (HTTP 429).
    RateLimited,
}

impl From<TransportErrorKind> for FailureType {
    fn from(kind: TransportErrorKind) -> Self {
        if kind.is_transient() {
            Self::Transient
        } else {
            Self::Permanent
        }
    }
}

/// Decision on whether to retry a failed attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryDecision {
    /// Retry after the specified delay.
    Retry {
        /// How long to wait before retrying.
        delay: Duration,
        /// Which attempt number this will be (1-indexed, so first retry is attempt 2).
        attempt: u32,
    },

    /// Do not retry.
    DoNotRetry {
        /// Human-readable reason why retry is not attempted.
        reason: String,
    },
}

/// Configuration for retry behavior with exponential backoff.
///
/// ```text
/// delay = min(base_delay * multiplier^(attempt-1), max_delay) + jitter
/// ```
///
/// With defaults the delays are roughly 250ms, 500ms, 1s, ... capped at 8s.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum number of attempts (including the initial attempt).
    max_attempts: u32,
    base_delay: Duration,
    max_delay: Duration,
    backoff_multiplier: f32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_RETRIES + 1,
            base_delay: DEFAULT_BASE_DELAY,
            max_delay: DEFAULT_MAX_DELAY,
            backoff_multiplier: DEFAULT_BACKOFF_MULTIPLIER,
        }
    }
}

impl RetryPolicy {
    /// Creates a new retry policy with custom settings.
    ///
    /// `max_retries` counts retries after the first attempt, so `0` means a
    /// single attempt.
    #[must_use]
    pub fn new(
        max_retries: u32,
        base_delay: Duration,
        max_delay: Duration,
        backoff_multiplier: f32,
    ) -> Self {
        Self {
            max_attempts: max_retries.saturating_add(1),
            base_delay,
            max_delay,
            backoff_multiplier,
        }
    }

    /// Creates a policy with a custom retry count and default delays.
    #[must_use]
    pub fn with_max_retries(max_retries: u32) -> Self {
        Self {
            max_attempts: max_retries.saturating_add(1),
            ..Self::default()
        }
    }

    /// Maximum number of attempts, including the first.
    #[must_use]
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Number of retries after the first attempt.
    #[must_use]
    pub fn max_retries(&self) -> u32 {
        self.max_attempts - 1
    }

    /// Determines whether to retry after `attempt` (1-indexed) failed.
    #[instrument(level = "debug", skip(self), fields(max_attempts = self.max_attempts))]
    pub fn should_retry(&self, failure_type: FailureType, attempt: u32) -> RetryDecision {
        if failure_type == FailureType::Permanent {
            return RetryDecision::DoNotRetry {
                reason: "permanent failure - retry would not help".to_string(),
            };
        }

        if attempt >= self.max_attempts {
            debug!(attempt, max = self.max_attempts, "max attempts reached");
            return RetryDecision::DoNotRetry {
                reason: format!("max attempts ({}) exhausted", self.max_attempts),
            };
        }

        let delay = self.backoff_delay(attempt);
        debug!(
            attempt,
            next_attempt = attempt + 1,
            delay_ms = delay.as_millis(),
            "will retry"
        );

        RetryDecision::Retry {
            delay,
            attempt: attempt + 1,
        }
    }

    /// Backoff delay after `attempt` failed, jitter included.
    #[must_use]
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::cast_precision_loss
    )]
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let base_ms = self.base_delay.as_millis() as f64;
        let multiplier = f64::from(self.backoff_multiplier);
        let exponent = f64::from(attempt.saturating_sub(1));
        let delay_ms = base_ms * multiplier.powf(exponent);
        let capped_ms = delay_ms.min(self.max_delay.as_millis() as f64);

        Duration::from_millis(capped_ms as u64) + jitter()
    }
}

#[allow(clippy::cast_possible_truncation)]
fn jitter() -> Duration {
    let mut rng = rand::thread_rng();
    Duration::from_millis(rng.gen_range(0..=MAX_JITTER.as_millis() as u64))
}

/// Maps a reqwest error onto a [`TransportErrorKind`].
///
/// reqwest exposes timeouts and redirect failures directly. Refused and reset
/// connections are found by walking the source chain for an `io::Error`.
/// DNS and TLS failures only show up in the error text.
#[must_use]
pub fn classify_transport(error: &reqwest::Error) -> TransportErrorKind {
    if error.is_timeout() {
        return TransportErrorKind::Timeout;
    }
    if error.is_redirect() {
        return TransportErrorKind::TooManyRedirects;
    }
    if error.is_builder() {
        return TransportErrorKind::InvalidUrl;
    }

    let mut source = error.source();
    while let Some(inner) = source {
        if let Some(io) = inner.downcast_ref::<std::io::Error>() {
            match io.kind() {
                std::io::ErrorKind::ConnectionRefused => {
                    return TransportErrorKind::ConnectionRefused;
                }
                std::io::ErrorKind::ConnectionReset
                | std::io::ErrorKind::ConnectionAborted
                | std::io::ErrorKind::BrokenPipe
                | std::io::ErrorKind::UnexpectedEof => {
                    return TransportErrorKind::ConnectionReset;
                }
                std::io::ErrorKind::TimedOut => return TransportErrorKind::Timeout,
                _ => {}
            }
        }
        source = inner.source();
    }

    classify_transport_message(&error_chain_text(error))
}

/// Fallback classification from the flattened error text.
fn classify_transport_message(text: &str) -> TransportErrorKind {
    let text = text.to_lowercase();
    if text.contains("dns") || text.contains("failed to lookup") || text.contains("resolve") {
        TransportErrorKind::Dns
    } else if text.contains("certificate")
        || text.contains("tls")
        || text.contains("ssl")
        || text.contains("handshake")
    {
        TransportErrorKind::Tls
    } else if text.contains("connection refused") {
        TransportErrorKind::ConnectionRefused
    } else if text.contains("connection reset")
        || text.contains("connection closed")
        || text.contains("incomplete message")
    {
        TransportErrorKind::ConnectionReset
    } else {
        TransportErrorKind::Other
    }
}

/// Joins an error and all its sources into one `: `-separated line.
pub(crate) fn error_chain_text(error: &(dyn std::error::Error + 'static)) -> String {
    let mut text = error.to_string();
    let mut source = error.source();
    while let Some(inner) = source {
        text.push_str(": ");
        text.push_str(&inner.to_string());
        source = inner.source();
    }
    text
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_policy_default_values() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts(), 3);
        assert_eq!(policy.max_retries(), DEFAULT_MAX_RETRIES);
    }

    #[test]
    fn test_zero_retries_means_one_attempt() {
        let policy = RetryPolicy::with_max_retries(0);
        assert_eq!(policy.max_attempts(), 1);
        assert!(matches!(
            policy.should_retry(FailureType::Transient, 1),
            RetryDecision::DoNotRetry { .. }
        ));
    }

    #[test]
    fn test_permanent_never_retries() {
        let policy = RetryPolicy::with_max_retries(5);
        assert!(matches!(
            policy.should_retry(FailureType::Permanent, 1),
            RetryDecision::DoNotRetry { .. }
        ));
    }

    #[test]
    fn test_transient_retries_until_exhausted() {
        let policy = RetryPolicy::new(2, Duration::ZERO, Duration::ZERO, 2.0);
        assert!(matches!(
            policy.should_retry(FailureType::Transient, 1),
            RetryDecision::Retry { attempt: 2, .. }
        ));
        assert!(matches!(
            policy.should_retry(FailureType::RateLimited, 2),
            RetryDecision::Retry { attempt: 3, .. }
        ));
        assert!(matches!(
            policy.should_retry(FailureType::Transient, 3),
            RetryDecision::DoNotRetry { .. }
        ));
    }

    #[test]
    fn test_delay_grows_and_respects_cap() {
        let policy = RetryPolicy::new(10, Duration::from_millis(100), Duration::from_millis(300), 2.0);
        let first = policy.backoff_delay(1);
        let second = policy.backoff_delay(2);
        let tenth = policy.backoff_delay(10);
        assert!(first >= Duration::from_millis(100) && first <= Duration::from_millis(200));
        assert!(second >= Duration::from_millis(200) && second <= Duration::from_millis(300));
        assert!(tenth >= Duration::from_millis(300) && tenth <= Duration::from_millis(400));
    }

    #[test]
    fn test_jitter_within_bounds() {
        for _ in 0..100 {
            assert!(jitter() <= MAX_JITTER);
        }
    }

    #[test]
    fn test_failure_type_from_transport_kind() {
        assert_eq!(
            FailureType::from(TransportErrorKind::Timeout),
            FailureType::Transient
        );
        assert_eq!(
            FailureType::from(TransportErrorKind::ConnectionReset),
            FailureType::Transient
        );
        assert_eq!(
            FailureType::from(TransportErrorKind::Dns),
            FailureType::Permanent
        );
        assert_eq!(
            FailureType::from(TransportErrorKind::InvalidUrl),
            FailureType::Permanent
        );
        assert_eq!(
            FailureType::from(TransportErrorKind::ConnectionRefused),
            FailureType::Permanent
        );
        assert_eq!(
            FailureType::from(TransportErrorKind::Other),
            FailureType::Permanent
        );
    }

    #[test]
    fn test_classify_transport_message() {
        assert_eq!(
            classify_transport_message("error trying to connect: dns error: failed to lookup address"),
            TransportErrorKind::Dns
        );
        assert_eq!(
            classify_transport_message("invalid peer certificate: UnknownIssuer"),
            TransportErrorKind::Tls
        );
        assert_eq!(
            classify_transport_message("connection closed before message completed"),
            TransportErrorKind::ConnectionReset
        );
        assert_eq!(
            classify_transport_message("something odd"),
            TransportErrorKind::Other
        );
    }

    #[tokio::test]
    async fn test_classify_transport_connection_refused() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0");
        let Ok(listener) = listener else {
            return;
        };
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let client = reqwest::Client::new();
        let error = client
            .get(format!("http://{addr}/"))
            .send()
            .await
            .unwrap_err();
        let kind = classify_transport(&error);
        assert!(
            matches!(kind, TransportErrorKind::ConnectionRefused | TransportErrorKind::Other),
            "unexpected kind {kind:?}"
        );
    }
}
