//! Global token-bucket rate limiting for probe requests.
//!
//! One [`RateLimiter`] is shared by every worker in a run. The bucket holds up
//! to `burst` tokens and refills continuously at `requests_per_second`, based
//! on elapsed time rather than a fixed tick, so a full burst is available again
//! after an idle period.
//!
//! # Example
//!
//! ```
//! use driller_core::{CancelToken, RateLimiter};
//!
//! # async fn example() {
//! let limiter = RateLimiter::new(20.0, 5).unwrap();
//! let cancel = CancelToken::new();
//!
//! // The first five acquisitions are immediate, later ones wait for refill.
//! for _ in 0..8 {
//!     assert!(limiter.acquire(&cancel).await);
//! }
//! # }
//! ```

use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, instrument, warn};

use super::cancel::CancelToken;
use super::constants::MAX_RETRY_AFTER;
use super::error::ConfigError;

/// Token-bucket gate bounding requests issued per unit time.
///
/// Each acquisition takes its token immediately, possibly driving the balance
/// negative. A negative balance is the queue: the caller sleeps until the
/// refill has paid off its share of the debt. This hands every token to
/// exactly one caller without holding the lock across the wait.
#[derive(Debug)]
pub struct RateLimiter {
    rate: f64,
    burst: f64,
    state: Mutex<Bucket>,
}

#[derive(Debug)]
struct Bucket {
    tokens: f64,
    last_refill: Instant,
}

impl RateLimiter {
    /// Creates a limiter with a full bucket.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidRate`] when `requests_per_second` is not a
    /// finite number above zero, and [`ConfigError::InvalidBurst`] when `burst` is 0.
    #[instrument(level = "debug")]
    pub fn new(requests_per_second: f64, burst: u32) -> Result<Self, ConfigError> {
        if !requests_per_second.is_finite() || requests_per_second <= 0.0 {
            return Err(ConfigError::InvalidRate {
                value: requests_per_second,
            });
        }
        if burst == 0 {
            return Err(ConfigError::InvalidBurst { value: burst });
        }

        let burst = f64::from(burst);
        debug!("creating token bucket");
        Ok(Self {
            rate: requests_per_second,
            burst,
            state: Mutex::new(Bucket {
                tokens: burst,
                last_refill: Instant::now(),
            }),
        })
    }

    /// Configured refill rate in tokens per second.
    #[must_use]
    pub fn requests_per_second(&self) -> f64 {
        self.rate
    }

    /// Configured bucket capacity.
    #[must_use]
    pub fn burst(&self) -> f64 {
        self.burst
    }

    /// Waits for a token.
    ///
    /// Returns `true` when a token was granted and `false` if the run was
    /// cancelled first, in which case the reserved token is handed back.
    pub async fn acquire(&self, cancel: &CancelToken) -> bool {
        if cancel.is_cancelled() {
            return false;
        }

        let wait = self.reserve().await;
        if wait.is_zero() {
            return true;
        }

        debug!(wait_ms = wait.as_millis(), "waiting for rate limit token");
        tokio::select! {
            biased;
            () = cancel.cancelled() => {
                self.refund().await;
                false
            }
            () = tokio::time::sleep(wait) => true,
        }
    }

    /// Takes one token and returns how long the caller must wait before using it.
    async fn reserve(&self) -> Duration {
        let mut bucket = self.state.lock().await;
        let now = Instant::now();
        let elapsed = now.duration_since(bucket.last_refill).as_secs_f64();
        bucket.tokens = (bucket.tokens + elapsed * self.rate).min(self.burst);
        bucket.last_refill = now;
        bucket.tokens -= 1.0;

        if bucket.tokens >= 0.0 {
            Duration::ZERO
        } else {
            Duration::from_secs_f64(-bucket.tokens / self.rate)
        }
    }

    async fn refund(&self) {
        let mut bucket = self.state.lock().await;
        bucket.tokens = (bucket.tokens + 1.0).min(self.burst);
    }
}

/// Parses a Retry-After header value into a Duration.
///
/// Supports both RFC 7231 forms: integer seconds (`120`) and an HTTP-date
/// (`Wed, 21 Oct 2025 07:28:00 GMT`). Returns `None` if the value cannot be
/// parsed. Values above one hour are capped.
///
/// ```
/// use std::time::Duration;
/// use driller_core::fuzz::rate_limiter::parse_retry_after;
///
/// assert_eq!(parse_retry_after("120"), Some(Duration::from_secs(120)));
/// assert_eq!(parse_retry_after("0"), Some(Duration::ZERO));
/// assert_eq!(parse_retry_after("soon"), None);
/// ```
#[must_use]
#[instrument(level = "debug")]
pub fn parse_retry_after(header_value: &str) -> Option<Duration> {
    let header_value = header_value.trim();

    if let Ok(seconds) = header_value.parse::<i64>() {
        if seconds < 0 {
            debug!(seconds, "negative Retry-After value, ignoring");
            return None;
        }

        #[allow(clippy::cast_sign_loss)]
        let duration = Duration::from_secs(seconds as u64);
        if duration > MAX_RETRY_AFTER {
            warn!(
                seconds,
                max_seconds = MAX_RETRY_AFTER.as_secs(),
                "Retry-After exceeds maximum, capping at 1 hour"
            );
            return Some(MAX_RETRY_AFTER);
        }
        return Some(duration);
    }

    let Ok(datetime) = httpdate::parse_http_date(header_value) else {
        debug!(header_value, "unparseable Retry-After value");
        return None;
    };

    match datetime.duration_since(std::time::SystemTime::now()) {
        Ok(duration) if duration > MAX_RETRY_AFTER => {
            warn!(
                delay_secs = duration.as_secs(),
                max_secs = MAX_RETRY_AFTER.as_secs(),
                "Retry-After date exceeds maximum, capping at 1 hour"
            );
            Some(MAX_RETRY_AFTER)
        }
        Ok(duration) => Some(duration),
        Err(_) => {
            debug!(header_value, "Retry-After date is in the past, returning zero");
            Some(Duration::ZERO)
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Arc;

    use super::*;

    // ==================== RateLimiter Tests ====================

    #[test]
    fn test_new_rejects_non_positive_rate() {
        assert!(matches!(
            RateLimiter::new(0.0, 1),
            Err(ConfigError::InvalidRate { .. })
        ));
        assert!(matches!(
            RateLimiter::new(-3.0, 1),
            Err(ConfigError::InvalidRate { .. })
        ));
        assert!(matches!(
            RateLimiter::new(f64::NAN, 1),
            Err(ConfigError::InvalidRate { .. })
        ));
    }

    #[test]
    fn test_new_rejects_zero_burst() {
        assert!(matches!(
            RateLimiter::new(10.0, 0),
            Err(ConfigError::InvalidBurst { value: 0 })
        ));
    }

    #[tokio::test]
    async fn test_burst_is_immediate() {
        tokio::time::pause();
        let limiter = RateLimiter::new(1.0, 5).unwrap();
        let cancel = CancelToken::new();
        let start = Instant::now();
        for _ in 0..5 {
            assert!(limiter.acquire(&cancel).await);
        }
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test]
    async fn test_k_requests_take_at_least_k_minus_b_over_r() {
        tokio::time::pause();
        let rate = 10.0;
        let burst = 3_u32;
        let k = 13_u32;
        let limiter = RateLimiter::new(rate, burst).unwrap();
        let cancel = CancelToken::new();

        let start = Instant::now();
        for _ in 0..k {
            assert!(limiter.acquire(&cancel).await);
        }
        let elapsed = start.elapsed().as_secs_f64();
        let minimum = f64::from(k - burst) / rate;
        assert!(
            elapsed + 1e-6 >= minimum,
            "elapsed {elapsed}s, expected at least {minimum}s"
        );
    }

    #[tokio::test]
    async fn test_concurrent_acquirers_share_one_bucket() {
        tokio::time::pause();
        let limiter = Arc::new(RateLimiter::new(20.0, 2).unwrap());
        let cancel = CancelToken::new();
        let start = Instant::now();

        let mut handles = Vec::new();
        for _ in 0..12 {
            let limiter = Arc::clone(&limiter);
            let cancel = cancel.clone();
            handles.push(tokio::spawn(async move { limiter.acquire(&cancel).await }));
        }
        for handle in handles {
            assert!(handle.await.unwrap());
        }

        // 10 tokens beyond the burst at 20/s.
        assert!(start.elapsed() >= Duration::from_millis(500));
    }

    #[tokio::test]
    async fn test_refill_after_idle_restores_burst() {
        tokio::time::pause();
        let limiter = RateLimiter::new(4.0, 4).unwrap();
        let cancel = CancelToken::new();
        for _ in 0..4 {
            assert!(limiter.acquire(&cancel).await);
        }
        tokio::time::advance(Duration::from_secs(2)).await;

        let start = Instant::now();
        for _ in 0..4 {
            assert!(limiter.acquire(&cancel).await);
        }
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test]
    async fn test_acquire_returns_false_when_cancelled() {
        let limiter = RateLimiter::new(1.0, 1).unwrap();
        let cancel = CancelToken::new();
        cancel.cancel();
        assert!(!limiter.acquire(&cancel).await);
    }

    #[tokio::test]
    async fn test_cancel_interrupts_waiting_acquire() {
        let limiter = Arc::new(RateLimiter::new(0.01, 1).unwrap());
        let cancel = CancelToken::new();
        assert!(limiter.acquire(&cancel).await);

        let waiter = {
            let limiter = Arc::clone(&limiter);
            let cancel = cancel.clone();
            tokio::spawn(async move { limiter.acquire(&cancel).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        cancel.cancel();

        let granted = tokio::time::timeout(Duration::from_secs(2), waiter)
            .await
            .unwrap()
            .unwrap();
        assert!(!granted);
    }

    // ==================== parse_retry_after Tests ====================

    #[test]
    fn test_parse_retry_after_seconds() {
        assert_eq!(parse_retry_after("120"), Some(Duration::from_secs(120)));
        assert_eq!(parse_retry_after(" 5 "), Some(Duration::from_secs(5)));
    }

    #[test]
    fn test_parse_retry_after_negative_is_none() {
        assert_eq!(parse_retry_after("-1"), None);
    }

    #[test]
    fn test_parse_retry_after_caps_large_values() {
        assert_eq!(parse_retry_after("999999"), Some(MAX_RETRY_AFTER));
    }

    #[test]
    fn test_parse_retry_after_past_date_is_zero() {
        assert_eq!(
            parse_retry_after("Wed, 21 Oct 2015 07:28:00 GMT"),
            Some(Duration::ZERO)
        );
    }

    #[test]
    fn test_parse_retry_after_future_date() {
        let future = std::time::SystemTime::now() + Duration::from_secs(90);
        let value = httpdate::fmt_http_date(future);
        let parsed = parse_retry_after(&value).unwrap();
        assert!(parsed <= Duration::from_secs(90));
        assert!(parsed >= Duration::from_secs(80));
    }

    #[test]
    fn test_parse_retry_after_garbage_is_none() {
        assert_eq!(parse_retry_after("later"), None);
    }
}
