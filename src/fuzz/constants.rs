//! Constants for the fuzzing engine (timeouts, limits, shutdown grace).

use std::time::Duration;

/// Default per-attempt request timeout (10 seconds).
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 10;

/// Default TCP connect timeout (5 seconds).
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 5;

/// Default request rate ceiling across all workers.
pub const DEFAULT_REQUESTS_PER_SECOND: f64 = 50.0;

/// Default token-bucket capacity.
pub const DEFAULT_BURST: u32 = 10;

/// Redirect hop limit when redirect following is enabled.
pub const DEFAULT_MAX_REDIRECTS: usize = 10;

/// Time in-flight tasks get to unwind after cancellation before they are aborted.
pub const CANCEL_GRACE_PERIOD: Duration = Duration::from_secs(5);

/// Maximum Retry-After value (1 hour) to prevent excessive delays.
pub const MAX_RETRY_AFTER: Duration = Duration::from_secs(3600);

/// Longest filename (in characters) the content store will create.
pub const MAX_FILENAME_LEN: usize = 120;

/// Placeholder in the body template replaced by the wordlist entry.
pub const BODY_PLACEHOLDER: &str = "FUZZ";

/// Default directory hit bodies are saved to.
pub const DEFAULT_OUTPUT_DIR: &str = "downloaded_pages";
