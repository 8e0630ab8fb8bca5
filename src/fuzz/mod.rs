//! Concurrent HTTP endpoint fuzzing engine.
//!
//! A run takes a base URL and a sequence of wordlist entries, probes one
//! resolved URL per entry (and per extension), classifies each response by
//! status code and optionally saves the bodies of hits to disk.
//!
//! # Features
//!
//! - Bounded concurrency with a global token-bucket rate limit
//! - Exponential backoff for transient failures and HTTP 429
//! - Include/exclude status filtering with deterministic precedence
//! - Collision-free, atomic body persistence with content dedup
//! - Cooperative cancellation with a grace period
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use driller_core::fuzz::{CancelToken, FuzzConfig, FuzzEngine, MemorySink};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let mut config = FuzzConfig::new("http://example.test/");
//! config.output_directory = "./pages".into();
//! let engine = FuzzEngine::new(config)?;
//! let sink = Arc::new(MemorySink::new());
//! engine
//!     .run(&engine.generator(["admin"]), sink.clone(), CancelToken::new())
//!     .await?;
//! for report in sink.reports() {
//!     println!("{} {}", report.verdict, report.url);
//! }
//! # Ok(())
//! # }
//! ```

mod cancel;
pub mod candidate;
pub mod classifier;
mod client;
mod config;
pub mod constants;
mod engine;
mod error;
pub mod filename;
mod progress;
pub mod rate_limiter;
mod retry;
mod sink;
mod store;
mod target;

pub use cancel::CancelToken;
pub use candidate::{Candidate, CandidateGenerator, Candidates, resolve_candidate_url};
pub use classifier::{
    DEFAULT_UNINTERESTING_STATUS, MatchRule, ProbeOutcome, StatusFilter, Verdict, VerdictKind,
    classify_status,
};
pub use client::{ClientSettings, ProbeClient, ProbeResponse};
pub use config::FuzzConfig;
pub use engine::{DEFAULT_CONCURRENCY, FuzzEngine, MAX_CONCURRENCY, MIN_CONCURRENCY};
pub use error::{ConfigError, EngineError, StoreError, TransportError, TransportErrorKind};
pub use progress::{ProgressAggregator, ProgressEvent, RunStats};
pub use rate_limiter::{RateLimiter, parse_retry_after};
pub use retry::{
    DEFAULT_MAX_RETRIES, FailureType, RetryDecision, RetryPolicy, classify_transport,
};
pub use sink::{MemorySink, NullSink, ProbeReport, ResultSink, RunOutcome, RunSummary};
pub use store::{ContentStore, DownloadRecord, DownloadState};
pub use target::{HttpMethod, TargetDescriptor};
