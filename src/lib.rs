//! Driller Core Library
//!
//! Core functionality for the `driller` endpoint fuzzer: it expands a
//! wordlist against a target URL, probes every candidate concurrently under
//! a global rate limit, and saves the content of discovered endpoints.
//!
//! # Architecture
//!
//! - [`fuzz`] - Candidate generation, rate limiting, probing, classification,
//!   content storage and progress accounting
//! - [`wordlist`] - Wordlist file loading

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod fuzz;
mod user_agent;
pub mod wordlist;

// Re-export commonly used types
pub use fuzz::{
    CancelToken, CandidateGenerator, ConfigError, ContentStore, DEFAULT_CONCURRENCY,
    DEFAULT_MAX_RETRIES, EngineError, FailureType, FuzzConfig, FuzzEngine, HttpMethod,
    MemorySink, NullSink, ProbeReport, ProgressAggregator, RateLimiter, ResultSink, RetryDecision,
    RetryPolicy, RunOutcome, RunStats, RunSummary, StatusFilter, TargetDescriptor, VerdictKind,
};
pub use wordlist::{load_wordlist, parse_wordlist};
