//! Fuzzing engine: bounded-concurrency dispatcher over a candidate sequence.
//!
//! The [`FuzzEngine`] pulls candidates from a [`CandidateGenerator`] and
//! spawns one Tokio task per candidate, gated by a semaphore sized to the
//! configured concurrency. Each task waits for a rate-limit token, probes,
//! retries transient failures, classifies the outcome, saves hit bodies and
//! reports to the [`ResultSink`].
//!
//! # Cancellation
//!
//! When the [`CancelToken`] fires the dispatcher stops pulling candidates.
//! In-flight tasks get [`CANCEL_GRACE_PERIOD`] to unwind; whatever is still
//! running after that is aborted and counted as abandoned.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use driller_core::{CancelToken, FuzzConfig, FuzzEngine, NullSink};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let mut config = FuzzConfig::new("http://example.test");
//! config.download = false;
//! let engine = FuzzEngine::new(config)?;
//! let generator = engine.generator(["admin", "login"]);
//! let summary = engine.run(&generator, Arc::new(NullSink), CancelToken::new()).await?;
//! println!("hits: {}", summary.stats.hits);
//! # Ok(())
//! # }
//! ```

mod task;

use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::{JoinError, JoinHandle};
use tokio::time::Instant;
use tracing::{debug, info, instrument, warn};

use super::cancel::CancelToken;
use super::candidate::CandidateGenerator;
use super::classifier::StatusFilter;
use super::client::ProbeClient;
use super::config::FuzzConfig;
use super::constants::CANCEL_GRACE_PERIOD;
use super::error::{ConfigError, EngineError};
use super::progress::{ProgressAggregator, ProgressEvent};
use super::rate_limiter::RateLimiter;
use super::retry::RetryPolicy;
use super::sink::{ResultSink, RunOutcome, RunSummary};
use super::store::ContentStore;
use super::target::TargetDescriptor;
use task::TaskContext;

/// Minimum allowed concurrency value.
pub const MIN_CONCURRENCY: usize = 1;

/// Maximum allowed concurrency value.
pub const MAX_CONCURRENCY: usize = 100;

/// Default concurrency if not specified.
pub const DEFAULT_CONCURRENCY: usize = 10;

/// Concurrent fuzzing engine.
///
/// Built once from a validated [`FuzzConfig`]. All configuration errors,
/// including an unwritable output directory, surface from
/// [`FuzzEngine::new`] before any request is sent.
#[derive(Debug)]
pub struct FuzzEngine {
    target: Arc<TargetDescriptor>,
    extensions: Vec<String>,
    client: ProbeClient,
    rate_limiter: Arc<RateLimiter>,
    retry_policy: RetryPolicy,
    filter: StatusFilter,
    store: Option<Arc<ContentStore>>,
    progress: Arc<ProgressAggregator>,
    semaphore: Arc<Semaphore>,
    concurrency: usize,
}

impl FuzzEngine {
    /// Validates `config` and builds the engine.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] for any invalid setting.
    #[instrument(level = "debug", skip_all, fields(target = %config.target_url))]
    pub fn new(config: FuzzConfig) -> Result<Self, ConfigError> {
        config.validate()?;

        let target = Arc::new(config.target_descriptor()?);
        let filter = config.status_filter()?;
        let rate_limiter = Arc::new(RateLimiter::new(config.requests_per_second, config.burst)?);
        let client = ProbeClient::new(Arc::clone(&target), &config.client_settings())?;
        let store = if config.download {
            Some(Arc::new(ContentStore::open(&config.output_directory)?))
        } else {
            None
        };

        debug!(
            concurrency = config.concurrency,
            requests_per_second = config.requests_per_second,
            burst = config.burst,
            max_retries = config.max_retries,
            download = config.download,
            "creating fuzz engine"
        );

        Ok(Self {
            target,
            extensions: config.extensions,
            client,
            rate_limiter,
            retry_policy: RetryPolicy::with_max_retries(config.max_retries),
            filter,
            store,
            progress: Arc::new(ProgressAggregator::new()),
            semaphore: Arc::new(Semaphore::new(config.concurrency)),
            concurrency: config.concurrency,
        })
    }

    /// Builds a candidate generator for this engine's target and extensions.
    pub fn generator<I, S>(&self, words: I) -> CandidateGenerator
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        CandidateGenerator::new(Arc::clone(&self.target), words, &self.extensions)
    }

    /// Progress accessor for an external display; poll `snapshot()` on any cadence.
    #[must_use]
    pub fn progress(&self) -> Arc<ProgressAggregator> {
        Arc::clone(&self.progress)
    }

    /// Returns the configured concurrency limit.
    #[must_use]
    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// The content store, when downloads are enabled.
    #[must_use]
    pub fn store(&self) -> Option<&ContentStore> {
        self.store.as_deref()
    }

    /// Runs every candidate of `generator` to completion or until `cancel` fires.
    ///
    /// Each finalized candidate is sent to `sink`, then `sink.run_complete`
    /// fires exactly once with the final counters.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::SemaphoreClosed`] if the semaphore is closed.
    /// Per-candidate failures never fail the run.
    #[instrument(skip_all, fields(target = %self.target.base_url(), concurrency = self.concurrency))]
    pub async fn run(
        &self,
        generator: &CandidateGenerator,
        sink: Arc<dyn ResultSink>,
        cancel: CancelToken,
    ) -> Result<RunSummary, EngineError> {
        self.progress.reset();
        let ctx = Arc::new(TaskContext {
            client: self.client.clone(),
            rate_limiter: Arc::clone(&self.rate_limiter),
            retry_policy: self.retry_policy.clone(),
            filter: self.filter.clone(),
            store: self.store.clone(),
            progress: Arc::clone(&self.progress),
            sink: Arc::clone(&sink),
            cancel: cancel.clone(),
        });

        let mut handles: Vec<(usize, JoinHandle<()>)> = Vec::new();
        let mut candidates = generator.iter();
        let mut skipped_reported = 0;

        info!(
            max_candidates = generator.max_candidates(),
            "starting fuzz run"
        );

        loop {
            if cancel.is_cancelled() {
                break;
            }
            drain_finished_tasks(&mut handles, &self.progress).await;

            // Race the permit against cancellation so a full pool does not
            // delay shutdown.
            let permit = tokio::select! {
                biased;
                () = cancel.cancelled() => None,
                result = Arc::clone(&self.semaphore).acquire_owned() => {
                    Some(result.map_err(|_| EngineError::SemaphoreClosed)?)
                }
            };
            let Some(permit) = permit else {
                break;
            };
            if cancel.is_cancelled() {
                break;
            }

            let next = candidates.next();
            if candidates.skipped() > skipped_reported {
                let delta = candidates.skipped() - skipped_reported;
                self.progress
                    .record(ProgressEvent::Skipped(u64::try_from(delta).unwrap_or(u64::MAX)));
                skipped_reported = candidates.skipped();
            }
            let Some(candidate) = next else {
                break;
            };

            self.progress.record(ProgressEvent::Dispatched);
            let index = candidate.index;
            let ctx = Arc::clone(&ctx);
            handles.push((
                index,
                tokio::spawn(async move {
                    // Permit is dropped when this block exits (RAII)
                    let _permit = permit;
                    task::process_candidate(&ctx, candidate).await;
                }),
            ));
        }

        if cancel.is_cancelled() {
            info!(in_flight = handles.len(), "run cancelled, no new candidates will be dispatched");
        }
        debug!(task_count = handles.len(), "waiting for in-flight probes");

        let mut deadline = None;
        for (index, handle) in handles {
            await_task(index, handle, &cancel, &mut deadline, &self.progress).await;
        }

        self.progress.mark_finished();
        let stats = self.progress.snapshot();
        let outcome = if cancel.is_cancelled() {
            RunOutcome::Cancelled
        } else {
            RunOutcome::Completed
        };
        let summary = RunSummary { outcome, stats };

        info!(
            outcome = ?summary.outcome,
            sent = summary.stats.sent,
            hits = summary.stats.hits,
            misses = summary.stats.misses,
            errors = summary.stats.errors,
            cancelled = summary.stats.cancelled,
            abandoned = summary.stats.abandoned,
            elapsed_ms = summary.stats.elapsed.as_millis(),
            "fuzz run complete"
        );
        sink.run_complete(&summary).await;
        Ok(summary)
    }
}

/// Waits for one task. Once cancellation is seen, a shared grace deadline is
/// set and tasks still running past it are aborted.
async fn await_task(
    index: usize,
    mut handle: JoinHandle<()>,
    cancel: &CancelToken,
    deadline: &mut Option<Instant>,
    progress: &ProgressAggregator,
) {
    if deadline.is_none() {
        tokio::select! {
            biased;
            result = &mut handle => {
                record_join_result(index, result, progress);
                return;
            }
            () = cancel.cancelled() => {
                *deadline = Some(Instant::now() + CANCEL_GRACE_PERIOD);
            }
        }
    }

    let Some(limit) = *deadline else {
        return;
    };
    match tokio::time::timeout_at(limit, &mut handle).await {
        Ok(result) => record_join_result(index, result, progress),
        Err(_) => {
            handle.abort();
            record_join_result(index, handle.await, progress);
        }
    }
}

async fn drain_finished_tasks(
    handles: &mut Vec<(usize, JoinHandle<()>)>,
    progress: &ProgressAggregator,
) {
    let mut idx = 0;
    while idx < handles.len() {
        if handles[idx].1.is_finished() {
            let (index, handle) = handles.swap_remove(idx);
            record_join_result(index, handle.await, progress);
        } else {
            idx += 1;
        }
    }
}

fn record_join_result(index: usize, result: Result<(), JoinError>, progress: &ProgressAggregator) {
    match result {
        Ok(()) => {}
        Err(error) if error.is_cancelled() => {
            debug!(candidate = index, "probe task aborted after grace period");
            progress.record(ProgressEvent::Abandoned);
        }
        Err(error) => {
            warn!(candidate = index, error = %error, "probe task panicked");
            progress.record(ProgressEvent::Abandoned);
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn config() -> FuzzConfig {
        let mut config = FuzzConfig::new("http://127.0.0.1:9");
        config.download = false;
        config
    }

    #[test]
    fn test_engine_new_valid_concurrency() {
        for value in [MIN_CONCURRENCY, DEFAULT_CONCURRENCY, MAX_CONCURRENCY] {
            let mut config = config();
            config.concurrency = value;
            let engine = FuzzEngine::new(config).unwrap();
            assert_eq!(engine.concurrency(), value);
        }
    }

    #[test]
    fn test_engine_new_invalid_concurrency() {
        for value in [0, 101] {
            let mut config = config();
            config.concurrency = value;
            assert!(matches!(
                FuzzEngine::new(config),
                Err(ConfigError::InvalidConcurrency { .. })
            ));
        }
    }

    #[test]
    fn test_engine_new_rejects_unwritable_output_directory() {
        let temp = tempfile::TempDir::new().unwrap();
        let blocker = temp.path().join("file");
        std::fs::write(&blocker, b"x").unwrap();

        let mut config = config();
        config.download = true;
        config.output_directory = blocker.join("out");
        assert!(matches!(
            FuzzEngine::new(config),
            Err(ConfigError::OutputDirectory { .. })
        ));
    }

    #[test]
    fn test_engine_without_download_has_no_store() {
        let engine = FuzzEngine::new(config()).unwrap();
        assert!(engine.store().is_none());
    }

    #[test]
    fn test_generator_uses_configured_extensions() {
        let mut config = config();
        config.extensions = vec!["php".to_string()];
        let engine = FuzzEngine::new(config).unwrap();
        let generator = engine.generator(["admin"]);
        assert_eq!(generator.iter().count(), 2);
    }

    #[test]
    fn test_default_concurrency_constant() {
        assert_eq!(DEFAULT_CONCURRENCY, 10);
    }

    #[tokio::test]
    async fn test_empty_wordlist_completes_immediately() {
        let engine = FuzzEngine::new(config()).unwrap();
        let generator = engine.generator(Vec::<String>::new());
        let sink = Arc::new(crate::fuzz::sink::MemorySink::new());
        let summary = engine
            .run(&generator, sink.clone(), CancelToken::new())
            .await
            .unwrap();
        assert_eq!(summary.outcome, RunOutcome::Completed);
        assert_eq!(summary.stats.sent, 0);
        assert!(summary.stats.finished);
        assert!(sink.reports().is_empty());
        assert!(sink.summary().is_some());
    }

    #[tokio::test]
    async fn test_pre_cancelled_run_sends_nothing() {
        let engine = FuzzEngine::new(config()).unwrap();
        let generator = engine.generator(["a", "b", "c"]);
        let cancel = CancelToken::new();
        cancel.cancel();
        let summary = engine
            .run(&generator, Arc::new(crate::fuzz::sink::NullSink), cancel)
            .await
            .unwrap();
        assert_eq!(summary.outcome, RunOutcome::Cancelled);
        assert_eq!(summary.stats.dispatched, 0);
        assert_eq!(summary.stats.sent, 0);
    }
}
