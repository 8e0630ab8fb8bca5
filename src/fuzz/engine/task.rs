//! Per-candidate work: rate-limited probe with retry, classification,
//! optional body download and reporting.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::fuzz::cancel::CancelToken;
use crate::fuzz::candidate::Candidate;
use crate::fuzz::classifier::{ProbeOutcome, StatusFilter, Verdict, VerdictKind};
use crate::fuzz::client::ProbeClient;
use crate::fuzz::error::StoreError;
use crate::fuzz::progress::{ProgressAggregator, ProgressEvent};
use crate::fuzz::rate_limiter::RateLimiter;
use crate::fuzz::retry::{FailureType, RetryDecision, RetryPolicy};
use crate::fuzz::sink::{ProbeReport, ResultSink};
use crate::fuzz::store::{ContentStore, DownloadRecord};

const HTTP_TOO_MANY_REQUESTS: u16 = 429;

/// Shared state handed to every spawned probe task.
pub(super) struct TaskContext {
    pub(super) client: ProbeClient,
    pub(super) rate_limiter: Arc<RateLimiter>,
    pub(super) retry_policy: RetryPolicy,
    pub(super) filter: StatusFilter,
    pub(super) store: Option<Arc<ContentStore>>,
    pub(super) progress: Arc<ProgressAggregator>,
    pub(super) sink: Arc<dyn ResultSink>,
    pub(super) cancel: CancelToken,
}

/// What the retry loop produced for one candidate.
struct ProbeAttempts {
    outcome: ProbeOutcome,
    attempts: u32,
    elapsed: Duration,
}

/// Drives one candidate from first request to reported result.
///
/// Candidates still in flight when the run is cancelled are counted as
/// cancelled and never reach the sink.
pub(super) async fn process_candidate(ctx: &TaskContext, candidate: Candidate) {
    let ProbeAttempts {
        outcome,
        attempts,
        elapsed,
    } = probe_with_retry(ctx, &candidate).await;

    let verdict = match ctx.filter.classify(&outcome) {
        Some(verdict) if !ctx.cancel.is_cancelled() => verdict,
        _ => {
            debug!(url = %candidate.url, "discarding in-flight probe after cancel");
            ctx.progress.record(ProgressEvent::Cancelled);
            return;
        }
    };

    let error = match &outcome {
        ProbeOutcome::Transport(error) => Some(error.to_string()),
        _ => None,
    };

    let download = match (verdict.is_hit(), &ctx.store, outcome) {
        (true, Some(store), ProbeOutcome::Response(response)) => {
            let record = if candidate.method.is_bodiless() {
                fetch_and_persist(ctx, store, &candidate).await
            } else {
                store.persist(&candidate.url, response).await
            };
            Some(record)
        }
        _ => None,
    };

    log_verdict(&candidate, &verdict, download.as_ref(), error.as_deref());

    ctx.progress.record(match &download {
        Some(record) => ProgressEvent::HitWithDownload {
            complete: record.is_complete(),
            bytes: record.bytes,
        },
        None => ProgressEvent::Verdict(verdict.kind),
    });
    ctx.sink
        .record(ProbeReport {
            url: candidate.url.to_string(),
            method: candidate.method,
            word: candidate.word,
            verdict: verdict.kind,
            rule: verdict.rule,
            status: verdict.status,
            elapsed_ms: u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
            attempts,
            error,
            download,
        })
        .await;
}

/// Issues the probe, retrying transient failures and 429 responses.
///
/// Every attempt takes a rate-limit token first. A 429 waits for its
/// `Retry-After` when present, otherwise for the policy backoff.
async fn probe_with_retry(ctx: &TaskContext, candidate: &Candidate) -> ProbeAttempts {
    let mut attempt: u32 = 1;
    let mut elapsed = Duration::ZERO;

    loop {
        if !ctx.rate_limiter.acquire(&ctx.cancel).await {
            return cancelled(attempt - 1, elapsed);
        }
        if attempt == 1 {
            ctx.progress.record(ProgressEvent::Sent);
        }

        let result = tokio::select! {
            biased;
            () = ctx.cancel.cancelled() => return cancelled(attempt, elapsed),
            result = ctx.client.probe(candidate) => result,
        };

        let (outcome, failure, retry_after) = match result {
            Ok(response) => {
                elapsed = response.elapsed;
                if response.status == HTTP_TOO_MANY_REQUESTS {
                    let retry_after = response.retry_after;
                    (
                        ProbeOutcome::Response(response),
                        Some(FailureType::RateLimited),
                        retry_after,
                    )
                } else {
                    (ProbeOutcome::Response(response), None, None)
                }
            }
            Err(error) => {
                let failure = FailureType::from(error.kind);
                (ProbeOutcome::Transport(error), Some(failure), None)
            }
        };

        let Some(failure) = failure else {
            return ProbeAttempts {
                outcome,
                attempts: attempt,
                elapsed,
            };
        };

        match ctx.retry_policy.should_retry(failure, attempt) {
            RetryDecision::Retry {
                delay,
                attempt: next_attempt,
            } => {
                let delay = retry_after.unwrap_or(delay);
                debug!(
                    url = %candidate.url,
                    attempt = next_attempt,
                    delay_ms = delay.as_millis(),
                    failure = ?failure,
                    "retrying probe"
                );
                drop(outcome);
                if ctx.cancel.is_cancelled() {
                    return cancelled(attempt, elapsed);
                }
                ctx.progress.record(ProgressEvent::Retry);
                tokio::select! {
                    biased;
                    () = ctx.cancel.cancelled() => return cancelled(attempt, elapsed),
                    () = tokio::time::sleep(delay) => {}
                }
                attempt = next_attempt;
            }
            RetryDecision::DoNotRetry { reason } => {
                debug!(url = %candidate.url, attempt, reason = %reason, "giving up on probe");
                return ProbeAttempts {
                    outcome,
                    attempts: attempt,
                    elapsed,
                };
            }
        }
    }
}

fn cancelled(attempts: u32, elapsed: Duration) -> ProbeAttempts {
    ProbeAttempts {
        outcome: ProbeOutcome::Cancelled,
        attempts,
        elapsed,
    }
}

/// HEAD probes carry no body, so a hit is fetched again with GET.
///
/// The follow-up counts against the rate limit and must itself classify as
/// a hit, otherwise the download is recorded as failed.
async fn fetch_and_persist(
    ctx: &TaskContext,
    store: &ContentStore,
    candidate: &Candidate,
) -> DownloadRecord {
    if !ctx.rate_limiter.acquire(&ctx.cancel).await {
        return store.record_failure(&candidate.url, &StoreError::Cancelled);
    }

    let fetched = tokio::select! {
        biased;
        () = ctx.cancel.cancelled() => Err(StoreError::Cancelled),
        result = ctx.client.fetch(&candidate.url) => result.map_err(StoreError::from),
    };

    match fetched {
        Ok(response) if ctx.filter.classify_status(response.status).is_hit() => {
            store.persist(&candidate.url, response).await
        }
        Ok(response) => store.record_failure(
            &candidate.url,
            &StoreError::FetchStatus {
                url: candidate.url.to_string(),
                status: response.status,
            },
        ),
        Err(error) => {
            warn!(url = %candidate.url, error = %error, "body fetch failed");
            store.record_failure(&candidate.url, &error)
        }
    }
}

fn log_verdict(
    candidate: &Candidate,
    verdict: &Verdict,
    download: Option<&DownloadRecord>,
    error: Option<&str>,
) {
    match verdict.kind {
        VerdictKind::Hit => match download {
            Some(record) if record.is_complete() => info!(
                url = %candidate.url,
                status = ?verdict.status,
                path = %record.path.display(),
                bytes = record.bytes,
                "endpoint found"
            ),
            _ => info!(url = %candidate.url, status = ?verdict.status, "endpoint found"),
        },
        VerdictKind::Miss => {
            debug!(url = %candidate.url, status = ?verdict.status, rule = ?verdict.rule, "miss");
        }
        VerdictKind::Error => {
            warn!(url = %candidate.url, error = error.unwrap_or("unknown"), "probe failed");
        }
    }
}
