//! Result sink: where finalized probe results and the run-complete event go.

use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use serde::Serialize;

use super::classifier::{MatchRule, Verdict, VerdictKind};
use super::progress::RunStats;
use super::store::DownloadRecord;
use super::target::HttpMethod;

/// One finalized candidate, as reported to a [`ResultSink`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProbeReport {
    /// Resolved request URL.
    pub url: String,
    /// Probe method.
    pub method: HttpMethod,
    /// Wordlist entry behind the URL.
    pub word: String,
    /// Hit, miss or error.
    pub verdict: VerdictKind,
    /// The classifier rule that decided.
    pub rule: MatchRule,
    /// Deciding status code, if a response was received.
    pub status: Option<u16>,
    /// Time to response headers of the final attempt, in milliseconds.
    pub elapsed_ms: u64,
    /// Attempts made, including the first.
    pub attempts: u32,
    /// Transport failure detail for errors.
    pub error: Option<String>,
    /// Saved body, for hits when downloads are enabled.
    pub download: Option<DownloadRecord>,
}

impl ProbeReport {
    /// The verdict this report carries.
    #[must_use]
    pub fn verdict(&self) -> Verdict {
        Verdict {
            kind: self.verdict,
            status: self.status,
            rule: self.rule,
        }
    }
}

/// How a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunOutcome {
    /// Every candidate was finalized.
    Completed,
    /// Cancellation stopped the run early.
    Cancelled,
}

/// Payload of the run-complete event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    /// How the run ended.
    pub outcome: RunOutcome,
    /// Final counters.
    pub stats: RunStats,
}

impl RunSummary {
    /// Whether the run was cut short by cancellation.
    #[must_use]
    pub fn was_cancelled(&self) -> bool {
        self.outcome == RunOutcome::Cancelled
    }
}

/// Consumer of finalized results.
///
/// `record` is called concurrently from worker tasks, once per finalized
/// candidate and in completion order. `run_complete` is called exactly once,
/// after every in-flight task has finished or been abandoned.
#[async_trait]
pub trait ResultSink: Send + Sync {
    /// Receives one finalized result.
    async fn record(&self, report: ProbeReport);

    /// Receives the run-complete event.
    async fn run_complete(&self, _summary: &RunSummary) {}
}

/// Sink that drops everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

#[async_trait]
impl ResultSink for NullSink {
    async fn record(&self, _report: ProbeReport) {}
}

/// Sink that keeps every report in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    reports: Mutex<Vec<ProbeReport>>,
    summary: Mutex<Option<RunSummary>>,
}

impl MemorySink {
    /// Creates an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Reports received so far, in arrival order.
    #[must_use]
    pub fn reports(&self) -> Vec<ProbeReport> {
        self.reports
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// The run-complete payload, once fired.
    #[must_use]
    pub fn summary(&self) -> Option<RunSummary> {
        self.summary
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl ResultSink for MemorySink {
    async fn record(&self, report: ProbeReport) {
        self.reports
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(report);
    }

    async fn run_complete(&self, summary: &RunSummary) {
        *self.summary.lock().unwrap_or_else(PoisonError::into_inner) = Some(summary.clone());
    }
}
