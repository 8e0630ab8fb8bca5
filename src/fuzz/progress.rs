//! Run progress accounting.
//!
//! Workers report what happened through [`ProgressAggregator::record`]; a
//! display layer polls [`ProgressAggregator::snapshot`] on its own cadence.
//! All counters sit behind one lock, so a snapshot never sees half of an
//! update (e.g. a verdict counted but still in flight).

use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant, SystemTime};

use serde::Serialize;

use super::classifier::VerdictKind;

/// Point-in-time counters for a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunStats {
    /// Candidates handed to a worker.
    pub dispatched: u64,
    /// Candidates whose first request was issued.
    pub sent: u64,
    /// Candidates dispatched and not yet finalized.
    pub in_flight: u64,
    /// Hit verdicts.
    pub hits: u64,
    /// Miss verdicts.
    pub misses: u64,
    /// Error verdicts.
    pub errors: u64,
    /// Retry attempts across all candidates.
    pub retries: u64,
    /// Malformed wordlist entries skipped by the generator.
    pub skipped: u64,
    /// In-flight candidates discarded because the run was cancelled.
    pub cancelled: u64,
    /// Tasks aborted after the cancel grace period, or that panicked.
    pub abandoned: u64,
    /// Hit bodies saved.
    pub downloads_completed: u64,
    /// Hit bodies that could not be saved.
    pub downloads_failed: u64,
    /// Bytes written by completed downloads.
    pub bytes_downloaded: u64,
    /// Wall-clock start of the run.
    pub started_at: SystemTime,
    /// Time since start (frozen once the run finishes).
    pub elapsed: Duration,
    /// Whether the run-complete event has fired.
    pub finished: bool,
}

impl RunStats {
    /// Candidates with a verdict.
    #[must_use]
    pub fn finalized(&self) -> u64 {
        self.hits + self.misses + self.errors
    }

    /// Candidates that reached a terminal state of any kind.
    #[must_use]
    pub fn settled(&self) -> u64 {
        self.finalized() + self.cancelled + self.abandoned
    }

    /// Average requests per second since start.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn requests_per_second(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 {
            (self.sent + self.retries) as f64 / secs
        } else {
            0.0
        }
    }
}

/// One update to the run counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressEvent {
    /// The generator skipped this many malformed entries.
    Skipped(u64),
    /// A candidate was handed to a worker.
    Dispatched,
    /// A candidate's first request was issued.
    Sent,
    /// A retry attempt is about to be made.
    Retry,
    /// A candidate was finalized with a verdict.
    Verdict(VerdictKind),
    /// An in-flight candidate was discarded after cancellation.
    Cancelled,
    /// A task was aborted or panicked before finalizing.
    Abandoned,
    /// A hit was finalized together with its download attempt. Counts the hit
    /// and the download in one update.
    HitWithDownload {
        /// Whether the body reached its final path.
        complete: bool,
        /// Bytes written.
        bytes: u64,
    },
}

impl RunStats {
    fn finalize(&mut self, kind: VerdictKind) {
        match kind {
            VerdictKind::Hit => self.hits += 1,
            VerdictKind::Miss => self.misses += 1,
            VerdictKind::Error => self.errors += 1,
        }
        self.in_flight = self.in_flight.saturating_sub(1);
    }
}

#[derive(Debug)]
struct Counters {
    stats: RunStats,
    started: Instant,
    finished_at: Option<Instant>,
}

impl Counters {
    fn new() -> Self {
        Self {
            stats: RunStats {
                dispatched: 0,
                sent: 0,
                in_flight: 0,
                hits: 0,
                misses: 0,
                errors: 0,
                retries: 0,
                skipped: 0,
                cancelled: 0,
                abandoned: 0,
                downloads_completed: 0,
                downloads_failed: 0,
                bytes_downloaded: 0,
                started_at: SystemTime::now(),
                elapsed: Duration::ZERO,
                finished: false,
            },
            started: Instant::now(),
            finished_at: None,
        }
    }
}

/// Single synchronized owner of a run's [`RunStats`].
#[derive(Debug)]
pub struct ProgressAggregator {
    inner: Mutex<Counters>,
}

impl Default for ProgressAggregator {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressAggregator {
    /// Creates an aggregator with zeroed counters, started now.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Counters::new()),
        }
    }

    /// Applies one event.
    pub fn record(&self, event: ProgressEvent) {
        let mut counters = self.lock();
        let stats = &mut counters.stats;
        match event {
            ProgressEvent::Skipped(n) => stats.skipped += n,
            ProgressEvent::Dispatched => {
                stats.dispatched += 1;
                stats.in_flight += 1;
            }
            ProgressEvent::Sent => stats.sent += 1,
            ProgressEvent::Retry => stats.retries += 1,
            ProgressEvent::Verdict(kind) => stats.finalize(kind),
            ProgressEvent::Cancelled => {
                stats.cancelled += 1;
                stats.in_flight = stats.in_flight.saturating_sub(1);
            }
            ProgressEvent::Abandoned => {
                stats.abandoned += 1;
                stats.in_flight = stats.in_flight.saturating_sub(1);
            }
            ProgressEvent::HitWithDownload { complete, bytes } => {
                if complete {
                    stats.downloads_completed += 1;
                    stats.bytes_downloaded += bytes;
                } else {
                    stats.downloads_failed += 1;
                }
                stats.finalize(VerdictKind::Hit);
            }
        }
    }

    /// Current counters.
    #[must_use]
    pub fn snapshot(&self) -> RunStats {
        let counters = self.lock();
        let mut stats = counters.stats.clone();
        stats.elapsed = counters
            .finished_at
            .unwrap_or_else(Instant::now)
            .duration_since(counters.started);
        stats
    }

    /// Zeroes every counter and restarts the clock.
    pub fn reset(&self) {
        *self.lock() = Counters::new();
    }

    /// Freezes the clock and marks the run complete.
    pub fn mark_finished(&self) {
        let mut counters = self.lock();
        counters.finished_at.get_or_insert_with(Instant::now);
        counters.stats.finished = true;
    }

    /// Whether [`ProgressAggregator::mark_finished`] was called.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.lock().stats.finished
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Counters> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Arc;

    use super::*;

    #[test]
    fn test_new_is_zeroed() {
        let stats = ProgressAggregator::new().snapshot();
        assert_eq!(stats.sent, 0);
        assert_eq!(stats.in_flight, 0);
        assert_eq!(stats.finalized(), 0);
        assert!(!stats.finished);
    }

    #[test]
    fn test_verdict_moves_candidate_out_of_flight() {
        let progress = ProgressAggregator::new();
        progress.record(ProgressEvent::Dispatched);
        progress.record(ProgressEvent::Dispatched);
        progress.record(ProgressEvent::Sent);
        assert_eq!(progress.snapshot().in_flight, 2);

        progress.record(ProgressEvent::Verdict(VerdictKind::Hit));
        let stats = progress.snapshot();
        assert_eq!(stats.in_flight, 1);
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.sent, 1);
    }

    #[test]
    fn test_hit_with_download_counts_both() {
        let progress = ProgressAggregator::new();
        progress.record(ProgressEvent::Dispatched);
        progress.record(ProgressEvent::Dispatched);
        progress.record(ProgressEvent::HitWithDownload {
            complete: true,
            bytes: 42,
        });
        progress.record(ProgressEvent::HitWithDownload {
            complete: false,
            bytes: 7,
        });
        let stats = progress.snapshot();
        assert_eq!(stats.hits, 2);
        assert_eq!(stats.in_flight, 0);
        assert_eq!(stats.downloads_completed, 1);
        assert_eq!(stats.downloads_failed, 1);
        assert_eq!(stats.bytes_downloaded, 42);
    }

    #[test]
    fn test_concurrent_updates_are_not_lost() {
        let progress = Arc::new(ProgressAggregator::new());
        let mut handles = Vec::new();
        for t in 0..8 {
            let progress = Arc::clone(&progress);
            handles.push(std::thread::spawn(move || {
                for i in 0..250 {
                    progress.record(ProgressEvent::Dispatched);
                    progress.record(ProgressEvent::Sent);
                    let kind = match (t + i) % 3 {
                        0 => VerdictKind::Hit,
                        1 => VerdictKind::Miss,
                        _ => VerdictKind::Error,
                    };
                    progress.record(ProgressEvent::Verdict(kind));
                }
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }

        let stats = progress.snapshot();
        assert_eq!(stats.sent, 2000);
        assert_eq!(stats.finalized(), 2000);
        assert_eq!(stats.in_flight, 0);
    }

    #[test]
    fn test_snapshot_never_sees_torn_update() {
        let progress = Arc::new(ProgressAggregator::new());
        let writer = {
            let progress = Arc::clone(&progress);
            std::thread::spawn(move || {
                for _ in 0..5000 {
                    progress.record(ProgressEvent::Dispatched);
                    progress.record(ProgressEvent::Verdict(VerdictKind::Miss));
                }
            })
        };
        for _ in 0..5000 {
            let stats = progress.snapshot();
            assert_eq!(stats.dispatched, stats.settled() + stats.in_flight);
        }
        writer.join().unwrap();
    }

    #[test]
    fn test_snapshot_never_sees_download_without_its_hit() {
        let progress = Arc::new(ProgressAggregator::new());
        let writer = {
            let progress = Arc::clone(&progress);
            std::thread::spawn(move || {
                for _ in 0..5000 {
                    progress.record(ProgressEvent::Dispatched);
                    progress.record(ProgressEvent::HitWithDownload {
                        complete: true,
                        bytes: 1,
                    });
                }
            })
        };
        for _ in 0..5000 {
            let stats = progress.snapshot();
            assert_eq!(stats.hits, stats.downloads_completed);
            assert_eq!(stats.bytes_downloaded, stats.hits);
        }
        writer.join().unwrap();
    }

    #[test]
    fn test_mark_finished_freezes_elapsed() {
        let progress = ProgressAggregator::new();
        progress.mark_finished();
        let first = progress.snapshot().elapsed;
        std::thread::sleep(Duration::from_millis(5));
        assert_eq!(progress.snapshot().elapsed, first);
        assert!(progress.is_finished());
    }

    #[test]
    fn test_reset_clears_counters() {
        let progress = ProgressAggregator::new();
        progress.record(ProgressEvent::Skipped(3));
        progress.mark_finished();
        progress.reset();
        let stats = progress.snapshot();
        assert_eq!(stats.skipped, 0);
        assert!(!stats.finished);
    }
}
