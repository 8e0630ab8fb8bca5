//! Progress UI (spinner) for fuzz runs.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use driller_core::{ProgressAggregator, RunStats};
use indicatif::{ProgressBar, ProgressStyle};

const POLL_INTERVAL: Duration = Duration::from_millis(120);

/// Spawns the progress UI (spinner) when requested.
/// Returns (handle, stop) so the caller can signal stop and await the handle.
/// When `use_spinner` is false, returns (None, stop) with stop already true.
pub(crate) fn spawn_progress_ui(
    use_spinner: bool,
    progress: Arc<ProgressAggregator>,
    total: usize,
) -> (Option<tokio::task::JoinHandle<()>>, Arc<AtomicBool>) {
    if !use_spinner {
        return (None, Arc::new(AtomicBool::new(true)));
    }
    let stop = Arc::new(AtomicBool::new(false));
    let handle = spawn_spinner_inner(progress, total, Arc::clone(&stop));
    (Some(handle), stop)
}

fn spawn_spinner_inner(
    progress: Arc<ProgressAggregator>,
    total: usize,
    stop: Arc<AtomicBool>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let spinner = ProgressBar::new_spinner();
        spinner.set_style(
            ProgressStyle::with_template("{spinner} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        spinner.enable_steady_tick(Duration::from_millis(100));

        while !stop.load(Ordering::SeqCst) && !progress.is_finished() {
            spinner.set_message(progress_message(&progress.snapshot(), total));
            tokio::time::sleep(POLL_INTERVAL).await;
        }

        spinner.finish_and_clear();
    })
}

fn progress_message(stats: &RunStats, total: usize) -> String {
    format!(
        "[{}/{}] hits {} · errors {} · in flight {} · {:.1} req/s",
        stats.settled(),
        total,
        stats.hits,
        stats.errors,
        stats.in_flight,
        stats.requests_per_second()
    )
}
