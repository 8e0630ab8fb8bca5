use std::fs;
use std::io::{self, IsTerminal};
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::Ordering;

use anyhow::{Context, Result};
use clap::Parser;
use driller_core::{CancelToken, FuzzEngine, RunSummary, load_wordlist};
use tracing::{debug, info, warn};

use crate::ProcessExit;
use crate::app::report_sink::CliSink;
use crate::app::{config_manager, exit_handler, progress_manager, terminal};
use crate::cli::Args;

pub(crate) async fn run_driller() -> Result<ProcessExit> {
    // Parse CLI arguments first (before tracing, so --help works without logs)
    let args = Args::parse();
    let resolved = config_manager::resolve_config(&args)?;
    terminal::init_tracing(resolved.log_level);

    debug!(?args, "CLI arguments parsed");
    info!(target_url = %resolved.fuzz.target_url, "Driller starting");

    let words = load_wordlist(&resolved.wordlist, resolved.include_common_paths).with_context(
        || format!("Failed to read wordlist '{}'", resolved.wordlist.display()),
    )?;

    let engine = FuzzEngine::new(resolved.fuzz.clone()).context("Invalid configuration")?;
    let generator = engine.generator(words);
    info!(
        entries = generator.word_count(),
        candidates = generator.max_candidates(),
        concurrency = engine.concurrency(),
        "Starting scan"
    );

    let cancel = CancelToken::new();
    let cancel_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, stopping after in-flight requests");
            cancel_signal.cancel();
        }
    });

    let use_spinner = terminal::should_use_spinner(
        io::stderr().is_terminal(),
        resolved.quiet,
        terminal::is_dumb_terminal(),
    );
    let (progress_handle, progress_stop) = progress_manager::spawn_progress_ui(
        use_spinner,
        engine.progress(),
        generator.max_candidates(),
    );

    let sink = Arc::new(CliSink::new(resolved.json));
    let summary = engine.run(&generator, sink.clone(), cancel).await?;

    progress_stop.store(true, Ordering::SeqCst);
    if let Some(handle) = progress_handle {
        let _ = handle.await;
    }

    write_endpoints_file(&resolved.endpoints_file, &sink.hits())?;
    if !resolved.quiet {
        print_completion_summary(&summary, engine.store().map(|s| s.root()));
    }

    Ok(exit_handler::determine_exit_outcome(&summary))
}

/// Writes hit URLs, one per line. Nothing is written when there are no hits.
fn write_endpoints_file(path: &Path, hits: &[String]) -> Result<()> {
    if hits.is_empty() {
        warn!("No endpoints discovered");
        return Ok(());
    }
    let mut contents = hits.join("\n");
    contents.push('\n');
    fs::write(path, contents)
        .with_context(|| format!("Failed to write endpoints file '{}'", path.display()))?;
    info!(path = %path.display(), count = hits.len(), "Saved discovered endpoints");
    Ok(())
}

fn print_completion_summary(summary: &RunSummary, output_dir: Option<&Path>) {
    let stats = &summary.stats;
    eprintln!();
    if summary.was_cancelled() {
        eprintln!("Scan interrupted after {:.1}s", stats.elapsed.as_secs_f64());
    } else {
        eprintln!("Scan finished in {:.1}s", stats.elapsed.as_secs_f64());
    }
    eprintln!(
        "  requests: {} sent, {} retried ({:.1} req/s)",
        stats.sent,
        stats.retries,
        stats.requests_per_second()
    );
    eprintln!(
        "  results:  {} hits, {} misses, {} errors",
        stats.hits, stats.misses, stats.errors
    );
    if stats.skipped > 0 {
        eprintln!("  skipped:  {} malformed wordlist entries", stats.skipped);
    }
    if stats.cancelled > 0 || stats.abandoned > 0 {
        eprintln!(
            "  stopped:  {} cancelled, {} abandoned",
            stats.cancelled, stats.abandoned
        );
    }
    if let Some(dir) = output_dir
        && (stats.downloads_completed > 0 || stats.downloads_failed > 0)
    {
        eprintln!(
            "  saved:    {} files ({} bytes) to {}, {} failed",
            stats.downloads_completed,
            stats.bytes_downloaded,
            dir.display(),
            stats.downloads_failed
        );
    }
}

#[cfg(test)]
mod tests {
    use super::write_endpoints_file;
    use tempfile::TempDir;

    #[test]
    fn test_endpoints_file_is_sorted_lines() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("endpoints.txt");
        write_endpoints_file(&path, &["http://t/a".to_string(), "http://t/b".to_string()])
            .unwrap();
        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            "http://t/a\nhttp://t/b\n"
        );
    }

    #[test]
    fn test_no_hits_writes_nothing() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("endpoints.txt");
        write_endpoints_file(&path, &[]).unwrap();
        assert!(!path.exists());
    }
}
