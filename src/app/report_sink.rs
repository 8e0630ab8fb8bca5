//! Result sink for the command-line run: prints results and collects hit URLs.

use std::collections::BTreeSet;
use std::io::Write;
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use driller_core::{ProbeReport, ResultSink, VerdictKind};
use tracing::warn;

/// Prints hits (or every result as JSON lines) to stdout and remembers hit URLs.
#[derive(Debug, Default)]
pub(crate) struct CliSink {
    json: bool,
    hits: Mutex<BTreeSet<String>>,
}

impl CliSink {
    pub(crate) fn new(json: bool) -> Self {
        Self {
            json,
            hits: Mutex::new(BTreeSet::new()),
        }
    }

    /// Hit URLs, sorted.
    pub(crate) fn hits(&self) -> Vec<String> {
        self.hits
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .cloned()
            .collect()
    }

    fn render(&self, report: &ProbeReport) -> Option<String> {
        if self.json {
            return match serde_json::to_string(report) {
                Ok(line) => Some(line),
                Err(error) => {
                    warn!(url = %report.url, error = %error, "failed to serialize result");
                    None
                }
            };
        }
        if report.verdict != VerdictKind::Hit {
            return None;
        }
        let status = report
            .status
            .map_or_else(|| "---".to_string(), |s| s.to_string());
        Some(match &report.download {
            Some(record) if record.is_complete() => {
                format!("{status} {} -> {}", report.url, record.path.display())
            }
            _ => format!("{status} {}", report.url),
        })
    }
}

#[async_trait]
impl ResultSink for CliSink {
    async fn record(&self, report: ProbeReport) {
        if let Some(line) = self.render(&report) {
            let mut stdout = std::io::stdout().lock();
            let _ = writeln!(stdout, "{line}");
        }
        if report.verdict == VerdictKind::Hit {
            self.hits
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .insert(report.url);
        }
    }
}
