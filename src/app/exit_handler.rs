//! Exit code logic for the driller process.
//!
//! Single responsibility: map the run outcome to the process exit outcome.

use driller_core::RunSummary;

use crate::ProcessExit;

/// Determines the process exit outcome from a finished run.
pub(crate) fn determine_exit_outcome(summary: &RunSummary) -> ProcessExit {
    if summary.was_cancelled() {
        ProcessExit::Cancelled
    } else {
        ProcessExit::Success
    }
}

#[cfg(test)]
mod tests {
    use super::determine_exit_outcome;
    use crate::ProcessExit;
    use driller_core::{ProgressAggregator, RunOutcome, RunSummary};

    fn summary(outcome: RunOutcome) -> RunSummary {
        RunSummary {
            outcome,
            stats: ProgressAggregator::new().snapshot(),
        }
    }

    #[test]
    fn test_exit_outcome_success_when_completed() {
        assert_eq!(
            determine_exit_outcome(&summary(RunOutcome::Completed)),
            ProcessExit::Success
        );
    }

    #[test]
    fn test_exit_outcome_cancelled_when_interrupted() {
        assert_eq!(
            determine_exit_outcome(&summary(RunOutcome::Cancelled)),
            ProcessExit::Cancelled
        );
    }

    #[test]
    fn test_exit_codes() {
        assert_eq!(ProcessExit::Success.code(), 0);
        assert_eq!(ProcessExit::Failure.code(), 1);
        assert_eq!(ProcessExit::Cancelled.code(), 130);
    }
}
