// Build report - what a run did, for the CLI and the activity log

use serde::Serialize;
use std::fmt;

use crate::backlog::{Backlog, StoryStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunOutcome {
    /// No pending stories remain and none failed
    Completed,
    /// No pending stories remain but at least one failed
    StalledOut,
    /// Stopped between stories on request
    Interrupted,
}

impl RunOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunOutcome::Completed => "completed",
            RunOutcome::StalledOut => "stalled_out",
            RunOutcome::Interrupted => "interrupted",
        }
    }

    pub fn is_success(&self) -> bool {
        *self == RunOutcome::Completed
    }
}

impl fmt::Display for RunOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One story's final state in the report
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StorySummary {
    pub id: String,
    pub title: String,
    pub status: StoryStatus,
    pub attempts: u32,
    /// Every recorded failure, oldest first
    pub failure_reasons: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BuildReport {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    /// Pending or in progress
    pub pending: usize,
    /// Implement+verify cycles consumed during this run
    pub attempts: u32,
    pub commits: usize,
    pub outcome: RunOutcome,
    pub stories: Vec<StorySummary>,
}

impl BuildReport {
    pub fn from_backlog(backlog: &Backlog, attempts: u32, commits: usize, outcome: RunOutcome) -> Self {
        let counts = backlog.counts();
        Self {
            total: counts.total(),
            passed: counts.passed,
            failed: counts.failed,
            pending: counts.pending + counts.in_progress,
            attempts,
            commits,
            outcome,
            stories: backlog
                .stories
                .iter()
                .map(|s| StorySummary {
                    id: s.id.clone(),
                    title: s.title.clone(),
                    status: s.status,
                    attempts: s.attempt_count,
                    failure_reasons: s.failure_reasons.clone(),
                })
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backlog::Story;

    #[test]
    fn test_from_backlog_counts() {
        let mut passed = Story::new("US-001", "A");
        passed.status = StoryStatus::Passed;
        passed.attempt_count = 1;
        let mut failed = Story::new("US-002", "B");
        failed.status = StoryStatus::Failed;
        failed.attempt_count = 3;
        failed.failure_reasons = vec!["first".into(), "last".into()];
        let pending = Story::new("US-003", "C");

        let backlog = Backlog::new("calc", vec![passed, failed, pending]);
        let report = BuildReport::from_backlog(&backlog, 4, 1, RunOutcome::Interrupted);

        assert_eq!(report.total, 3);
        assert_eq!(report.passed, 1);
        assert_eq!(report.failed, 1);
        assert_eq!(report.pending, 1);
        assert_eq!(report.stories[1].failure_reasons, vec!["first", "last"]);
        assert!(!report.outcome.is_success());
    }

    #[test]
    fn test_outcome_display() {
        assert_eq!(RunOutcome::StalledOut.to_string(), "stalled_out");
        assert!(RunOutcome::Completed.is_success());
    }
}
