// Terminal rendering for reports, backlog status and classifications

use crossterm::style::{StyledContent, Stylize};

use crate::agent::AgentRole;
use crate::backlog::{Backlog, Story, StoryStatus};
use crate::build::{BuildReport, RunOutcome};
use crate::orchestrator::Classification;

fn status_marker(status: StoryStatus) -> StyledContent<&'static str> {
    match status {
        StoryStatus::Passed => "✓".green().bold(),
        StoryStatus::Failed => "✗".red().bold(),
        StoryStatus::InProgress => "▶".yellow().bold(),
        StoryStatus::Pending => "·".dark_grey(),
    }
}

/// Stories ordered for display: by priority, then list position
pub fn display_order(backlog: &Backlog) -> Vec<&Story> {
    let mut stories: Vec<&Story> = backlog.stories.iter().collect();
    // stable sort keeps list order within a priority
    stories.sort_by_key(|s| s.priority);
    stories
}

pub fn status_lines(backlog: &Backlog) -> Vec<String> {
    let mut lines = Vec::new();
    let title = if backlog.project_name.is_empty() {
        "Backlog".to_string()
    } else {
        backlog.project_name.clone()
    };
    lines.push(format!("{}", title.bold()));
    if !backlog.branch_name.is_empty() {
        lines.push(format!("Branch: {}", backlog.branch_name));
    }
    lines.push(String::new());

    for story in display_order(backlog) {
        let line = format!(
            "  {} {:<10} {:<40} {:<11} attempts: {}",
            status_marker(story.status),
            story.id,
            story.title,
            story.status.as_str(),
            story.attempt_count
        );
        lines.push(line);
        if story.status == StoryStatus::Failed {
            lines.extend(failure_history(&story.failure_reasons));
        }
    }

    let counts = backlog.counts();
    lines.push(String::new());
    lines.push(format!(
        "{} passed, {} failed, {} pending of {}",
        counts.passed,
        counts.failed,
        counts.pending + counts.in_progress,
        counts.total()
    ));
    lines
}

pub fn print_status(backlog: &Backlog) {
    for line in status_lines(backlog) {
        println!("{}", line);
    }
}

/// One indented line per recorded failure, numbered by attempt
fn failure_history(reasons: &[String]) -> Vec<String> {
    reasons
        .iter()
        .enumerate()
        .map(|(i, reason)| format!("      {}. {}", i + 1, reason.as_str().dark_grey()))
        .collect()
}

pub fn report_lines(report: &BuildReport) -> Vec<String> {
    let mut lines = vec![String::new()];
    for story in &report.stories {
        lines.push(format!(
            "  {} {} - {} ({} attempt{})",
            status_marker(story.status),
            story.id,
            story.title,
            story.attempts,
            if story.attempts == 1 { "" } else { "s" }
        ));
        if story.status == StoryStatus::Failed {
            lines.extend(failure_history(&story.failure_reasons));
        }
    }
    lines.push(String::new());

    let headline = match report.outcome {
        RunOutcome::Completed => "Build completed".green().bold(),
        RunOutcome::StalledOut => "Build stalled".red().bold(),
        RunOutcome::Interrupted => "Build interrupted".yellow().bold(),
    };
    lines.push(format!(
        "{}: {} passed, {} failed, {} pending ({} attempts, {} commits)",
        headline, report.passed, report.failed, report.pending, report.attempts, report.commits
    ));
    lines
}

pub fn print_report(report: &BuildReport) {
    for line in report_lines(report) {
        println!("{}", line);
    }
}

pub fn print_classification(classification: &Classification, plan: &[AgentRole]) {
    println!(
        "{} {}",
        "Level".bold(),
        classification.level.to_string().cyan()
    );
    println!("Confidence: {:.0}%", classification.confidence * 100.0);
    println!("Indicators:");
    for indicator in &classification.indicators {
        println!("  - {}", indicator);
    }
    let roles: Vec<&str> = plan.iter().map(|r| r.name()).collect();
    println!("Role plan: {}", roles.join(" → "));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_order_by_priority_then_position() {
        let backlog = Backlog::new(
            "calc",
            vec![
                Story::new("US-003", "C").with_priority(2),
                Story::new("US-001", "A").with_priority(1),
                Story::new("US-002", "B").with_priority(2),
            ],
        );
        let ids: Vec<&str> = display_order(&backlog).iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["US-001", "US-003", "US-002"]);
    }

    #[test]
    fn test_status_lines_show_failure_history() {
        let mut failed = Story::new("US-001", "Add");
        failed.status = StoryStatus::Failed;
        failed.failure_reasons = vec!["old".into(), "Verification failed: wrong sum".into()];
        let backlog = Backlog::new("calc", vec![failed]);

        let text = status_lines(&backlog).join("\n");
        assert!(text.contains("US-001"));
        assert!(text.contains("1. "));
        assert!(text.contains("old"));
        assert!(text.contains("2. "));
        assert!(text.contains("Verification failed: wrong sum"));
        assert!(text.contains("0 passed, 1 failed, 0 pending of 1"));
    }

    #[test]
    fn test_report_lines_list_every_attempt_of_failed_story() {
        let mut failed = Story::new("US-002", "Divide");
        failed.status = StoryStatus::Failed;
        failed.attempt_count = 3;
        failed.failure_reasons = vec!["first".into(), "second".into(), "third".into()];
        let mut passed = Story::new("US-001", "Add");
        passed.status = StoryStatus::Passed;
        passed.attempt_count = 2;
        passed.failure_reasons = vec!["flaky".into()];
        let backlog = Backlog::new("calc", vec![passed, failed]);
        let report = BuildReport::from_backlog(&backlog, 5, 1, RunOutcome::StalledOut);

        let lines = report_lines(&report);
        let text = lines.join("\n");
        for reason in ["first", "second", "third"] {
            assert!(text.contains(reason), "missing {reason}");
        }
        // Passed stories keep their history out of the report
        assert!(!text.contains("flaky"));
        assert!(text.contains("1 passed, 1 failed, 0 pending (5 attempts, 1 commits)"));
    }
}
