// Story backlog - the prd.json data model and its state machine
//
// Stories move Pending → InProgress → {Passed | Pending (retry) | Failed}.
// Passed and Failed are terminal. List order is authoritative: the loop always
// picks the first pending story and never reorders.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

pub mod store;

pub use store::{BacklogStore, JsonBacklogStore};

/// Story execution status
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum StoryStatus {
    Pending,
    InProgress,
    Passed,
    Failed,
}

impl StoryStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, StoryStatus::Passed | StoryStatus::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            StoryStatus::Pending => "pending",
            StoryStatus::InProgress => "in_progress",
            StoryStatus::Passed => "passed",
            StoryStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for StoryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A rejected state change
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("story {story_id}: cannot {action} while {from}")]
pub struct TransitionError {
    pub story_id: String,
    pub from: StoryStatus,
    pub action: &'static str,
}

/// Failures before any story is touched
#[derive(Error, Debug)]
pub enum BacklogLoadError {
    #[error("backlog not found: {0}")]
    NotFound(PathBuf),

    #[error("failed to read backlog {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("backlog {path} is not valid JSON: {source}")]
    Malformed {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("backlog {path} is invalid: {reason}")]
    Invalid { path: PathBuf, reason: String },
}

/// Failure to write the backlog back to disk
#[derive(Error, Debug)]
pub enum PersistError {
    #[error("failed to serialize backlog: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("failed to write backlog {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// A single user story
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "StoryRecord", into = "StoryRecord")]
pub struct Story {
    pub id: String,
    pub title: String,
    pub description: String,
    pub acceptance_criteria: Vec<String>,
    /// Display only; list order decides what runs next
    pub priority: i64,
    pub status: StoryStatus,
    pub attempt_count: u32,
    /// Append-only
    pub failure_reasons: Vec<String>,
    pub notes: Option<String>,
    /// Fields this version does not know about, written back untouched
    pub extra: Map<String, Value>,
}

/// On-disk shape of a story. `status` may be absent in hand-written files,
/// in which case it is derived from `passes`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoryRecord {
    id: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    acceptance_criteria: Vec<String>,
    #[serde(default)]
    priority: i64,
    #[serde(default)]
    passes: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    status: Option<StoryStatus>,
    #[serde(default)]
    attempt_count: u32,
    #[serde(default)]
    failure_reasons: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    notes: Option<String>,
    #[serde(flatten)]
    extra: Map<String, Value>,
}

impl From<StoryRecord> for Story {
    fn from(r: StoryRecord) -> Self {
        let status = r.status.unwrap_or(if r.passes {
            StoryStatus::Passed
        } else {
            StoryStatus::Pending
        });
        Self {
            id: r.id,
            title: r.title,
            description: r.description,
            acceptance_criteria: r.acceptance_criteria,
            priority: r.priority,
            status,
            attempt_count: r.attempt_count,
            failure_reasons: r.failure_reasons,
            notes: r.notes,
            extra: r.extra,
        }
    }
}

impl From<Story> for StoryRecord {
    fn from(s: Story) -> Self {
        Self {
            passes: s.status == StoryStatus::Passed,
            status: Some(s.status),
            id: s.id,
            title: s.title,
            description: s.description,
            acceptance_criteria: s.acceptance_criteria,
            priority: s.priority,
            attempt_count: s.attempt_count,
            failure_reasons: s.failure_reasons,
            notes: s.notes,
            extra: s.extra,
        }
    }
}

impl Story {
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            description: String::new(),
            acceptance_criteria: Vec::new(),
            priority: 0,
            status: StoryStatus::Pending,
            attempt_count: 0,
            failure_reasons: Vec::new(),
            notes: None,
            extra: Map::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_criteria<I, S>(mut self, criteria: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.acceptance_criteria = criteria.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_priority(mut self, priority: i64) -> Self {
        self.priority = priority;
        self
    }

    /// `id: title`, used in logs and commit messages
    pub fn label(&self) -> String {
        format!("{}: {}", self.id, self.title)
    }

    fn reject(&self, action: &'static str) -> TransitionError {
        TransitionError {
            story_id: self.id.clone(),
            from: self.status,
            action,
        }
    }

    /// Pending → InProgress
    pub fn start(&mut self) -> Result<(), TransitionError> {
        if self.status != StoryStatus::Pending {
            return Err(self.reject("start"));
        }
        self.status = StoryStatus::InProgress;
        Ok(())
    }

    /// InProgress → Passed. The passing cycle counts as an attempt.
    pub fn record_pass(&mut self) -> Result<(), TransitionError> {
        if self.status != StoryStatus::InProgress {
            return Err(self.reject("pass"));
        }
        self.attempt_count += 1;
        self.status = StoryStatus::Passed;
        Ok(())
    }

    /// InProgress → Pending, or Failed once `max_attempts` cycles are spent.
    ///
    /// Returns the new status.
    pub fn record_failure(
        &mut self,
        reason: impl Into<String>,
        max_attempts: u32,
    ) -> Result<StoryStatus, TransitionError> {
        if self.status != StoryStatus::InProgress {
            return Err(self.reject("record a failure"));
        }
        self.attempt_count += 1;
        self.failure_reasons.push(reason.into());
        self.status = if self.attempt_count >= max_attempts {
            StoryStatus::Failed
        } else {
            StoryStatus::Pending
        };
        Ok(self.status)
    }

    /// InProgress → Pending without consuming an attempt (crash recovery)
    pub fn reset_interrupted(&mut self) -> Result<(), TransitionError> {
        if self.status != StoryStatus::InProgress {
            return Err(self.reject("reset"));
        }
        self.status = StoryStatus::Pending;
        Ok(())
    }

    /// Pending → Failed for a story whose budget is already spent, e.g. after
    /// lowering `max_attempts` between runs. Consumes no attempt.
    pub fn fail_exhausted(&mut self, max_attempts: u32) -> Result<(), TransitionError> {
        if self.status != StoryStatus::Pending || self.attempt_count < max_attempts {
            return Err(self.reject("mark exhausted"));
        }
        self.failure_reasons.push(format!(
            "Attempt budget exhausted ({} of {} attempts used)",
            self.attempt_count, max_attempts
        ));
        self.status = StoryStatus::Failed;
        Ok(())
    }
}

/// Per-status totals
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatusCounts {
    pub pending: usize,
    pub in_progress: usize,
    pub passed: usize,
    pub failed: usize,
}

impl StatusCounts {
    pub fn total(&self) -> usize {
        self.pending + self.in_progress + self.passed + self.failed
    }
}

/// The whole prd.json document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Backlog {
    #[serde(rename = "project", default)]
    pub project_name: String,
    #[serde(default)]
    pub branch_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(rename = "userStories")]
    pub stories: Vec<Story>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Backlog {
    pub fn new(project_name: impl Into<String>, stories: Vec<Story>) -> Self {
        Self {
            project_name: project_name.into(),
            branch_name: String::new(),
            description: None,
            stories,
            extra: Map::new(),
        }
    }

    /// Index of the first pending story in list order
    pub fn next_pending(&self) -> Option<usize> {
        self.stories
            .iter()
            .position(|s| s.status == StoryStatus::Pending)
    }

    pub fn find(&self, id: &str) -> Option<&Story> {
        self.stories.iter().find(|s| s.id == id)
    }

    pub fn counts(&self) -> StatusCounts {
        let mut counts = StatusCounts::default();
        for story in &self.stories {
            match story.status {
                StoryStatus::Pending => counts.pending += 1,
                StoryStatus::InProgress => counts.in_progress += 1,
                StoryStatus::Passed => counts.passed += 1,
                StoryStatus::Failed => counts.failed += 1,
            }
        }
        counts
    }

    /// Every story reached a terminal state
    pub fn is_finished(&self) -> bool {
        self.stories.iter().all(|s| s.status.is_terminal())
    }

    /// Reset stories left in progress by an interrupted run.
    ///
    /// Returns the ids that were reset.
    pub fn recover_interrupted(&mut self) -> Vec<String> {
        let mut reset = Vec::new();
        for story in &mut self.stories {
            if story.reset_interrupted().is_ok() {
                reset.push(story.id.clone());
            }
        }
        reset
    }

    /// Fail pending stories that have no attempts left under `max_attempts`.
    ///
    /// Returns the ids that were failed.
    pub fn fail_exhausted(&mut self, max_attempts: u32) -> Vec<String> {
        let mut failed = Vec::new();
        for story in &mut self.stories {
            if story.fail_exhausted(max_attempts).is_ok() {
                failed.push(story.id.clone());
            }
        }
        failed
    }

    /// Structural checks serde cannot express
    pub fn validate(&self) -> Result<(), String> {
        let mut seen = std::collections::HashSet::new();
        for (i, story) in self.stories.iter().enumerate() {
            if story.id.trim().is_empty() {
                return Err(format!("story #{} has an empty id", i + 1));
            }
            if !seen.insert(story.id.as_str()) {
                return Err(format!("duplicate story id '{}'", story.id));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn story(id: &str) -> Story {
        Story::new(id, format!("Story {id}"))
    }

    // ── transitions ────────────────────────────────────────────────────────────

    #[test]
    fn test_pass_cycle() {
        let mut s = story("US-001");
        s.start().unwrap();
        assert_eq!(s.status, StoryStatus::InProgress);
        s.record_pass().unwrap();
        assert_eq!(s.status, StoryStatus::Passed);
        assert_eq!(s.attempt_count, 1);
    }

    #[test]
    fn test_failure_returns_to_pending_until_bound() {
        let mut s = story("US-001");
        for expected_attempts in 1..3 {
            s.start().unwrap();
            let next = s.record_failure("boom", 3).unwrap();
            assert_eq!(next, StoryStatus::Pending);
            assert_eq!(s.attempt_count, expected_attempts);
        }
        s.start().unwrap();
        assert_eq!(s.record_failure("boom", 3).unwrap(), StoryStatus::Failed);
        assert_eq!(s.attempt_count, 3);
        assert_eq!(s.failure_reasons, vec!["boom", "boom", "boom"]);
    }

    #[test]
    fn test_terminal_states_reject_everything() {
        let mut passed = story("a");
        passed.start().unwrap();
        passed.record_pass().unwrap();
        assert!(passed.start().is_err());
        assert!(passed.record_pass().is_err());
        assert!(passed.record_failure("x", 3).is_err());
        assert!(passed.reset_interrupted().is_err());

        let mut failed = story("b");
        failed.start().unwrap();
        failed.record_failure("x", 1).unwrap();
        assert_eq!(failed.status, StoryStatus::Failed);
        let err = failed.start().unwrap_err();
        assert_eq!(err.from, StoryStatus::Failed);
        assert_eq!(err.to_string(), "story b: cannot start while failed");
    }

    #[test]
    fn test_cannot_pass_without_starting() {
        let mut s = story("a");
        assert!(s.record_pass().is_err());
        assert_eq!(s.attempt_count, 0);
    }

    // ── selection ──────────────────────────────────────────────────────────────

    #[test]
    fn test_next_pending_is_list_order_not_priority() {
        let mut backlog = Backlog::new(
            "demo",
            vec![
                story("A").with_priority(5),
                story("B").with_priority(1),
            ],
        );
        assert_eq!(backlog.next_pending(), Some(0));
        backlog.stories[0].start().unwrap();
        assert_eq!(backlog.next_pending(), Some(1));
    }

    #[test]
    fn test_recover_interrupted() {
        let mut backlog = Backlog::new("demo", vec![story("A"), story("B")]);
        backlog.stories[1].start().unwrap();
        assert_eq!(backlog.recover_interrupted(), vec!["B".to_string()]);
        assert_eq!(backlog.counts().pending, 2);
        assert_eq!(backlog.stories[1].attempt_count, 0);
    }

    #[test]
    fn test_fail_exhausted_only_touches_spent_pending_stories() {
        let mut spent = story("A");
        spent.attempt_count = 3;
        let mut fresh = story("B");
        fresh.attempt_count = 2;
        let mut done = story("C");
        done.attempt_count = 3;
        done.status = StoryStatus::Passed;
        let mut backlog = Backlog::new("demo", vec![spent, fresh, done]);

        assert_eq!(backlog.fail_exhausted(3), vec!["A".to_string()]);
        assert_eq!(backlog.stories[0].status, StoryStatus::Failed);
        assert_eq!(backlog.stories[0].attempt_count, 3);
        assert!(backlog.stories[0].failure_reasons[0].contains("budget exhausted"));
        assert_eq!(backlog.stories[1].status, StoryStatus::Pending);
        assert_eq!(backlog.stories[2].status, StoryStatus::Passed);
    }

    #[test]
    fn test_validate_duplicate_ids() {
        let backlog = Backlog::new("demo", vec![story("A"), story("A")]);
        assert!(backlog.validate().unwrap_err().contains("duplicate"));
    }

    // ── serialisation ──────────────────────────────────────────────────────────

    #[test]
    fn test_status_derived_from_passes() {
        let json = r#"{
            "project": "calc",
            "branchName": "feature/calc",
            "userStories": [
                {"id": "US-001", "title": "Add", "description": "d",
                 "acceptanceCriteria": ["adds"], "priority": 1, "passes": true},
                {"id": "US-002", "title": "Sub", "description": "d",
                 "acceptanceCriteria": [], "priority": 2, "passes": false}
            ]
        }"#;
        let backlog: Backlog = serde_json::from_str(json).unwrap();
        assert_eq!(backlog.project_name, "calc");
        assert_eq!(backlog.branch_name, "feature/calc");
        assert_eq!(backlog.stories[0].status, StoryStatus::Passed);
        assert_eq!(backlog.stories[1].status, StoryStatus::Pending);
    }

    #[test]
    fn test_explicit_status_wins_over_passes() {
        let json = r#"{"project": "p", "userStories": [
            {"id": "US-001", "passes": false, "status": "failed", "attemptCount": 3,
             "failureReasons": ["a", "b", "c"]}
        ]}"#;
        let backlog: Backlog = serde_json::from_str(json).unwrap();
        let s = &backlog.stories[0];
        assert_eq!(s.status, StoryStatus::Failed);
        assert_eq!(s.attempt_count, 3);
        assert_eq!(s.failure_reasons.len(), 3);
    }

    #[test]
    fn test_unknown_fields_survive_round_trip() {
        let json = r#"{"project": "p", "owner": "team-a", "userStories": [
            {"id": "US-001", "title": "t", "notes": "careful", "estimate": 3,
             "labels": ["ui"]}
        ]}"#;
        let backlog: Backlog = serde_json::from_str(json).unwrap();
        let out = serde_json::to_value(&backlog).unwrap();

        assert_eq!(out["owner"], "team-a");
        let s = &out["userStories"][0];
        assert_eq!(s["estimate"], 3);
        assert_eq!(s["labels"][0], "ui");
        assert_eq!(s["notes"], "careful");
        assert_eq!(s["status"], "pending");
        assert_eq!(s["passes"], false);
        assert_eq!(s["attemptCount"], 0);
    }

    #[test]
    fn test_passes_mirrors_status_on_write() {
        let mut s = story("US-001");
        s.start().unwrap();
        s.record_pass().unwrap();
        let v = serde_json::to_value(&s).unwrap();
        assert_eq!(v["passes"], true);
        assert_eq!(v["status"], "passed");
        assert_eq!(v["acceptanceCriteria"], serde_json::json!([]));
    }
}
