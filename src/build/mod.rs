// Build loop - drives every pending story through implement, verify, commit
//
// One story is in flight at a time. Every status change is persisted before the
// next one happens, and a passed story is committed before the next story
// starts. A stop request is honoured between attempts, never in the middle of
// one.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;

use crate::agent::{AgentRole, RoleContext, RoleFactory};
use crate::backlog::{
    Backlog, BacklogLoadError, BacklogStore, PersistError, Story, StoryStatus, TransitionError,
};
use crate::git::{CommitOutcome, Committer};
use crate::orchestrator::{self, OrchestratorError, PlanOutcome};

pub mod activity_log;
pub mod report;

pub use activity_log::{ActivityLog, BuildEvent};
pub use report::{BuildReport, RunOutcome, StorySummary};

/// Errors that end a run
#[derive(Error, Debug)]
pub enum BuildError {
    #[error(transparent)]
    Load(#[from] BacklogLoadError),

    #[error("failed to persist backlog: {0}")]
    Persist(#[from] PersistError),

    #[error(transparent)]
    Transition(#[from] TransitionError),
}

/// A failed implement+verify cycle. Recorded on the story; never ends the run.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoryFailure {
    /// The story went back to pending and will be retried
    #[error("{story_id} attempt {attempt} failed: {reason}")]
    AttemptFailed {
        story_id: String,
        attempt: u32,
        reason: String,
    },

    /// The attempt bound was reached; the story is now failed
    #[error("{story_id} failed after {attempts} attempts: {reason}")]
    Exhausted {
        story_id: String,
        attempts: u32,
        reason: String,
    },
}

/// Result of one attempt at one story
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptOutcome {
    Passed {
        files_changed: Vec<PathBuf>,
        commit: CommitOutcome,
    },
    Failed(StoryFailure),
}

/// The per-story state machine over a persisted backlog
pub struct BuildLoop {
    store: Arc<dyn BacklogStore>,
    factory: Arc<dyn RoleFactory>,
    committer: Arc<dyn Committer>,
    max_attempts: u32,
    activity: Option<ActivityLog>,
    stop: Arc<AtomicBool>,
}

impl BuildLoop {
    pub fn new(
        store: Arc<dyn BacklogStore>,
        factory: Arc<dyn RoleFactory>,
        committer: Arc<dyn Committer>,
        max_attempts: u32,
    ) -> Self {
        Self {
            store,
            factory,
            committer,
            max_attempts: max_attempts.max(1),
            activity: None,
            stop: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn with_activity_log(mut self, log: ActivityLog) -> Self {
        self.activity = Some(log);
        self
    }

    /// Share a flag that, once set, ends the run before the next attempt
    pub fn with_stop_flag(mut self, stop: Arc<AtomicBool>) -> Self {
        self.stop = stop;
        self
    }

    pub fn stop_flag(&self) -> Arc<AtomicBool> {
        self.stop.clone()
    }

    fn record(&self, event: BuildEvent) {
        if let Some(log) = &self.activity {
            log.record(event);
        }
    }

    /// Run until no pending story remains or a stop is requested.
    ///
    /// Interrupted stories are reset and stories with no attempts left are
    /// failed before the first attempt. The stop flag is checked before every
    /// attempt, so a story waiting for a retry is left `Pending` and resumes on
    /// the next run.
    pub async fn run(&self) -> Result<BuildReport, BuildError> {
        let mut backlog = self.store.load()?;

        let recovered = backlog.recover_interrupted();
        if !recovered.is_empty() {
            tracing::warn!(
                "Reset {} interrupted stor{} to pending: {}",
                recovered.len(),
                if recovered.len() == 1 { "y" } else { "ies" },
                recovered.join(", ")
            );
        }

        let exhausted = backlog.fail_exhausted(self.max_attempts);
        for id in &exhausted {
            tracing::warn!(
                "{} has no attempts left (max {}), marking failed",
                id,
                self.max_attempts
            );
            let attempts = backlog.find(id).map(|s| s.attempt_count).unwrap_or_default();
            self.record(BuildEvent::StoryFailed {
                id: id.clone(),
                attempts,
            });
        }

        if !recovered.is_empty() || !exhausted.is_empty() {
            self.store.save(&backlog)?;
        }

        let counts = backlog.counts();
        tracing::info!(
            "Backlog '{}': {} stories ({} pending, {} passed, {} failed)",
            backlog.project_name,
            counts.total(),
            counts.pending,
            counts.passed,
            counts.failed
        );

        let mut attempts = 0u32;
        let mut commits = 0usize;
        let mut completed_files: Vec<PathBuf> = Vec::new();
        let mut interrupted = false;

        while let Some(index) = backlog.next_pending() {
            if self.stop.load(Ordering::SeqCst) {
                tracing::warn!("Stop requested, ending run before {}", backlog.stories[index].id);
                interrupted = true;
                break;
            }

            attempts += 1;
            match self.run_attempt(&mut backlog, index, &completed_files).await? {
                AttemptOutcome::Passed {
                    files_changed,
                    commit,
                } => {
                    if commit.is_commit() {
                        commits += 1;
                    }
                    for file in files_changed {
                        if !completed_files.contains(&file) {
                            completed_files.push(file);
                        }
                    }
                }
                AttemptOutcome::Failed(failure) => tracing::warn!("{}", failure),
            }
        }

        let outcome = if interrupted {
            RunOutcome::Interrupted
        } else if backlog.counts().failed > 0 {
            RunOutcome::StalledOut
        } else {
            RunOutcome::Completed
        };

        let report = BuildReport::from_backlog(&backlog, attempts, commits, outcome);
        self.record(BuildEvent::RunFinished {
            outcome: outcome.to_string(),
            passed: report.passed,
            failed: report.failed,
            pending: report.pending,
        });
        tracing::info!(
            "Run {}: {} passed, {} failed, {} pending, {} attempts",
            outcome,
            report.passed,
            report.failed,
            report.pending,
            attempts
        );
        Ok(report)
    }

    /// One implement+verify cycle for the story at `index`, including the
    /// persisted transitions on either side and the commit after a pass
    pub async fn run_attempt(
        &self,
        backlog: &mut Backlog,
        index: usize,
        completed_files: &[PathBuf],
    ) -> Result<AttemptOutcome, BuildError> {
        backlog.stories[index].start()?;
        self.store.save(backlog)?;

        let story = backlog.stories[index].clone();
        let attempt = story.attempt_count + 1;
        let classification = orchestrator::classify(&story_text(&story));
        let plan = orchestrator::story_plan(classification.level);

        tracing::info!(
            "▶ {} (attempt {}/{}, level {})",
            story.label(),
            attempt,
            self.max_attempts,
            classification.level
        );
        tracing::debug!("Indicators: {}", classification.indicators.join(", "));
        self.record(BuildEvent::StoryStart {
            id: story.id.clone(),
            title: story.title.clone(),
            attempt,
            level: classification.level.value(),
        });

        let context = RoleContext::new(story)
            .with_project(backlog.project_name.clone(), backlog.description.clone())
            .with_completed_files(completed_files.to_vec());

        let started = Instant::now();
        let result = orchestrator::run_plan(self.factory.as_ref(), &plan, context).await;

        let reason = match result {
            Ok(PlanOutcome::Accepted { implementation, .. }) => {
                return self
                    .pass(backlog, index, implementation.files_changed, started)
                    .await;
            }
            Ok(PlanOutcome::Rejected { verification, .. }) => {
                format!("Verification failed: {}", verification.summary)
            }
            Err(e) => failure_reason(&e),
        };

        self.fail(backlog, index, reason).map(AttemptOutcome::Failed)
    }

    async fn pass(
        &self,
        backlog: &mut Backlog,
        index: usize,
        files_changed: Vec<PathBuf>,
        started: Instant,
    ) -> Result<AttemptOutcome, BuildError> {
        let story = &mut backlog.stories[index];
        story.record_pass()?;
        let story = story.clone();
        self.store.save(backlog)?;

        tracing::info!("✓ {} passed", story.label());
        self.record(BuildEvent::StoryPassed {
            id: story.id.clone(),
            attempts: story.attempt_count,
            duration_s: started.elapsed().as_secs(),
            files: files_changed
                .iter()
                .map(|p| p.display().to_string())
                .collect(),
        });

        // Status is already persisted; nothing the commit does can change it
        let commit = self.committer.commit_story(&story, &files_changed).await;
        match &commit {
            CommitOutcome::Committed { hash, message, .. } => {
                tracing::info!("Committed {}: {}", hash, message);
                self.record(BuildEvent::Commit {
                    id: story.id.clone(),
                    hash: hash.clone(),
                    msg: message.clone(),
                });
            }
            CommitOutcome::NothingToCommit => tracing::info!("Nothing to commit for {}", story.id),
            CommitOutcome::SkippedNotARepo => {}
            CommitOutcome::Failed(e) => tracing::warn!("Commit failed for {}: {}", story.id, e),
        }

        Ok(AttemptOutcome::Passed {
            files_changed,
            commit,
        })
    }

    fn fail(
        &self,
        backlog: &mut Backlog,
        index: usize,
        reason: String,
    ) -> Result<StoryFailure, BuildError> {
        let story = &mut backlog.stories[index];
        let status = story.record_failure(reason.clone(), self.max_attempts)?;
        let (story_id, attempts) = (story.id.clone(), story.attempt_count);
        self.store.save(backlog)?;

        self.record(BuildEvent::AttemptFailed {
            id: story_id.clone(),
            attempt: attempts,
            reason: reason.clone(),
        });

        if status == StoryStatus::Failed {
            tracing::error!("✗ {} failed after {} attempts", story_id, attempts);
            self.record(BuildEvent::StoryFailed {
                id: story_id.clone(),
                attempts,
            });
            Ok(StoryFailure::Exhausted {
                story_id,
                attempts,
                reason,
            })
        } else {
            Ok(StoryFailure::AttemptFailed {
                story_id,
                attempt: attempts,
                reason,
            })
        }
    }
}

/// Text the scale classifier sees for a story
fn story_text(story: &Story) -> String {
    let mut text = format!("{}\n{}", story.title, story.description);
    for criterion in &story.acceptance_criteria {
        text.push('\n');
        text.push_str(criterion);
    }
    text
}

/// Human-readable failure reason for an aborted role sequence
fn failure_reason(error: &OrchestratorError) -> String {
    let OrchestratorError::RoleSequenceAborted { role, source } = error;
    match role {
        AgentRole::Implementer => format!("Implementation failed: {}", source),
        AgentRole::Verifier => format!("Verification error: {}", source),
        other => format!("{} failed: {}", other, source),
    }
}
