// Git commit collaborator
//
// Commits the work of a passed story and pushes it when a remote exists.
// Nothing in here can fail a story: every problem becomes a `CommitOutcome`
// that the build loop logs and moves past.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Output;
use std::time::Duration;
use tokio::process::Command;

use crate::backlog::Story;

const GIT_TIMEOUT_SECS: u64 = 60;

/// What happened to the push after a successful commit
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PushOutcome {
    Pushed { remote: String, branch: String },
    SkippedNoRemote,
    Failed(String),
}

/// What happened when committing a story
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommitOutcome {
    Committed {
        hash: String,
        message: String,
        push: PushOutcome,
    },
    NothingToCommit,
    SkippedNotARepo,
    Failed(String),
}

impl CommitOutcome {
    pub fn is_commit(&self) -> bool {
        matches!(self, CommitOutcome::Committed { .. })
    }
}

/// Records a passed story in version control
#[async_trait]
pub trait Committer: Send + Sync {
    /// Stage `files` (everything when empty) and commit them for `story`
    async fn commit_story(&self, story: &Story, files: &[PathBuf]) -> CommitOutcome;
}

/// Conventional commit message for a story
pub fn commit_message(story: &Story) -> String {
    format!("feat: {} - {}", story.id, story.title)
}

/// Shells out to `git` in the project directory
#[derive(Debug, Clone)]
pub struct GitCommitter {
    repo: PathBuf,
    remote: String,
    identity: Option<(String, String)>,
}

/// Result of one git invocation
struct GitRun {
    success: bool,
    stdout: String,
    stderr: String,
}

impl GitCommitter {
    pub fn new(repo: impl Into<PathBuf>) -> Self {
        Self {
            repo: repo.into(),
            remote: "origin".to_string(),
            identity: None,
        }
    }

    pub fn with_remote(mut self, remote: impl Into<String>) -> Self {
        self.remote = remote.into();
        self
    }

    /// Commit as this author instead of the user's git config
    pub fn with_identity(mut self, name: impl Into<String>, email: impl Into<String>) -> Self {
        self.identity = Some((name.into(), email.into()));
        self
    }

    pub fn repo(&self) -> &Path {
        &self.repo
    }

    async fn git(&self, args: &[&str]) -> Result<GitRun, String> {
        let mut cmd = Command::new("git");
        cmd.arg("-C").arg(&self.repo);
        if let Some((name, email)) = &self.identity {
            cmd.arg("-c")
                .arg(format!("user.name={}", name))
                .arg("-c")
                .arg(format!("user.email={}", email));
        }
        cmd.args(args).kill_on_drop(true);

        let output: Output =
            match tokio::time::timeout(Duration::from_secs(GIT_TIMEOUT_SECS), cmd.output()).await {
                Ok(Ok(output)) => output,
                Ok(Err(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                    return Err("git is not installed or not in PATH".to_string())
                }
                Ok(Err(e)) => return Err(format!("git {} failed to start: {}", args.join(" "), e)),
                Err(_) => return Err(format!("git {} timed out", args.join(" "))),
            };

        Ok(GitRun {
            success: output.status.success(),
            stdout: String::from_utf8_lossy(&output.stdout).trim().to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        })
    }

    pub async fn is_repo(&self) -> bool {
        match self.git(&["rev-parse", "--is-inside-work-tree"]).await {
            Ok(run) => run.success && run.stdout.eq_ignore_ascii_case("true"),
            Err(_) => false,
        }
    }

    async fn has_remote(&self) -> bool {
        matches!(self.git(&["remote", "get-url", &self.remote]).await, Ok(run) if run.success)
    }

    async fn push(&self) -> PushOutcome {
        if !self.has_remote().await {
            tracing::warn!("No remote '{}' configured, skipping push", self.remote);
            return PushOutcome::SkippedNoRemote;
        }

        let branch = match self.git(&["rev-parse", "--abbrev-ref", "HEAD"]).await {
            Ok(run) if run.success => run.stdout,
            Ok(run) => return PushOutcome::Failed(format!("could not get branch: {}", run.stderr)),
            Err(e) => return PushOutcome::Failed(e),
        };

        match self.git(&["push", "-u", &self.remote, &branch]).await {
            Ok(run) if run.success => {
                tracing::info!("Pushed to {}/{}", self.remote, branch);
                PushOutcome::Pushed {
                    remote: self.remote.clone(),
                    branch,
                }
            }
            Ok(run) => {
                tracing::warn!("Commit succeeded but push failed: {}", run.stderr);
                PushOutcome::Failed(run.stderr)
            }
            Err(e) => {
                tracing::warn!("Commit succeeded but push failed: {}", e);
                PushOutcome::Failed(e)
            }
        }
    }
}

#[async_trait]
impl Committer for GitCommitter {
    async fn commit_story(&self, story: &Story, files: &[PathBuf]) -> CommitOutcome {
        if !self.is_repo().await {
            tracing::warn!(
                "Not a git repository: {}, skipping auto-commit",
                self.repo.display()
            );
            return CommitOutcome::SkippedNotARepo;
        }

        let file_args: Vec<String> = files
            .iter()
            .map(|f| f.to_string_lossy().into_owned())
            .collect();
        let add_args: Vec<&str> = if file_args.is_empty() {
            vec!["add", "-A"]
        } else {
            ["add", "--"]
                .into_iter()
                .chain(file_args.iter().map(String::as_str))
                .collect()
        };

        match self.git(&add_args).await {
            Ok(run) if run.success => {}
            Ok(run) => return CommitOutcome::Failed(format!("git add failed: {}", run.stderr)),
            Err(e) => return CommitOutcome::Failed(e),
        }

        // exit 0 means the index matches HEAD
        match self.git(&["diff", "--cached", "--quiet"]).await {
            Ok(run) if run.success => {
                tracing::info!("No changes to commit for {}", story.id);
                return CommitOutcome::NothingToCommit;
            }
            Ok(_) => {}
            Err(e) => return CommitOutcome::Failed(e),
        }

        let message = commit_message(story);
        match self.git(&["commit", "-m", &message]).await {
            Ok(run) if run.success => {}
            Ok(run) => {
                if run.stdout.contains("nothing to commit") || run.stderr.contains("nothing to commit")
                {
                    return CommitOutcome::NothingToCommit;
                }
                return CommitOutcome::Failed(format!("git commit failed: {}", run.stderr));
            }
            Err(e) => return CommitOutcome::Failed(e),
        }

        let hash = match self.git(&["log", "-1", "--format=%h"]).await {
            Ok(run) if run.success => run.stdout,
            _ => String::new(),
        };
        tracing::info!("Created commit {}: {}", hash, message);

        let push = self.push().await;
        CommitOutcome::Committed {
            hash,
            message,
            push,
        }
    }
}
