// External checks - typecheck/lint commands run against changed files

use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::process::Command;

use crate::config::{CheckCommand, Settings};

/// Check output is clipped to this many characters in results and prompts
const MAX_CHECK_OUTPUT: usize = 2000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckOutcome {
    Passed,
    Failed { output: String },
    /// Tool missing or nothing to check
    Skipped { reason: String },
    TimedOut,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckResult {
    pub name: String,
    pub blocking: bool,
    pub outcome: CheckOutcome,
}

impl CheckResult {
    /// Whether this result allows verification to pass
    pub fn ok(&self) -> bool {
        match self.outcome {
            CheckOutcome::Passed | CheckOutcome::Skipped { .. } => true,
            CheckOutcome::Failed { .. } | CheckOutcome::TimedOut => !self.blocking,
        }
    }

    pub fn describe(&self) -> String {
        match &self.outcome {
            CheckOutcome::Passed => format!("{} passed", self.name),
            CheckOutcome::Failed { output } => {
                let first = output.lines().next().unwrap_or("").trim();
                format!("{} failed: {}", self.name, first)
            }
            CheckOutcome::Skipped { reason } => format!("{} skipped ({})", self.name, reason),
            CheckOutcome::TimedOut => format!("{} timed out", self.name),
        }
    }
}

/// Runs the configured checks inside the project directory
#[derive(Debug, Clone)]
pub struct CheckRunner {
    workdir: PathBuf,
    checks: Vec<CheckCommand>,
    timeout: Duration,
}

impl CheckRunner {
    pub fn new(workdir: impl Into<PathBuf>, checks: Vec<CheckCommand>, timeout: Duration) -> Self {
        Self {
            workdir: workdir.into(),
            checks,
            timeout,
        }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(
            settings.project_dir.clone(),
            settings.checks.clone(),
            Duration::from_secs(settings.check_timeout_secs),
        )
    }

    /// No checks configured
    pub fn disabled(workdir: impl Into<PathBuf>) -> Self {
        Self::new(workdir, Vec::new(), Duration::from_secs(1))
    }

    pub async fn run_all(&self, files: &[PathBuf]) -> Vec<CheckResult> {
        let mut results = Vec::with_capacity(self.checks.len());
        for check in &self.checks {
            results.push(self.run(check, files).await);
        }
        results
    }

    pub async fn run(&self, check: &CheckCommand, files: &[PathBuf]) -> CheckResult {
        let result = |outcome| CheckResult {
            name: check.name.clone(),
            blocking: check.blocking,
            outcome,
        };

        let targets: Vec<&PathBuf> = files
            .iter()
            .filter(|f| matches_extension(f, &check.extensions))
            .collect();
        if targets.is_empty() {
            return result(CheckOutcome::Skipped {
                reason: "no matching files".to_string(),
            });
        }

        let mut cmd = Command::new(&check.program);
        cmd.args(&check.args)
            .args(targets)
            .current_dir(&self.workdir)
            .kill_on_drop(true);

        tracing::debug!("Running {} ({})", check.name, check.program);
        match tokio::time::timeout(self.timeout, cmd.output()).await {
            Err(_) => {
                tracing::warn!("{} timed out after {:?}", check.name, self.timeout);
                result(CheckOutcome::TimedOut)
            }
            Ok(Err(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!("{} not installed, skipping {}", check.program, check.name);
                result(CheckOutcome::Skipped {
                    reason: format!("{} not installed", check.program),
                })
            }
            Ok(Err(e)) => result(CheckOutcome::Failed {
                output: format!("{} failed to start: {}", check.program, e),
            }),
            Ok(Ok(output)) if output.status.success() => result(CheckOutcome::Passed),
            Ok(Ok(output)) => {
                let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
                text.push_str(&String::from_utf8_lossy(&output.stderr));
                result(CheckOutcome::Failed {
                    output: clip_output(text.trim()),
                })
            }
        }
    }
}

fn matches_extension(path: &Path, extensions: &[String]) -> bool {
    if extensions.is_empty() {
        return true;
    }
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| extensions.iter().any(|x| x.eq_ignore_ascii_case(e)))
        .unwrap_or(false)
}

fn clip_output(text: &str) -> String {
    match text.char_indices().nth(MAX_CHECK_OUTPUT) {
        Some((end, _)) => format!("{}\n... (truncated)", &text[..end]),
        None => text.to_string(),
    }
}
