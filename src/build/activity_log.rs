// Activity log - writes build events to <project>/.mat/build_YYYY-MM-DD.jsonl

use anyhow::{Context, Result};
use chrono::{Local, Utc};
use serde::{Deserialize, Serialize};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

/// An event in the life of a build run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum BuildEvent {
    /// A story moved to in-progress
    StoryStart {
        id: String,
        title: String,
        attempt: u32,
        level: u8,
    },
    /// One implement+verify cycle failed
    AttemptFailed {
        id: String,
        attempt: u32,
        reason: String,
    },
    StoryPassed {
        id: String,
        attempts: u32,
        duration_s: u64,
        files: Vec<String>,
    },
    /// Attempts exhausted
    StoryFailed { id: String, attempts: u32 },
    Commit {
        id: String,
        hash: String,
        msg: String,
    },
    RunFinished {
        outcome: String,
        passed: usize,
        failed: usize,
        pending: usize,
    },
}

#[derive(Debug, Serialize)]
struct LogEntry<'a> {
    ts: String,
    #[serde(flatten)]
    event: &'a BuildEvent,
}

/// Appends build events to a daily JSONL file
pub struct ActivityLog {
    dir: PathBuf,
}

impl ActivityLog {
    /// Log into `dir` (usually the project's `.mat` directory), created on
    /// first write
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn log(&self, event: BuildEvent) -> Result<()> {
        std::fs::create_dir_all(&self.dir)
            .with_context(|| format!("Failed to create {}", self.dir.display()))?;
        let path = self.today_path();

        let ts = Utc::now().to_rfc3339();
        let entry = LogEntry { ts, event: &event };
        let json = serde_json::to_string(&entry).context("Failed to serialize build event")?;

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .with_context(|| format!("Failed to open activity log: {}", path.display()))?;

        writeln!(file, "{}", json).context("Failed to write build event")?;

        Ok(())
    }

    /// Log, downgrading failures to a warning. The activity log never stops
    /// a build.
    pub fn record(&self, event: BuildEvent) {
        if let Err(e) = self.log(event) {
            tracing::warn!("Activity log write failed: {:#}", e);
        }
    }

    /// Return the path to today's log file
    pub fn today_path(&self) -> PathBuf {
        let date = Local::now().format("%Y-%m-%d").to_string();
        self.dir.join(format!("build_{}.jsonl", date))
    }
}
