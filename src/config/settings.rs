// Configuration structs

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use super::constants::*;
use crate::llm::RetryPolicy;

/// Conversation size budget, in estimated tokens
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContextBudget {
    pub max_tokens: usize,
    /// Headroom kept free for the model's reply
    pub reserved_tokens: usize,
    pub chars_per_token: usize,
}

impl Default for ContextBudget {
    fn default() -> Self {
        Self {
            max_tokens: DEFAULT_MAX_CONTEXT_TOKENS,
            reserved_tokens: DEFAULT_RESERVED_TOKENS,
            chars_per_token: CHARS_PER_TOKEN,
        }
    }
}

impl ContextBudget {
    /// Characters the prompt side of a conversation may occupy
    pub fn char_limit(&self) -> usize {
        self.max_tokens
            .saturating_sub(self.reserved_tokens)
            .saturating_mul(self.chars_per_token.max(1))
    }

    pub fn estimate_tokens(&self, chars: usize) -> usize {
        chars / self.chars_per_token.max(1)
    }
}

/// An external tool the verifier runs against changed files
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckCommand {
    /// Label used in reports ("typecheck", "lint")
    pub name: String,
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
    /// A failing blocking check fails verification; others are informational
    #[serde(default)]
    pub blocking: bool,
    /// Restrict the check to changed files with these extensions (empty = all)
    #[serde(default)]
    pub extensions: Vec<String>,
}

impl CheckCommand {
    /// Default checks for Python projects: mypy blocks, ruff informs
    pub fn defaults() -> Vec<Self> {
        vec![
            Self {
                name: "typecheck".to_string(),
                program: "mypy".to_string(),
                args: vec!["--ignore-missing-imports".to_string()],
                blocking: true,
                extensions: vec!["py".to_string()],
            },
            Self {
                name: "lint".to_string(),
                program: "ruff".to_string(),
                args: vec!["check".to_string()],
                blocking: false,
                extensions: vec!["py".to_string()],
            },
        ]
    }
}

/// Everything a run needs, passed down explicitly
#[derive(Debug, Clone)]
pub struct Settings {
    /// Base URL of the OpenAI-compatible endpoint
    pub endpoint_url: String,
    pub model_name: String,
    /// Transport attempts per request (at least 1)
    pub max_retries: u32,
    pub timeout_secs: u64,
    pub verbose: bool,
    pub project_dir: PathBuf,
    /// Backlog file; relative paths resolve against `project_dir`
    pub prd_path: PathBuf,
    pub max_story_attempts: u32,
    pub turn_attempts: u32,
    /// Request streamed completions
    pub stream: bool,
    pub backoff_base_ms: u64,
    pub backoff_max_ms: u64,
    pub context: ContextBudget,
    pub checks: Vec<CheckCommand>,
    pub check_timeout_secs: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            endpoint_url: DEFAULT_ENDPOINT_URL.to_string(),
            model_name: DEFAULT_MODEL.to_string(),
            max_retries: DEFAULT_MAX_RETRIES,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            verbose: false,
            project_dir: PathBuf::from("."),
            prd_path: PathBuf::from(DEFAULT_PRD_FILE),
            max_story_attempts: DEFAULT_MAX_STORY_ATTEMPTS,
            turn_attempts: DEFAULT_TURN_ATTEMPTS,
            stream: false,
            backoff_base_ms: DEFAULT_BACKOFF_BASE_MS,
            backoff_max_ms: DEFAULT_BACKOFF_MAX_MS,
            context: ContextBudget::default(),
            checks: CheckCommand::defaults(),
            check_timeout_secs: DEFAULT_CHECK_TIMEOUT_SECS,
        }
    }
}

impl Settings {
    /// Validate configuration and return helpful errors
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.endpoint_url.trim().is_empty() {
            anyhow::bail!("endpoint_url must not be empty");
        }
        if !self.endpoint_url.starts_with("http://") && !self.endpoint_url.starts_with("https://")
        {
            anyhow::bail!(
                "endpoint_url '{}' must start with http:// or https://",
                self.endpoint_url
            );
        }
        if self.model_name.trim().is_empty() {
            anyhow::bail!("model_name must not be empty");
        }
        if self.max_retries == 0 {
            anyhow::bail!("max_retries must be at least 1");
        }
        if self.max_story_attempts == 0 {
            anyhow::bail!("max_story_attempts must be at least 1");
        }
        if self.turn_attempts == 0 {
            anyhow::bail!("turn_attempts must be at least 1");
        }
        if self.timeout_secs == 0 {
            anyhow::bail!("timeout must be greater than zero");
        }
        if self.context.reserved_tokens >= self.context.max_tokens {
            anyhow::bail!(
                "reserved_tokens ({}) must be smaller than max_context_tokens ({})",
                self.context.reserved_tokens,
                self.context.max_tokens
            );
        }
        Ok(())
    }

    /// Backoff schedule for the inference client
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.max_retries,
            Duration::from_millis(self.backoff_base_ms),
            Duration::from_millis(self.backoff_max_ms),
        )
    }

    /// Backlog location with `project_dir` applied
    pub fn resolved_prd_path(&self) -> PathBuf {
        if self.prd_path.is_absolute() {
            self.prd_path.clone()
        } else {
            self.project_dir.join(&self.prd_path)
        }
    }

    /// Directory for activity logs
    pub fn state_dir(&self) -> PathBuf {
        self.project_dir.join(STATE_DIR)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_local_ollama() {
        let s = Settings::default();
        assert_eq!(s.endpoint_url, "http://localhost:11434");
        assert_eq!(s.model_name, "codellama");
        assert_eq!(s.max_retries, 3);
        assert_eq!(s.timeout_secs, 120);
        assert_eq!(s.max_story_attempts, 3);
        assert!(s.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_zero_attempts() {
        let s = Settings {
            max_story_attempts: 0,
            ..Settings::default()
        };
        assert!(s.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_reserved_over_budget() {
        let s = Settings {
            context: ContextBudget {
                max_tokens: 1000,
                reserved_tokens: 1000,
                chars_per_token: 4,
            },
            ..Settings::default()
        };
        assert!(s.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_bad_scheme() {
        let s = Settings {
            endpoint_url: "localhost:11434".into(),
            ..Settings::default()
        };
        assert!(s.validate().is_err());
    }

    #[test]
    fn test_char_limit() {
        let budget = ContextBudget::default();
        assert_eq!(budget.char_limit(), (4096 - 1024) * 4);
        assert_eq!(budget.estimate_tokens(400), 100);
    }

    #[test]
    fn test_resolved_prd_path() {
        let s = Settings {
            project_dir: PathBuf::from("/work/app"),
            ..Settings::default()
        };
        assert_eq!(s.resolved_prd_path(), PathBuf::from("/work/app/prd.json"));

        let abs = Settings {
            prd_path: PathBuf::from("/tmp/other.json"),
            ..s
        };
        assert_eq!(abs.resolved_prd_path(), PathBuf::from("/tmp/other.json"));
    }

    #[test]
    fn test_default_checks() {
        let checks = CheckCommand::defaults();
        assert_eq!(checks.len(), 2);
        assert!(checks[0].blocking, "type-check must block");
        assert!(!checks[1].blocking, "lint is informational");
    }
}
