// Project-wide constants
//
// Centralised here so defaults and file names have one source of truth.
// Import via `use crate::config::constants::*;`.

/// Default inference endpoint (a local Ollama server).
pub const DEFAULT_ENDPOINT_URL: &str = "http://localhost:11434";

/// Default model requested from the endpoint.
pub const DEFAULT_MODEL: &str = "codellama";

/// Transport-level attempts per request.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// HTTP request timeout in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 120;

/// Implement+verify cycles a story may consume before it is marked failed.
pub const DEFAULT_MAX_STORY_ATTEMPTS: u32 = 3;

/// Agent-level attempts per turn when the backend returns unusable output.
pub const DEFAULT_TURN_ATTEMPTS: u32 = 2;

/// Backoff base and ceiling in milliseconds.
pub const DEFAULT_BACKOFF_BASE_MS: u64 = 1000;
pub const DEFAULT_BACKOFF_MAX_MS: u64 = 30_000;

/// Conversation budget. Tokens are estimated at 4 characters each.
pub const DEFAULT_MAX_CONTEXT_TOKENS: usize = 4096;
pub const DEFAULT_RESERVED_TOKENS: usize = 1024;
pub const CHARS_PER_TOKEN: usize = 4;

/// Timeout for a single verification check command.
pub const DEFAULT_CHECK_TIMEOUT_SECS: u64 = 120;

/// Files at or above this size are never read into a prompt (1 MiB).
pub const MAX_FILE_SIZE: u64 = 1024 * 1024;

/// Related files pulled into an implementer prompt.
pub const MAX_RELATED_FILES: usize = 5;

/// Backlog file name, relative to the project directory.
pub const DEFAULT_PRD_FILE: &str = "prd.json";

/// Per-project configuration file.
pub const CONFIG_FILE_NAME: &str = ".mat-config.toml";

/// Directory for run artifacts (activity logs).
pub const STATE_DIR: &str = ".mat";
