// Configuration loader
// Layers defaults, .mat-config.toml, MAT_* environment variables and CLI flags

use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

use super::constants::CONFIG_FILE_NAME;
use super::settings::{CheckCommand, ContextBudget, Settings};

/// Values given on the command line; `None` leaves the lower layers alone
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub project_dir: Option<PathBuf>,
    pub prd_path: Option<PathBuf>,
    pub endpoint_url: Option<String>,
    pub model_name: Option<String>,
    pub max_story_attempts: Option<u32>,
    pub stream: bool,
    pub verbose: bool,
}

/// On-disk shape of `.mat-config.toml`. Every key is optional.
#[derive(Debug, Default, Deserialize)]
struct FileConfig {
    #[serde(default, alias = "ollama_url")]
    endpoint_url: Option<String>,
    #[serde(default, alias = "model")]
    model_name: Option<String>,
    #[serde(default)]
    max_retries: Option<u32>,
    #[serde(default, alias = "timeout")]
    timeout_secs: Option<u64>,
    #[serde(default)]
    verbose: Option<bool>,
    #[serde(default)]
    project_dir: Option<PathBuf>,
    #[serde(default, alias = "prd")]
    prd_path: Option<PathBuf>,
    #[serde(default)]
    max_story_attempts: Option<u32>,
    #[serde(default)]
    turn_attempts: Option<u32>,
    #[serde(default)]
    stream: Option<bool>,
    #[serde(default)]
    backoff_base_ms: Option<u64>,
    #[serde(default)]
    backoff_max_ms: Option<u64>,
    #[serde(default)]
    context: Option<ContextBudget>,
    #[serde(default)]
    checks: Option<Vec<CheckCommand>>,
    #[serde(default)]
    check_timeout_secs: Option<u64>,
}

impl FileConfig {
    fn apply(self, s: &mut Settings) {
        if let Some(v) = self.endpoint_url {
            s.endpoint_url = v;
        }
        if let Some(v) = self.model_name {
            s.model_name = v;
        }
        if let Some(v) = self.max_retries {
            s.max_retries = v;
        }
        if let Some(v) = self.timeout_secs {
            s.timeout_secs = v;
        }
        if let Some(v) = self.verbose {
            s.verbose = v;
        }
        if let Some(v) = self.project_dir {
            s.project_dir = v;
        }
        if let Some(v) = self.prd_path {
            s.prd_path = v;
        }
        if let Some(v) = self.max_story_attempts {
            s.max_story_attempts = v;
        }
        if let Some(v) = self.turn_attempts {
            s.turn_attempts = v;
        }
        if let Some(v) = self.stream {
            s.stream = v;
        }
        if let Some(v) = self.backoff_base_ms {
            s.backoff_base_ms = v;
        }
        if let Some(v) = self.backoff_max_ms {
            s.backoff_max_ms = v;
        }
        if let Some(v) = self.context {
            s.context = v;
        }
        if let Some(v) = self.checks {
            s.checks = v;
        }
        if let Some(v) = self.check_timeout_secs {
            s.check_timeout_secs = v;
        }
    }
}

/// Load settings for a run.
///
/// The config file is looked up in the project directory given on the command
/// line, else `MAT_PROJECT_DIR`, else the current directory.
pub fn load_settings(cli: &CliOverrides) -> Result<Settings> {
    let search_dir = match cli
        .project_dir
        .clone()
        .or_else(|| std::env::var_os("MAT_PROJECT_DIR").map(PathBuf::from))
    {
        Some(dir) => dir,
        None => std::env::current_dir().context("Could not determine current directory")?,
    };

    let mut settings = Settings {
        project_dir: search_dir.clone(),
        ..Settings::default()
    };

    let config_path = search_dir.join(CONFIG_FILE_NAME);
    if let Some(file) = read_config_file(&config_path)? {
        tracing::debug!("Loaded configuration from {}", config_path.display());
        file.apply(&mut settings);
    }

    apply_env(&mut settings, |key| std::env::var(key).ok())?;
    apply_cli(&mut settings, cli);

    settings
        .validate()
        .context("Configuration validation failed")?;

    Ok(settings)
}

fn read_config_file(path: &Path) -> Result<Option<FileConfig>> {
    if !path.exists() {
        return Ok(None);
    }
    let contents = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file {}", path.display()))?;
    let file: FileConfig = toml::from_str(&contents)
        .with_context(|| format!("Failed to parse config file {}", path.display()))?;
    Ok(Some(file))
}

/// Apply `MAT_*` overrides. `lookup` is `std::env::var` outside of tests.
pub fn apply_env<F>(settings: &mut Settings, lookup: F) -> Result<()>
where
    F: Fn(&str) -> Option<String>,
{
    let get = |key: &str| lookup(key).filter(|v| !v.is_empty());

    if let Some(v) = get("MAT_OLLAMA_URL") {
        settings.endpoint_url = v;
    }
    if let Some(v) = get("MAT_MODEL") {
        settings.model_name = v;
    }
    if let Some(v) = get("MAT_PROJECT_DIR") {
        settings.project_dir = PathBuf::from(v);
    }
    if let Some(v) = get("MAT_VERBOSE") {
        settings.verbose = parse_flag(&v);
    }
    if let Some(v) = get("MAT_MAX_RETRIES") {
        settings.max_retries = v
            .trim()
            .parse()
            .with_context(|| format!("MAT_MAX_RETRIES must be an integer, got '{}'", v))?;
    }
    if let Some(v) = get("MAT_TIMEOUT") {
        settings.timeout_secs = v
            .trim()
            .parse()
            .with_context(|| format!("MAT_TIMEOUT must be an integer, got '{}'", v))?;
    }
    Ok(())
}

fn apply_cli(settings: &mut Settings, cli: &CliOverrides) {
    if let Some(dir) = &cli.project_dir {
        settings.project_dir = dir.clone();
    }
    if let Some(prd) = &cli.prd_path {
        settings.prd_path = prd.clone();
    }
    if let Some(url) = &cli.endpoint_url {
        settings.endpoint_url = url.clone();
    }
    if let Some(model) = &cli.model_name {
        settings.model_name = model.clone();
    }
    if let Some(n) = cli.max_story_attempts {
        settings.max_story_attempts = n;
    }
    if cli.stream {
        settings.stream = true;
    }
    if cli.verbose {
        settings.verbose = true;
    }
}

fn parse_flag(value: &str) -> bool {
    matches!(value.trim().to_lowercase().as_str(), "1" | "true" | "yes")
}
