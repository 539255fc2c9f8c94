// Command-line interface - `mat build`, `mat status`, `mat classify`

use anyhow::{Context, Result};
use crossterm::style::Stylize;
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::agent::LlmRoleFactory;
use crate::backlog::{BacklogStore, JsonBacklogStore, StoryStatus};
use crate::build::{ActivityLog, BuildLoop};
use crate::config::{load_settings, Settings};
use crate::git::GitCommitter;
use crate::llm::InferenceClient;
use crate::logging::init_logging;
use crate::orchestrator::{classify, story_plan};

mod commands;
pub mod output;

pub use commands::{Cli, Commands};

/// Dispatch a parsed command line.
///
/// Settings are loaded before logging starts so that `verbose` from the
/// config file or `MAT_VERBOSE` takes effect. `classify` needs no settings and
/// still runs when they fail to load.
pub async fn run(cli: Cli) -> Result<ExitCode> {
    let settings = load_settings(&cli.overrides());
    init_logging(verbose_logging(&cli, settings.as_ref().ok()));

    match &cli.command {
        Commands::Build { .. } => cmd_build(settings?).await,
        Commands::Status { .. } => cmd_status(&settings?),
        Commands::Classify { text } => {
            cmd_classify(text);
            Ok(ExitCode::SUCCESS)
        }
    }
}

/// Debug logging when any configuration layer asks for it
pub fn verbose_logging(cli: &Cli, settings: Option<&Settings>) -> bool {
    settings.map_or(cli.verbose, |s| s.verbose)
}

async fn cmd_build(settings: Settings) -> Result<ExitCode> {
    let prd_path = settings.resolved_prd_path();
    let client = InferenceClient::from_settings(&settings)
        .context("Failed to create inference client")?;

    // Only a warning: an unreachable backend is handled by the loop itself
    let models = client.list_models().await;
    if !models.is_empty() && !models.iter().any(|m| m == &settings.model_name) {
        tracing::warn!(
            "Model '{}' is not listed by {} (available: {})",
            settings.model_name,
            settings.endpoint_url,
            models.join(", ")
        );
    }

    let stop = Arc::new(AtomicBool::new(false));
    {
        let stop = stop.clone();
        if let Err(e) = ctrlc::set_handler(move || {
            if !stop.swap(true, Ordering::SeqCst) {
                eprintln!(
                    "\n{} Stopping after the current story attempt (Ctrl-C again to force)",
                    "⚠".yellow().bold()
                );
            } else {
                std::process::exit(130);
            }
        }) {
            tracing::warn!("Could not install Ctrl-C handler: {}", e);
        }
    }

    println!(
        "{} Building {} with {} at {}",
        "▶".cyan().bold(),
        prd_path.display(),
        settings.model_name,
        settings.endpoint_url
    );

    let build = BuildLoop::new(
        Arc::new(JsonBacklogStore::new(&prd_path)),
        Arc::new(LlmRoleFactory::from_settings(Arc::new(client), &settings)),
        Arc::new(GitCommitter::new(&settings.project_dir)),
        settings.max_story_attempts,
    )
    .with_activity_log(ActivityLog::new(settings.state_dir()))
    .with_stop_flag(stop);

    let report = build
        .run()
        .await
        .with_context(|| format!("Build aborted ({})", prd_path.display()))?;

    output::print_report(&report);
    Ok(if report.outcome.is_success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

fn cmd_status(settings: &Settings) -> Result<ExitCode> {
    let prd_path = settings.resolved_prd_path();
    let backlog = JsonBacklogStore::new(&prd_path)
        .load()
        .with_context(|| format!("Failed to load backlog {}", prd_path.display()))?;

    output::print_status(&backlog);

    let all_passed = backlog
        .stories
        .iter()
        .all(|s| s.status == StoryStatus::Passed);
    Ok(if all_passed {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

fn cmd_classify(text: &str) {
    let classification = classify(text);
    let plan = story_plan(classification.level);
    output::print_classification(&classification, &plan);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::constants::CONFIG_FILE_NAME;
    use clap::Parser;

    fn cli_for(dir: &std::path::Path, extra: &[&str]) -> Cli {
        let mut args = vec!["mat", "--project-dir", dir.to_str().unwrap()];
        args.extend_from_slice(extra);
        args.push("status");
        Cli::parse_from(args)
    }

    #[test]
    fn test_verbose_from_config_file_enables_debug_logging() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(CONFIG_FILE_NAME), "verbose = true\n").unwrap();
        let cli = cli_for(dir.path(), &[]);
        assert!(!cli.verbose);

        let settings = load_settings(&cli.overrides()).unwrap();
        assert!(verbose_logging(&cli, Some(&settings)));
    }

    #[test]
    fn test_verbose_flag_without_settings() {
        let dir = tempfile::tempdir().unwrap();
        assert!(verbose_logging(&cli_for(dir.path(), &["-v"]), None));
        assert!(!verbose_logging(&cli_for(dir.path(), &[]), None));
    }
}
