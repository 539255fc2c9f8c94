use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::config::CliOverrides;

#[derive(Parser, Debug)]
#[command(name = "mat")]
#[command(author, version, about = "Autonomous multi-agent build loop over a prd.json backlog", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Project directory (default: current directory)
    #[arg(long, global = true)]
    pub project_dir: Option<PathBuf>,

    /// Model name served by the inference endpoint
    #[arg(long, global = true)]
    pub model: Option<String>,

    /// Base URL of the OpenAI-compatible endpoint
    #[arg(long, global = true)]
    pub url: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the build loop until no pending story remains
    Build {
        /// Path to the backlog (default: prd.json in the project directory)
        #[arg(long)]
        prd: Option<PathBuf>,

        /// Implement+verify cycles allowed per story
        #[arg(long)]
        max_attempts: Option<u32>,

        /// Request streamed completions
        #[arg(long)]
        stream: bool,
    },

    /// Show backlog progress
    Status {
        /// Path to the backlog (default: prd.json in the project directory)
        #[arg(long)]
        prd: Option<PathBuf>,
    },

    /// Show the scale level and role plan for a piece of text
    Classify {
        /// Story or project description
        text: String,
    },
}

impl Cli {
    /// Flags that feed the configuration layers
    pub fn overrides(&self) -> CliOverrides {
        let mut overrides = CliOverrides {
            project_dir: self.project_dir.clone(),
            endpoint_url: self.url.clone(),
            model_name: self.model.clone(),
            verbose: self.verbose,
            ..CliOverrides::default()
        };
        match &self.command {
            Commands::Build {
                prd,
                max_attempts,
                stream,
            } => {
                overrides.prd_path = prd.clone();
                overrides.max_story_attempts = *max_attempts;
                overrides.stream = *stream;
            }
            Commands::Status { prd } => overrides.prd_path = prd.clone(),
            Commands::Classify { .. } => {}
        }
        overrides
    }
}
