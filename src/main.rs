// mat - autonomous multi-agent build loop
// Main entry point

use clap::Parser;
use crossterm::style::Stylize;
use std::process::ExitCode;

use mat::cli::{self, Cli};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match cli::run(cli).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{} {:#}", "Error:".red().bold(), e);
            ExitCode::FAILURE
        }
    }
}
