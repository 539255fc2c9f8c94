// mat - autonomous multi-agent build loop
// Library exports

pub mod agent;
pub mod backlog;
pub mod build;
pub mod cli;
pub mod config;
pub mod git;
pub mod llm;
pub mod logging;
pub mod orchestrator;
pub mod workspace;
