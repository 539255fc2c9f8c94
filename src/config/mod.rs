// Configuration module
// Public interface for configuration loading

pub mod constants;
mod loader;
mod settings;

pub use loader::{apply_env, load_settings, CliOverrides};
pub use settings::{CheckCommand, ContextBudget, Settings};
