// Configuration Module
// Declarative job definition: models, loading, validation

pub mod duration;
pub mod load;
pub mod models;
pub mod validate;

// Re-export key types
pub use duration::parse_duration;
pub use load::{locate, DEFAULT_CONFIG_FILE, ENV_CONFIG};
pub use models::{Config, GitConfig};

use crate::jobs::ActionError;

use thiserror::Error;

use std::path::PathBuf;

/// Configuration faults. All of these are fatal before any scheduling
/// begins; nothing here is recoverable mid-run.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config file {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("cannot parse config file: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("please define at least one step")]
    NoSteps,
    #[error("step {step} depends on unknown step {dependency}")]
    UnknownDependency { step: String, dependency: String },
    #[error("dependency cycle between steps: {0}")]
    DependencyCycle(String),
    #[error(transparent)]
    Action(#[from] ActionError),
    #[error("step {step}: matrix argument {argument} has no values")]
    EmptyMatrix { step: String, argument: String },
    #[error("script file {path} is missing or not executable: {reason}")]
    BadScriptFile { path: String, reason: String },
    #[error("lock references unknown connection {0}")]
    UnknownLockConnection(String),
    #[error("lock needs a connection reference, or exactly one configured connection")]
    AmbiguousLockConnection,
    #[error("invalid duration {value}: {reason}")]
    InvalidTimeout { value: String, reason: String },
    #[error("{}", format_issues(.0))]
    Issues(Vec<ConfigError>),
}

fn format_issues(issues: &[ConfigError]) -> String {
    let mut lines = vec![format!(
        "{} configuration issue(s) prevent the run:",
        issues.len()
    )];
    lines.extend(issues.iter().map(|issue| format!("  - {}", issue)));
    lines.join("\n")
}
