// Configuration Models
// The declarative job definition as it appears on disk

use crate::config::duration::parse_duration;
use crate::config::ConfigError;
use crate::db::{Connections, LockConfig};
use crate::jobs::{Check, Steps};

use serde::{Deserialize, Serialize};

use std::time::Duration;

/// The whole job definition, loaded once before the engine starts.
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    #[serde(default, skip_serializing_if = "GitConfig::is_default")]
    pub git: GitConfig,
    #[serde(default)]
    pub steps: Steps,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub checks: Vec<Check>,
    #[serde(default)]
    pub connections: Connections,
    #[serde(default, skip_serializing_if = "lock_unset")]
    pub lock: LockConfig,
    /// Worker count; 0 resolves to the available processing units.
    #[serde(default)]
    pub parallel: usize,
    /// Bounds cluster-lock acquisition only, never the run itself.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub timeout: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub workdir: String,
    #[serde(default, skip_serializing_if = "is_false")]
    pub debug: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub run_on_role_error: bool,
}

fn is_false(value: &bool) -> bool {
    !*value
}

fn lock_unset(lock: &LockConfig) -> bool {
    lock.key.is_empty() && lock.connection.is_empty()
}

impl Config {
    /// Fill in defaults and expand home-relative paths.
    pub fn initialize(&mut self) {
        self.git.initialize();
        self.workdir = expand_home(&self.workdir);
    }

    /// The configured lock-acquisition bound, if any.
    pub fn timeout_duration(&self) -> Result<Option<Duration>, ConfigError> {
        if self.timeout.is_empty() {
            return Ok(None);
        }
        parse_duration(&self.timeout).map(Some)
    }

    /// Render back to YAML for the startup debug log.
    pub fn to_yaml(&self) -> String {
        serde_yaml::to_string(self).unwrap_or_default()
    }
}

/// Repository-sync section; the workdir is refreshed with `git pull` before
/// a run unless disabled.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GitConfig {
    #[serde(default)]
    pub remote: String,
    #[serde(default)]
    pub rsa_path: String,
    #[serde(default)]
    pub http_user: String,
    #[serde(default)]
    pub http_password: String,
    #[serde(default)]
    pub disable: bool,
}

impl GitConfig {
    fn is_default(&self) -> bool {
        self == &GitConfig::default()
    }

    pub fn initialize(&mut self) {
        if self.remote.is_empty() {
            self.remote = "origin".to_string();
        }
        if self.rsa_path.is_empty() {
            self.rsa_path = "~/.ssh/id_rsa".to_string();
        }
        self.rsa_path = expand_home(&self.rsa_path);
    }
}

/// Expand a leading `~/` against the current home directory.
pub fn expand_home(path: &str) -> String {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest).to_string_lossy().into_owned();
        }
    }
    path.to_string()
}
