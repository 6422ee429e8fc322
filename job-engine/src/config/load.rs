// Configuration Loading
// File discovery and YAML parsing

use crate::config::models::{expand_home, Config};
use crate::config::ConfigError;

use tracing::debug;

use std::path::PathBuf;

/// Environment variable naming the config file.
pub const ENV_CONFIG: &str = "JOBFORGE_CONFIG";

/// Fallback config path when neither flag nor environment name one.
pub const DEFAULT_CONFIG_FILE: &str = "/etc/jobforge/config.yaml";

/// Pick the config file path: CLI flag, then environment, then default.
pub fn locate(cli_path: Option<String>) -> PathBuf {
    let path = cli_path
        .filter(|p| !p.is_empty())
        .or_else(|| std::env::var(ENV_CONFIG).ok().filter(|p| !p.is_empty()))
        .unwrap_or_else(|| DEFAULT_CONFIG_FILE.to_string());
    PathBuf::from(expand_home(&path))
}

impl Config {
    /// Load and initialize a config file. Symlinks are resolved first so
    /// log lines point at the real file.
    pub fn from_file(path: &PathBuf) -> Result<Config, ConfigError> {
        let io = |source| ConfigError::Io {
            path: path.clone(),
            source,
        };
        let resolved = std::fs::canonicalize(path).map_err(io)?;
        debug!(path = %resolved.display(), "loading configuration");
        let raw = std::fs::read_to_string(&resolved).map_err(io)?;
        let mut config: Config = serde_yaml::from_str(&raw)?;
        config.initialize();
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn cli_path_wins_over_default() {
        let path = locate(Some("/tmp/override.yaml".to_string()));
        assert_eq!(path, PathBuf::from("/tmp/override.yaml"));
        let fallback = locate(None);
        // Unless the environment overrides it, the packaged default holds.
        if std::env::var(ENV_CONFIG).is_err() {
            assert_eq!(fallback, PathBuf::from(DEFAULT_CONFIG_FILE));
        }
    }

    #[test]
    fn loads_a_file_and_applies_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            "steps:\n  ping:\n    commands:\n      - type: shell\n        inline: 'true'\n"
        )
        .unwrap();
        let config = Config::from_file(&file.path().to_path_buf()).unwrap();
        assert_eq!(config.steps.0.len(), 1);
        assert_eq!(config.git.remote, "origin");
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let err = Config::from_file(&PathBuf::from("/nonexistent/jobforge.yaml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }

    #[test]
    fn unparsable_yaml_is_a_yaml_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "steps: [not, a, map").unwrap();
        let err = Config::from_file(&file.path().to_path_buf()).unwrap_err();
        assert!(matches!(err, ConfigError::Yaml(_)));
    }
}
