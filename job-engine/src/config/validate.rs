// Configuration Validation
// Fatal pre-run checks: references, cycles, matrices, script files

use crate::config::models::Config;
use crate::config::ConfigError;
use crate::jobs::{Action, Source};

use std::collections::{HashMap, VecDeque};
use std::path::Path;

impl Config {
    /// Validate the whole definition. Every problem is collected so the
    /// operator sees them all in one pass; any problem is fatal.
    pub fn verify(&self) -> Result<(), ConfigError> {
        let mut issues = Vec::new();

        if self.steps.0.is_empty() {
            issues.push(ConfigError::NoSteps);
        } else {
            self.verify_steps(&mut issues);
            if let Some(cycle) = self.detect_cycle() {
                issues.push(ConfigError::DependencyCycle(cycle));
            }
        }
        self.verify_checks(&mut issues);
        self.verify_lock(&mut issues);
        if let Err(e) = self.timeout_duration() {
            issues.push(e);
        }

        match issues.len() {
            0 => Ok(()),
            1 => Err(issues.remove(0)),
            _ => Err(ConfigError::Issues(issues)),
        }
    }

    fn verify_steps(&self, issues: &mut Vec<ConfigError>) {
        for (name, step) in &self.steps.0 {
            for dependency in &step.depends {
                if !self.steps.0.contains_key(dependency) {
                    issues.push(ConfigError::UnknownDependency {
                        step: name.clone(),
                        dependency: dependency.clone(),
                    });
                }
            }
            for (argument, values) in &step.matrix.0 {
                if values.is_empty() {
                    issues.push(ConfigError::EmptyMatrix {
                        step: name.clone(),
                        argument: argument.clone(),
                    });
                }
            }
            for command in &step.commands {
                match command.to_action(name, &self.connections) {
                    Err(e) => issues.push(e.into()),
                    Ok(Action::Shell(shell)) => {
                        if let Source::File(path) = &shell.source {
                            if let Some(issue) = check_script_file(path) {
                                issues.push(issue);
                            }
                        }
                    }
                    Ok(Action::Statement(_)) => {}
                }
            }
        }
    }

    fn verify_checks(&self, issues: &mut Vec<ConfigError>) {
        for check in &self.checks {
            for (argument, values) in &check.matrix.0 {
                if values.is_empty() {
                    issues.push(ConfigError::EmptyMatrix {
                        step: "checks".to_string(),
                        argument: argument.clone(),
                    });
                }
            }
            match check.command.to_action("checks", &self.connections) {
                Err(e) => issues.push(e.into()),
                Ok(Action::Shell(shell)) => {
                    if let Source::File(path) = &shell.source {
                        if let Some(issue) = check_script_file(path) {
                            issues.push(issue);
                        }
                    }
                }
                Ok(Action::Statement(_)) => {}
            }
        }
    }

    fn verify_lock(&self, issues: &mut Vec<ConfigError>) {
        if self.lock.key.is_empty() {
            return;
        }
        if self.lock.connection.is_empty() {
            if self.connections.sole().is_none() {
                issues.push(ConfigError::AmbiguousLockConnection);
            }
        } else if self.connections.get(&self.lock.connection).is_err() {
            issues.push(ConfigError::UnknownLockConnection(
                self.lock.connection.clone(),
            ));
        }
    }

    /// Kahn's topological check over the dependency edges. Returns the
    /// steps stuck on a cycle, if any; a cyclic graph would otherwise poll
    /// forever at run time.
    fn detect_cycle(&self) -> Option<String> {
        let mut in_degree: HashMap<&str, usize> = HashMap::new();
        let mut dependents: HashMap<&str, Vec<&str>> = HashMap::new();

        for (name, step) in &self.steps.0 {
            in_degree.entry(name).or_insert(0);
            for dependency in &step.depends {
                // Unknown references are reported separately.
                if !self.steps.0.contains_key(dependency) {
                    continue;
                }
                *in_degree.entry(name).or_insert(0) += 1;
                dependents.entry(dependency).or_default().push(name);
            }
        }

        let mut queue: VecDeque<&str> = in_degree
            .iter()
            .filter(|(_, &degree)| degree == 0)
            .map(|(&name, _)| name)
            .collect();
        let mut processed = 0;

        while let Some(name) = queue.pop_front() {
            processed += 1;
            if let Some(next) = dependents.get(name) {
                for &dependent in next {
                    let degree = in_degree.get_mut(dependent).expect("seeded above");
                    *degree -= 1;
                    if *degree == 0 {
                        queue.push_back(dependent);
                    }
                }
            }
        }

        if processed == self.steps.0.len() {
            return None;
        }
        let mut stuck: Vec<&str> = in_degree
            .iter()
            .filter(|(_, &degree)| degree > 0)
            .map(|(&name, _)| name)
            .collect();
        stuck.sort_unstable();
        Some(stuck.join(", "))
    }
}

/// Shell file actions must exist and be executable before the run starts.
fn check_script_file(path: &Path) -> Option<ConfigError> {
    let metadata = match std::fs::metadata(path) {
        Ok(metadata) => metadata,
        Err(e) => {
            return Some(ConfigError::BadScriptFile {
                path: path.display().to_string(),
                reason: e.to_string(),
            })
        }
    };
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        if metadata.permissions().mode() & 0o111 == 0 {
            return Some(ConfigError::BadScriptFile {
                path: path.display().to_string(),
                reason: "no execute permission".to_string(),
            });
        }
    }
    #[cfg(not(unix))]
    let _ = metadata;
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::{Command, Step};

    fn shell_step(inline: &str, depends: &[&str]) -> Step {
        Step {
            commands: vec![Command {
                kind: "shell".into(),
                inline: inline.into(),
                ..Command::default()
            }],
            depends: depends.iter().map(|d| d.to_string()).collect(),
            ..Step::default()
        }
    }

    fn config_with(steps: &[(&str, Step)]) -> Config {
        let mut config = Config::default();
        for (name, step) in steps {
            config.steps.0.insert(name.to_string(), step.clone());
        }
        config
    }

    #[test]
    fn an_empty_definition_is_rejected() {
        assert!(matches!(
            Config::default().verify(),
            Err(ConfigError::NoSteps)
        ));
    }

    #[test]
    fn a_valid_graph_passes() {
        let config = config_with(&[
            ("a", shell_step("true", &[])),
            ("b", shell_step("true", &["a"])),
        ]);
        config.verify().unwrap();
    }

    #[test]
    fn unknown_dependencies_are_fatal() {
        let config = config_with(&[("a", shell_step("true", &["ghost"]))]);
        assert!(matches!(
            config.verify(),
            Err(ConfigError::UnknownDependency { step, dependency })
                if step == "a" && dependency == "ghost"
        ));
    }

    #[test]
    fn dependency_cycles_are_fatal() {
        let config = config_with(&[
            ("a", shell_step("true", &["c"])),
            ("b", shell_step("true", &["a"])),
            ("c", shell_step("true", &["b"])),
        ]);
        match config.verify() {
            Err(ConfigError::DependencyCycle(stuck)) => {
                assert_eq!(stuck, "a, b, c");
            }
            other => panic!("expected a cycle error, got {:?}", other),
        }
    }

    #[test]
    fn a_diamond_is_not_a_cycle() {
        let config = config_with(&[
            ("a", shell_step("true", &[])),
            ("b", shell_step("true", &["a"])),
            ("c", shell_step("true", &["a"])),
            ("d", shell_step("true", &["b", "c"])),
        ]);
        config.verify().unwrap();
    }

    #[test]
    fn empty_matrix_value_lists_are_fatal() {
        let mut step = shell_step("true", &[]);
        step.matrix.0.insert("shard".into(), Vec::new());
        let config = config_with(&[("a", step)]);
        assert!(matches!(
            config.verify(),
            Err(ConfigError::EmptyMatrix { step, argument })
                if step == "a" && argument == "shard"
        ));
    }

    #[test]
    fn missing_script_files_are_fatal() {
        let mut step = shell_step("", &[]);
        step.commands[0].inline.clear();
        step.commands[0].file = "/nonexistent/maintenance.sh".into();
        let config = config_with(&[("a", step)]);
        assert!(matches!(
            config.verify(),
            Err(ConfigError::BadScriptFile { .. })
        ));
    }

    #[cfg(unix)]
    #[test]
    fn non_executable_script_files_are_fatal() {
        use std::io::Write;
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "#!/bin/bash\ntrue\n").unwrap();

        let mut step = shell_step("", &[]);
        step.commands[0].inline.clear();
        step.commands[0].file = file.path().display().to_string();
        let config = config_with(&[("a", step)]);
        assert!(matches!(
            config.verify(),
            Err(ConfigError::BadScriptFile { reason, .. }) if reason.contains("execute")
        ));
    }

    #[test]
    fn lock_requires_a_resolvable_connection() {
        let mut config = config_with(&[("a", shell_step("true", &[]))]);
        config.lock.key = "nightly".into();
        assert!(matches!(
            config.verify(),
            Err(ConfigError::AmbiguousLockConnection)
        ));

        config.lock.connection = "pg".into();
        assert!(matches!(
            config.verify(),
            Err(ConfigError::UnknownLockConnection(name)) if name == "pg"
        ));
    }

    #[test]
    fn all_problems_are_reported_together() {
        let mut step = shell_step("true", &["ghost"]);
        step.matrix.0.insert("shard".into(), Vec::new());
        let mut config = config_with(&[("a", step)]);
        config.timeout = "whenever".into();

        match config.verify() {
            Err(ConfigError::Issues(issues)) => {
                assert_eq!(issues.len(), 3);
            }
            other => panic!("expected collected issues, got {:?}", other),
        }
    }
}
