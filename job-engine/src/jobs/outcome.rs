// Action Outcomes
// Captured output and return code of one executed action

/// Result of running a single action for one instance.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ActionOutcome {
    /// Process exit code or statement status (0 = success).
    pub rc: i32,
    /// Captured standard output, split into lines.
    pub stdout: Vec<String>,
    /// Captured standard error, split into lines.
    pub stderr: Vec<String>,
    /// Failure description when the action could not run or errored.
    pub error: Option<String>,
}

impl ActionOutcome {
    pub fn success(stdout: Vec<String>) -> Self {
        Self {
            rc: 0,
            stdout,
            ..Self::default()
        }
    }

    pub fn failure(rc: i32, message: impl Into<String>) -> Self {
        Self {
            rc,
            error: Some(message.into()),
            ..Self::default()
        }
    }

    pub fn failed(&self) -> bool {
        self.rc != 0
    }

    pub fn stdout_contains(&self, part: &str) -> bool {
        self.stdout.iter().any(|line| line.contains(part))
    }

    pub fn stderr_contains(&self, part: &str) -> bool {
        self.stderr.iter().any(|line| line.contains(part))
    }
}

/// Split captured process output into lines, dropping the trailing newline.
pub fn output_lines(raw: &str) -> Vec<String> {
    let trimmed = raw.strip_suffix('\n').unwrap_or(raw);
    if trimmed.is_empty() {
        return Vec::new();
    }
    trimmed.split('\n').map(|line| line.to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn output_lines_drops_trailing_newline() {
        assert_eq!(output_lines("a\nb\n"), vec!["a", "b"]);
        assert_eq!(output_lines("a\nb"), vec!["a", "b"]);
        assert!(output_lines("").is_empty());
        assert!(output_lines("\n").is_empty());
    }

    #[test]
    fn contains_scans_all_lines() {
        let outcome = ActionOutcome::success(vec!["first".into(), "in sync".into()]);
        assert!(outcome.stdout_contains("sync"));
        assert!(!outcome.stdout_contains("replica"));
        assert!(!outcome.failed());
    }

    #[test]
    fn failure_records_rc_and_message() {
        let outcome = ActionOutcome::failure(2, "bash exited with 2");
        assert!(outcome.failed());
        assert_eq!(outcome.rc, 2);
        assert_eq!(outcome.error.as_deref(), Some("bash exited with 2"));
    }
}
