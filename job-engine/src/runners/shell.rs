// Shell Runner
// Executes shell actions on the host via bash

use crate::jobs::action::{ShellAction, Source};
use crate::jobs::matrix::InstanceArgs;
use crate::jobs::outcome::{output_lines, ActionOutcome};

use tokio::process::Command;
use tracing::debug;

use std::path::PathBuf;
use std::process::Stdio;

/// Runs shell actions with the instance arguments bound as environment
/// entries. Inline bodies go through `bash -c`; file actions run the script
/// directly (validation has already checked it is executable).
pub struct ShellRunner {
    shell: PathBuf,
}

impl ShellRunner {
    pub fn new() -> Self {
        Self {
            shell: which::which("bash").unwrap_or_else(|_| PathBuf::from("/bin/bash")),
        }
    }

    pub async fn run(&self, action: &ShellAction, args: &InstanceArgs) -> ActionOutcome {
        debug!(action = %action.name, "running shell action");
        let mut cmd = Command::new(&self.shell);
        match &action.source {
            Source::Inline(body) => {
                cmd.arg("-c").arg(body);
            }
            Source::File(path) => {
                cmd.arg(path);
            }
        }
        for (name, value) in args.as_env() {
            cmd.env(name, value);
        }
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());

        let output = match cmd.output().await {
            Ok(output) => output,
            Err(e) => {
                return ActionOutcome::failure(
                    1,
                    format!("failed to start shell action {}: {}", action.name, e),
                )
            }
        };

        // A signal death has no exit code; treat it as a plain failure.
        let rc = output.status.code().unwrap_or(1);
        ActionOutcome {
            rc,
            stdout: output_lines(&String::from_utf8_lossy(&output.stdout)),
            stderr: output_lines(&String::from_utf8_lossy(&output.stderr)),
            error: if rc != 0 {
                Some(format!("shell action {} exited with {}", action.name, rc))
            } else {
                None
            },
        }
    }
}

impl Default for ShellRunner {
    fn default() -> Self {
        Self::new()
    }
}
