//! Workdir refresh: a `git pull` before the run, never fatal.

use job_engine::GitConfig;

use tokio::process::Command;
use tracing::{debug, info, warn};

/// Pull the configured remote in the workdir. Any failure is logged and the
/// run continues with the configuration already on disk.
pub async fn sync_workdir(git: &GitConfig, workdir: &str) {
    if git.disable {
        debug!("git pull functionality is disabled");
        return;
    }
    let dir = if workdir.is_empty() { "." } else { workdir };

    let mut cmd = Command::new("git");
    cmd.arg("-C").arg(dir).arg("pull").arg(&git.remote);
    if !git.rsa_path.is_empty() && std::path::Path::new(&git.rsa_path).exists() {
        cmd.env(
            "GIT_SSH_COMMAND",
            format!("ssh -i {} -o IdentitiesOnly=yes", git.rsa_path),
        );
    }

    match cmd.output().await {
        Ok(output) if output.status.success() => {
            let stdout = String::from_utf8_lossy(&output.stdout);
            if stdout.contains("Already up to date") {
                debug!(dir, "repository already up to date");
            } else {
                info!(dir, "repository refreshed");
            }
        }
        Ok(output) => {
            let stderr = String::from_utf8_lossy(&output.stderr);
            if stderr.contains("not a git repository") {
                debug!(dir, "no repository to refresh");
            } else {
                warn!(dir, error = %stderr.trim(), "git pull failed, continuing with local config");
            }
        }
        Err(e) => warn!(error = %e, "could not invoke git"),
    }
}
