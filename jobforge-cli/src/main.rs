//! jobforge entry point: load, validate, lock, run, verify.

mod cli;
mod git;
mod logging;

use color_eyre::eyre::eyre;
use color_eyre::Result;
use job_engine::{config, ClusterLock, Config, DbError, Handler, TargetExecutor};
use tracing::{debug, error, info, warn};

use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let args = cli::parse();

    let path = config::locate(args.config.clone());
    let mut definition = Config::from_file(&path)?;
    if args.debug {
        definition.debug = true;
    }
    logging::init_logging(definition.debug);
    info!(path = %path.display(), "configuration loaded");
    debug!(config = %definition.to_yaml(), "effective configuration");

    if !definition.workdir.is_empty() {
        info!(workdir = %definition.workdir, "jumping to workdir");
        std::env::set_current_dir(&definition.workdir)
            .map_err(|e| eyre!("could not jump to workdir {}: {}", definition.workdir, e))?;
    }
    git::sync_workdir(&definition.git, &definition.workdir).await;

    info!("verifying config");
    definition.verify()?;
    let lock_timeout = definition.timeout_duration()?;

    let connections = Arc::new(std::mem::take(&mut definition.connections));
    match connections.verify_roles().await {
        Ok(()) => {}
        Err(e @ DbError::RoleMismatch { .. }) if definition.run_on_role_error => {
            warn!(error = %e, "role mismatch suppressed by runOnRoleError");
        }
        Err(e) => return Err(e.into()),
    }

    let lock_params = if definition.lock.key.is_empty() {
        Default::default()
    } else {
        let name = if definition.lock.connection.is_empty() {
            connections.sole().unwrap_or_default().to_string()
        } else {
            definition.lock.connection.clone()
        };
        connections.get(&name)?.conn_params.clone()
    };
    let mut lock = ClusterLock::new(definition.lock.key.clone(), lock_params);
    lock.acquire(lock_timeout).await?;

    let executor = Arc::new(TargetExecutor::new(connections.clone()));
    let mut handler = Handler::new(definition, connections.clone(), executor)?;
    let outcome = handler.run_steps().await;
    // The lock covers the step phase only; checks are read-mostly and safe
    // to run unlocked, exactly as a rerun of them would be.
    lock.release().await;
    if let Err(e) = outcome {
        error!(error = %e, "run aborted");
        return Err(e.into());
    }

    let failures = handler.run_checks().await;
    if failures > 0 {
        error!(failures, "verification checks failed");
    }
    connections.close_all().await;
    Ok(())
}
