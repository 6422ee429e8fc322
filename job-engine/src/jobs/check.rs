// Checks
// Post-run verification of job results

use crate::db::Connections;
use crate::executor::Executor;
use crate::jobs::action::{ActionError, Command};
use crate::jobs::matrix::{InstanceArgs, MatrixArgs};
use crate::jobs::outcome::ActionOutcome;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, error, info};

use std::sync::Arc;

/// One verification action, optionally matrix-expanded, with an expected
/// return code and optional substring assertions on the captured output.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Check {
    #[serde(flatten)]
    pub command: Command,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub rc: i32,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub expected: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub unexpected: String,
    #[serde(default, skip_serializing_if = "MatrixArgs::is_empty")]
    pub matrix: MatrixArgs,
}

fn is_zero(rc: &i32) -> bool {
    *rc == 0
}

/// Why one check did not pass.
#[derive(Debug, Error)]
pub enum CheckFailure {
    #[error("unexpected return code (expected={expected}, actual={actual})")]
    WrongRc { expected: i32, actual: i32 },
    #[error("expected string ({0}) not found in output")]
    MissingExpected(String),
    #[error("unexpected string ({0}) found in output")]
    FoundUnexpected(String),
    #[error("could not resolve check: {0}")]
    Unresolvable(#[from] ActionError),
}

/// Run every check against its matrix instances.
///
/// A failing check is logged and counted; it never blocks the remaining
/// checks and never changes the outcome of the main run.
pub async fn run_checks(
    checks: &[Check],
    connections: &Connections,
    executor: &Arc<dyn Executor>,
) -> usize {
    if checks.is_empty() {
        return 0;
    }
    info!("checking job results");
    let mut failures = 0;
    for check in checks {
        for args in check.matrix.instances() {
            match run_one(check, &args, connections, executor).await {
                Ok(()) => {
                    debug!(check = check.command.label(), instance = %args.key(), "check passed");
                }
                Err(e) => {
                    failures += 1;
                    error!(
                        check = check.command.label(),
                        instance = %args.key(),
                        error = %e,
                        "check failed"
                    );
                }
            }
        }
    }
    failures
}

async fn run_one(
    check: &Check,
    args: &InstanceArgs,
    connections: &Connections,
    executor: &Arc<dyn Executor>,
) -> Result<(), CheckFailure> {
    let action = check.command.to_action("checks", connections)?;
    let outcome = executor.execute(&action, args).await;
    assert_outcome(check, &outcome)
}

/// Evaluate a check's expectations against a captured outcome.
pub fn assert_outcome(check: &Check, outcome: &ActionOutcome) -> Result<(), CheckFailure> {
    if outcome.rc != check.rc {
        return Err(CheckFailure::WrongRc {
            expected: check.rc,
            actual: outcome.rc,
        });
    }
    if !check.expected.is_empty()
        && !outcome.stdout_contains(&check.expected)
        && !outcome.stderr_contains(&check.expected)
    {
        return Err(CheckFailure::MissingExpected(check.expected.clone()));
    }
    if !check.unexpected.is_empty()
        && (outcome.stdout_contains(&check.unexpected)
            || outcome.stderr_contains(&check.unexpected))
    {
        return Err(CheckFailure::FoundUnexpected(check.unexpected.clone()));
    }
    Ok(())
}
