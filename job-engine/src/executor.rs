// Executor Boundary
// The capability workers use to run one action

use crate::db::Connections;
use crate::jobs::action::Action;
use crate::jobs::matrix::InstanceArgs;
use crate::jobs::outcome::ActionOutcome;
use crate::runners::{ShellRunner, StatementRunner};

use std::sync::Arc;

/// Runs one action with bound instance arguments.
///
/// Implementations never return an error: any failure is captured in the
/// outcome so the engine can contain it to the owning instance.
#[async_trait::async_trait]
pub trait Executor: Send + Sync {
    async fn execute(&self, action: &Action, args: &InstanceArgs) -> ActionOutcome;
}

/// Production executor dispatching by action tag to the concrete runners.
pub struct TargetExecutor {
    shell: ShellRunner,
    statements: StatementRunner,
}

impl TargetExecutor {
    pub fn new(connections: Arc<Connections>) -> Self {
        Self {
            shell: ShellRunner::new(),
            statements: StatementRunner::new(connections),
        }
    }
}

#[async_trait::async_trait]
impl Executor for TargetExecutor {
    async fn execute(&self, action: &Action, args: &InstanceArgs) -> ActionOutcome {
        match action {
            Action::Shell(shell) => self.shell.run(shell, args).await,
            Action::Statement(statement) => self.statements.run(statement, args).await,
        }
    }
}
