// Jobs Module
// The orchestration core: data model, scheduler, workers, checks

pub mod action;
pub mod check;
pub mod instance;
pub mod matrix;
pub mod outcome;
pub mod scheduler;
pub mod step;
pub mod worker;

// Re-export key types
pub use action::{Action, ActionError, Command, ShellAction, Source, StatementAction};
pub use check::{assert_outcome, run_checks, Check, CheckFailure};
pub use instance::Instance;
pub use matrix::{InstanceArgs, MatrixArgs, INSTANCE_ENV_PREFIX};
pub use outcome::{output_lines, ActionOutcome};
pub use scheduler::Handler;
pub use step::{Step, StepState, Steps};
pub use worker::{effective_parallelism, WorkItem, WorkerNote};

use thiserror::Error;

/// Fatal engine faults. Anything here means a scheduler invariant broke or
/// would break; local action failures never surface as an `EngineError`.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("unknown step {0}")]
    UnknownStep(String),
    #[error("invalid step transition from {from} to {to} for step {step}")]
    InvalidTransition {
        step: String,
        from: StepState,
        to: StepState,
    },
    #[error("completion for unknown instance {instance} of step {step}")]
    UnknownInstance { step: String, instance: String },
    #[error("work queue closed while scheduling")]
    QueueClosed,
    #[error("worker task failed: {0}")]
    WorkerFailure(String),
    #[error("run finished with non-terminal steps: {0}")]
    NonTerminal(String),
}
