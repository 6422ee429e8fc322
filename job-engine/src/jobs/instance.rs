// Step Instances
// One parameter-bound execution of a step

use crate::jobs::action::Action;
use crate::jobs::matrix::InstanceArgs;
use crate::jobs::outcome::ActionOutcome;

use tracing::warn;

/// One concrete execution of a step, produced by matrix expansion.
///
/// Owns its copy of the step's action sequence so concurrent instances of
/// the same step never share per-run execution state. The completion flag
/// is set exactly once, by the scheduler, when the executing worker's
/// notification is processed.
#[derive(Debug, Clone, PartialEq)]
pub struct Instance {
    key: String,
    args: InstanceArgs,
    actions: Vec<Action>,
    done: bool,
    outcomes: Vec<ActionOutcome>,
}

impl Instance {
    pub fn new(args: InstanceArgs, actions: Vec<Action>) -> Self {
        Self {
            key: args.key(),
            args,
            actions,
            done: false,
            outcomes: Vec::new(),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn args(&self) -> &InstanceArgs {
        &self.args
    }

    pub fn actions(&self) -> &[Action] {
        &self.actions
    }

    pub fn done(&self) -> bool {
        self.done
    }

    /// Record the outcome of this instance's run.
    ///
    /// Duplicate completions should not occur by construction; if one ever
    /// arrives it is logged and dropped rather than clobbering the result.
    pub fn complete(&mut self, outcomes: Vec<ActionOutcome>) {
        if self.done {
            warn!(instance = %self.key, "duplicate completion dropped");
            return;
        }
        self.outcomes = outcomes;
        self.done = true;
    }

    /// Aggregate return code: the sum of the action return codes.
    pub fn rc(&self) -> i32 {
        self.outcomes.iter().map(|outcome| outcome.rc).sum()
    }

    pub fn outcomes(&self) -> &[ActionOutcome] {
        &self.outcomes
    }

    pub fn stdout(&self) -> Vec<String> {
        self.outcomes
            .iter()
            .flat_map(|outcome| outcome.stdout.iter().cloned())
            .collect()
    }

    pub fn stderr(&self) -> Vec<String> {
        self.outcomes
            .iter()
            .flat_map(|outcome| outcome.stderr.iter().cloned())
            .collect()
    }
}
