// Steps
// The step entity, its state machine, and the readiness scan

use crate::db::Connections;
use crate::jobs::action::{Action, ActionError, Command};
use crate::jobs::instance::Instance;
use crate::jobs::matrix::MatrixArgs;
use crate::jobs::EngineError;

use serde::{Deserialize, Serialize};

use std::collections::{BTreeMap, HashMap};
use std::fmt;

/// Lifecycle of a step. Transitions may never go backwards; the ordinal
/// ordering of the variants is the rule.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord)]
pub enum StepState {
    #[default]
    Waiting,
    Skipped,
    Ready,
    Scheduled,
    Running,
    Done,
}

impl StepState {
    /// A step in a terminal state counts as a satisfied dependency.
    pub fn is_terminal(&self) -> bool {
        matches!(self, StepState::Done | StepState::Skipped)
    }
}

impl fmt::Display for StepState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StepState::Waiting => "Waiting",
            StepState::Skipped => "Skipped",
            StepState::Ready => "Ready",
            StepState::Scheduled => "Scheduled",
            StepState::Running => "Running",
            StepState::Done => "Done",
        };
        write!(f, "{}", name)
    }
}

/// A named unit of work: an ordered action sequence, dependencies, optional
/// conditional gates, and an optional argument matrix.
///
/// Runtime fields never serialize, so a parsed step re-serializes to its
/// declared form.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Step {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub commands: Vec<Command>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub depends: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub when: Vec<String>,
    #[serde(default, skip_serializing_if = "MatrixArgs::is_empty")]
    pub matrix: MatrixArgs,

    #[serde(skip)]
    pub state: StepState,
    #[serde(skip)]
    pub actions: Vec<Action>,
    #[serde(skip)]
    pub instances: BTreeMap<String, Instance>,
    #[serde(skip)]
    pub expanded: bool,
}

impl Step {
    pub fn state(&self) -> StepState {
        self.state
    }

    /// Move to a new state; only forward (or same-state) moves are legal.
    /// A backward move is an engine bug and leaves the prior state intact.
    pub fn advance(&mut self, name: &str, new: StepState) -> Result<(), EngineError> {
        if new < self.state {
            return Err(EngineError::InvalidTransition {
                step: name.to_string(),
                from: self.state,
                to: new,
            });
        }
        self.state = new;
        Ok(())
    }

    /// Resolve declared commands into runtime actions once, after validation.
    pub fn resolve_actions(
        &mut self,
        name: &str,
        connections: &Connections,
    ) -> Result<(), ActionError> {
        self.actions = self
            .commands
            .iter()
            .map(|command| command.to_action(name, connections))
            .collect::<Result<_, _>>()?;
        Ok(())
    }

    /// Expand the matrix into instances. Expanding again is a no-op.
    pub fn ensure_instances(&mut self) -> &BTreeMap<String, Instance> {
        if !self.expanded {
            for args in self.matrix.instances() {
                let instance = Instance::new(args, self.actions.clone());
                self.instances.insert(instance.key().to_string(), instance);
            }
            self.expanded = true;
        }
        &self.instances
    }

    pub fn instances(&self) -> &BTreeMap<String, Instance> {
        &self.instances
    }

    pub fn instance_mut(&mut self, key: &str) -> Option<&mut Instance> {
        self.instances.get_mut(key)
    }

    /// True once every expanded instance has reported completion.
    pub fn all_instances_done(&self) -> bool {
        self.expanded && self.instances.values().all(|instance| instance.done())
    }

    /// Aggregate return code: the sum of the instance return codes.
    pub fn rc(&self) -> i32 {
        self.instances.values().map(|instance| instance.rc()).sum()
    }

    pub fn stdout(&self) -> Vec<String> {
        self.instances
            .values()
            .flat_map(|instance| instance.stdout())
            .collect()
    }

    pub fn stderr(&self) -> Vec<String> {
        self.instances
            .values()
            .flat_map(|instance| instance.stderr())
            .collect()
    }
}

/// All declared steps, keyed by name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Steps(pub HashMap<String, Step>);

impl Steps {
    pub fn get(&self, name: &str) -> Result<&Step, EngineError> {
        self.0
            .get(name)
            .ok_or_else(|| EngineError::UnknownStep(name.to_string()))
    }

    pub fn get_mut(&mut self, name: &str) -> Result<&mut Step, EngineError> {
        self.0
            .get_mut(name)
            .ok_or_else(|| EngineError::UnknownStep(name.to_string()))
    }

    pub fn set_state(&mut self, name: &str, new: StepState) -> Result<(), EngineError> {
        let step = self
            .0
            .get_mut(name)
            .ok_or_else(|| EngineError::UnknownStep(name.to_string()))?;
        step.advance(name, new)
    }

    /// Every Waiting step whose entire dependency set is terminal.
    /// Plain scan; step counts in this domain are small enough to poll.
    pub fn ready_steps(&self) -> Result<Vec<String>, EngineError> {
        let mut ready = Vec::new();
        for (name, step) in &self.0 {
            if step.state() != StepState::Waiting {
                continue;
            }
            let mut satisfied = true;
            for dependency in &step.depends {
                if !self.get(dependency)?.state().is_terminal() {
                    satisfied = false;
                    break;
                }
            }
            if satisfied {
                ready.push(name.clone());
            }
        }
        ready.sort();
        Ok(ready)
    }

    pub fn num_waiting(&self) -> usize {
        self.0
            .values()
            .filter(|step| step.state() == StepState::Waiting)
            .count()
    }

    /// Total instance count across all steps, known before any expansion.
    pub fn total_instances(&self) -> usize {
        self.0
            .values()
            .map(|step| step.matrix.instance_count())
            .sum()
    }

    /// Names of steps that did not reach a terminal state.
    pub fn non_terminal(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .0
            .iter()
            .filter(|(_, step)| !step.state().is_terminal())
            .map(|(name, _)| name.clone())
            .collect();
        names.sort();
        names
    }
}
