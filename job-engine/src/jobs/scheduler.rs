// Scheduler
// The coordinating loop: readiness, conditions, dispatch, completion

use crate::config::Config;
use crate::db::Connections;
use crate::executor::Executor;
use crate::expression::{evaluate, EvalError, RunSnapshot, StepSnapshot};
use crate::jobs::action::ActionError;
use crate::jobs::step::{StepState, Steps};
use crate::jobs::worker::{effective_parallelism, Worker, WorkItem, WorkerNote};
use crate::jobs::{check, EngineError};

use tokio::sync::{mpsc, Mutex};
use tokio::time::{sleep, Duration};
use tracing::{debug, error, info};

use std::sync::Arc;

/// Pause between loop iterations when nothing was scheduled or drained.
const IDLE_POLL: Duration = Duration::from_millis(10);

/// Owns a run: the live step map, the executor capability, and the
/// coordinating loop. All step and instance state is written here, on the
/// coordinator task; workers only report through the note queue.
pub struct Handler {
    config: Config,
    steps: Steps,
    connections: Arc<Connections>,
    executor: Arc<dyn Executor>,
}

impl Handler {
    /// Build a run from validated configuration. The declared steps are
    /// cloned so the configuration itself stays pristine.
    pub fn new(
        config: Config,
        connections: Arc<Connections>,
        executor: Arc<dyn Executor>,
    ) -> Result<Self, ActionError> {
        let mut steps = config.steps.clone();
        for (name, step) in &mut steps.0 {
            step.resolve_actions(name, &connections)?;
        }
        Ok(Self {
            config,
            steps,
            connections,
            executor,
        })
    }

    pub fn steps(&self) -> &Steps {
        &self.steps
    }

    /// Run the step phase to completion.
    pub async fn run_steps(&mut self) -> Result<(), EngineError> {
        let parallel = effective_parallelism(self.config.parallel);
        let capacity = self.steps.total_instances().max(1);
        let (work_tx, work_rx) = mpsc::channel::<WorkItem>(capacity);
        // Holds every started+finished note, so workers can never block on a
        // full queue while the coordinator is joining them.
        let (note_tx, mut note_rx) = mpsc::channel::<WorkerNote>(capacity * 2);
        let shared_queue = Arc::new(Mutex::new(work_rx));

        info!(parallel, "starting workers");
        let mut workers = Vec::with_capacity(parallel);
        for index in 0..parallel {
            let worker = Worker::new(
                index,
                shared_queue.clone(),
                note_tx.clone(),
                self.executor.clone(),
            );
            workers.push(tokio::spawn(worker.run()));
        }
        drop(note_tx);

        info!("waiting for all work to be scheduled");
        loop {
            let scheduled = self.schedule_ready(&work_tx).await?;
            if self.steps.num_waiting() == 0 {
                break;
            }
            let applied = self.drain_one(&mut note_rx)?;
            if !scheduled && !applied {
                sleep(IDLE_POLL).await;
            }
        }

        // Closing the queue tells workers there is no more work once the
        // remaining items are drained.
        drop(work_tx);
        info!("waiting for all work to be done");
        for handle in workers {
            handle
                .await
                .map_err(|e| EngineError::WorkerFailure(e.to_string()))?;
        }
        // Every worker is gone, so this drains the remaining notes and ends.
        while let Some(note) = note_rx.recv().await {
            self.apply_note(note)?;
        }

        let stragglers = self.steps.non_terminal();
        if !stragglers.is_empty() {
            return Err(EngineError::NonTerminal(stragglers.join(", ")));
        }
        info!("all work is done");
        Ok(())
    }

    /// Run the verification phase; returns the number of failed checks.
    pub async fn run_checks(&self) -> usize {
        check::run_checks(&self.config.checks, &self.connections, &self.executor).await
    }

    /// Schedule every currently ready step. Returns whether anything moved.
    async fn schedule_ready(
        &mut self,
        work_tx: &mpsc::Sender<WorkItem>,
    ) -> Result<bool, EngineError> {
        let ready = self.steps.ready_steps()?;
        let mut moved = false;
        for name in ready {
            moved = true;
            info!(step = %name, "scheduling step");
            let gates = self.steps.get(&name)?.when.clone();
            match self.check_when(&gates) {
                Err(e) => {
                    error!(step = %name, error = %e, "condition check failed, skipping step");
                    self.steps.set_state(&name, StepState::Skipped)?;
                }
                Ok(false) => {
                    info!(step = %name, "condition not met, skipping step");
                    self.steps.set_state(&name, StepState::Skipped)?;
                }
                Ok(true) => {
                    self.steps.set_state(&name, StepState::Ready)?;
                    let step = self.steps.get_mut(&name)?;
                    step.ensure_instances();
                    let items: Vec<WorkItem> = step
                        .instances()
                        .values()
                        .map(|instance| WorkItem {
                            step: name.clone(),
                            instance: instance.key().to_string(),
                            args: instance.args().clone(),
                            actions: instance.actions().to_vec(),
                        })
                        .collect();
                    let empty = items.is_empty();
                    for item in items {
                        // The queue holds every instance of the run, so this
                        // never blocks the coordinator.
                        work_tx
                            .send(item)
                            .await
                            .map_err(|_| EngineError::QueueClosed)?;
                    }
                    self.steps.set_state(&name, StepState::Scheduled)?;
                    if empty {
                        // Zero-size matrix product: no completion will ever
                        // arrive, so the step is done by vacuity.
                        self.steps.set_state(&name, StepState::Done)?;
                    }
                }
            }
        }
        Ok(moved)
    }

    /// Evaluate a step's conditional gates against completed-step results.
    fn check_when(&self, gates: &[String]) -> Result<bool, EvalError> {
        if gates.is_empty() {
            return Ok(true);
        }
        let snapshot = self.snapshot();
        for source in gates {
            if !evaluate(source, &snapshot)? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Read-only view of every step that already reached a terminal state.
    fn snapshot(&self) -> RunSnapshot {
        let mut snapshot = RunSnapshot::default();
        for (name, step) in &self.steps.0 {
            if !step.state().is_terminal() {
                continue;
            }
            snapshot.steps.insert(
                name.clone(),
                StepSnapshot {
                    state: step.state().to_string().to_lowercase(),
                    rc: step.rc(),
                    stdout: step.stdout().join("\n"),
                    stderr: step.stderr().join("\n"),
                },
            );
        }
        snapshot
    }

    /// Apply at most one pending worker note without blocking.
    fn drain_one(&mut self, note_rx: &mut mpsc::Receiver<WorkerNote>) -> Result<bool, EngineError> {
        match note_rx.try_recv() {
            Ok(note) => {
                self.apply_note(note)?;
                Ok(true)
            }
            Err(_) => Ok(false),
        }
    }

    fn apply_note(&mut self, note: WorkerNote) -> Result<(), EngineError> {
        match note {
            WorkerNote::Started { step, instance } => {
                debug!(step = %step, instance = %instance, "instance running");
                // Running is written here on the coordinator, never by the
                // worker itself. Repeats are legal same-state moves.
                self.steps.set_state(&step, StepState::Running)
            }
            WorkerNote::Finished {
                step,
                instance,
                outcomes,
            } => {
                debug!(step = %step, instance = %instance, "instance completed");
                let entry = self.steps.get_mut(&step)?;
                match entry.instance_mut(&instance) {
                    Some(found) => found.complete(outcomes),
                    None => {
                        return Err(EngineError::UnknownInstance { step, instance });
                    }
                }
                // Done is re-derived from the instances on every completion
                // instead of counting, so a stray duplicate can never drift
                // the count.
                if entry.all_instances_done() {
                    self.steps.set_state(&step, StepState::Done)?;
                }
                Ok(())
            }
        }
    }
}
