// Worker Pool
// Fixed workers pulling instance work from a shared queue

use crate::executor::Executor;
use crate::jobs::action::Action;
use crate::jobs::matrix::InstanceArgs;
use crate::jobs::outcome::ActionOutcome;

use tokio::sync::{mpsc, Mutex};
use tracing::{debug, warn};

use std::sync::Arc;

/// Unit of work handed from the coordinator to a worker: one instance of one
/// step, carrying the instance's owned argument binding and action sequence.
#[derive(Debug, Clone)]
pub struct WorkItem {
    pub step: String,
    pub instance: String,
    pub args: InstanceArgs,
    pub actions: Vec<Action>,
}

/// Notifications workers push back to the coordinator. Workers never touch
/// step or instance state themselves; the coordinator applies these.
#[derive(Debug)]
pub enum WorkerNote {
    /// A worker picked the item up and is executing it.
    Started { step: String, instance: String },
    /// Exactly one per work item, success or failure.
    Finished {
        step: String,
        instance: String,
        outcomes: Vec<ActionOutcome>,
    },
}

/// The work queue receiver, shared by all workers.
pub type SharedWorkQueue = Arc<Mutex<mpsc::Receiver<WorkItem>>>;

/// Resolve the configured parallelism; 0 means one worker per available
/// processing unit.
pub fn effective_parallelism(configured: usize) -> usize {
    if configured > 0 {
        configured
    } else {
        std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1)
    }
}

pub struct Worker {
    index: usize,
    queue: SharedWorkQueue,
    notes: mpsc::Sender<WorkerNote>,
    executor: Arc<dyn Executor>,
}

impl Worker {
    pub fn new(
        index: usize,
        queue: SharedWorkQueue,
        notes: mpsc::Sender<WorkerNote>,
        executor: Arc<dyn Executor>,
    ) -> Self {
        Self {
            index,
            queue,
            notes,
            executor,
        }
    }

    /// Pull work until the queue is closed and drained, then exit.
    pub async fn run(self) {
        loop {
            let item = { self.queue.lock().await.recv().await };
            let Some(item) = item else { break };

            debug!(
                worker = self.index,
                step = %item.step,
                instance = %item.instance,
                "executing instance"
            );
            let started = WorkerNote::Started {
                step: item.step.clone(),
                instance: item.instance.clone(),
            };
            if self.notes.send(started).await.is_err() {
                // Coordinator is gone; nothing sensible left to do.
                return;
            }

            let outcomes = self.run_actions(&item).await;
            let finished = WorkerNote::Finished {
                step: item.step,
                instance: item.instance,
                outcomes,
            };
            if self.notes.send(finished).await.is_err() {
                return;
            }
        }
        debug!(worker = self.index, "worker done");
    }

    /// Run the owned action sequence in declared order, stopping at the
    /// first failure. Later actions of this instance are skipped; nothing
    /// else is affected.
    async fn run_actions(&self, item: &WorkItem) -> Vec<ActionOutcome> {
        let mut outcomes = Vec::with_capacity(item.actions.len());
        for (index, action) in item.actions.iter().enumerate() {
            let outcome = self.executor.execute(action, &item.args).await;
            let failed = outcome.failed();
            outcomes.push(outcome);
            if failed {
                let skipped = item.actions.len() - index - 1;
                warn!(
                    step = %item.step,
                    instance = %item.instance,
                    action = action.name(),
                    skipped,
                    "action failed, abandoning the rest of the sequence"
                );
                break;
            }
        }
        outcomes
    }
}
