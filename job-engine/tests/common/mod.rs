// Shared test support: a scripted executor that records what ran and when.

use job_engine::{
    Action, ActionOutcome, Command, Config, Connections, Executor, Handler, InstanceArgs, Step,
};

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// One recorded action execution.
#[derive(Debug, Clone)]
pub struct ExecEvent {
    pub action: String,
    pub instance: String,
    pub started: Instant,
    pub finished: Instant,
}

/// Executor double: sleeps a bit, returns scripted return codes, and records
/// start/finish timestamps plus the peak number of concurrent executions.
#[derive(Default)]
pub struct FakeExecutor {
    delay: Duration,
    rcs: HashMap<String, i32>,
    events: Mutex<Vec<ExecEvent>>,
    running: AtomicUsize,
    max_running: AtomicUsize,
}

impl FakeExecutor {
    pub fn new() -> Self {
        Self {
            delay: Duration::from_millis(20),
            ..Self::default()
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Script a return code for every action with this name.
    pub fn failing(mut self, action: &str, rc: i32) -> Self {
        self.rcs.insert(action.to_string(), rc);
        self
    }

    pub fn events(&self) -> Vec<ExecEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn events_for(&self, action: &str) -> Vec<ExecEvent> {
        self.events()
            .into_iter()
            .filter(|event| event.action == action)
            .collect()
    }

    pub fn max_concurrency(&self) -> usize {
        self.max_running.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl Executor for FakeExecutor {
    async fn execute(&self, action: &Action, args: &InstanceArgs) -> ActionOutcome {
        let started = Instant::now();
        let now_running = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_running.fetch_max(now_running, Ordering::SeqCst);

        tokio::time::sleep(self.delay).await;

        self.running.fetch_sub(1, Ordering::SeqCst);
        self.events.lock().unwrap().push(ExecEvent {
            action: action.name().to_string(),
            instance: args.key(),
            started,
            finished: Instant::now(),
        });

        let rc = self.rcs.get(action.name()).copied().unwrap_or(0);
        ActionOutcome {
            rc,
            stdout: vec![format!("ran {}", action.name())],
            stderr: Vec::new(),
            error: (rc != 0).then(|| format!("{} exited with {}", action.name(), rc)),
        }
    }
}

/// A step with one named shell command, so the executor double can key its
/// script and its event log off the action name.
pub fn step(action_name: &str, depends: &[&str]) -> Step {
    Step {
        commands: vec![Command {
            name: action_name.to_string(),
            kind: "shell".to_string(),
            inline: "true".to_string(),
            ..Command::default()
        }],
        depends: depends.iter().map(|d| d.to_string()).collect(),
        ..Step::default()
    }
}

pub fn config(steps: Vec<(&str, Step)>, parallel: usize) -> Config {
    let mut config = Config::default();
    for (name, step) in steps {
        config.steps.0.insert(name.to_string(), step);
    }
    config.parallel = parallel;
    config
}

pub fn handler(config: Config, executor: Arc<FakeExecutor>) -> Handler {
    Handler::new(config, Arc::new(Connections::default()), executor).expect("steps resolve")
}
