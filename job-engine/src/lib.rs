// Job Engine Library
// Core engine for jobforge: step graphs, matrix instances, bounded workers

pub mod config;
pub mod db;
pub mod executor;
pub mod expression;
pub mod jobs;
pub mod runners;

// Re-export commonly used types
pub use config::{parse_duration, Config, ConfigError, GitConfig};

// Re-export engine types
pub use jobs::{
    Action, ActionError, ActionOutcome, Check, CheckFailure, Command, EngineError, Handler,
    Instance, InstanceArgs, MatrixArgs, Step, StepState, Steps,
};

// Re-export expression types
pub use expression::{evaluate, EvalError, RunSnapshot, StepSnapshot};

// Re-export executor and runner types
pub use executor::{Executor, TargetExecutor};
pub use runners::{ShellRunner, StatementRunner};

// Re-export database boundary types
pub use db::{ClusterLock, Conn, Connections, DbError, Dsn, LockConfig, LockError, Role};
