// Statement Runner
// Executes statement actions against named connections

use crate::db::Connections;
use crate::jobs::action::{Source, StatementAction};
use crate::jobs::matrix::InstanceArgs;
use crate::jobs::outcome::ActionOutcome;

use tracing::debug;

use std::sync::Arc;

/// Runs statement actions through the connection registry. Argument binding
/// happens here (named tokens become positional placeholders); serializing
/// access to a shared session is the connection's job.
pub struct StatementRunner {
    connections: Arc<Connections>,
}

impl StatementRunner {
    pub fn new(connections: Arc<Connections>) -> Self {
        Self { connections }
    }

    pub async fn run(&self, action: &StatementAction, args: &InstanceArgs) -> ActionOutcome {
        debug!(action = %action.name, connection = %action.connection, "running statement action");

        let body = match &action.source {
            Source::Inline(body) => body.clone(),
            Source::File(path) => match tokio::fs::read_to_string(path).await {
                Ok(body) => body,
                Err(e) => {
                    return ActionOutcome::failure(
                        1,
                        format!("cannot read statement file {}: {}", path.display(), e),
                    )
                }
            },
        };

        let conn = match self.connections.get(&action.connection) {
            Ok(conn) => conn,
            Err(e) => return ActionOutcome::failure(1, e.to_string()),
        };

        // A declared per-action role is re-checked at execution time; a
        // failover between pre-flight and now must fail the action, not run
        // it against the wrong role.
        if let Some(expected) = action.role {
            match conn.observed_role(&action.connection).await {
                Ok(actual) if actual != expected => {
                    return ActionOutcome::failure(
                        1,
                        format!(
                            "action {} needs role {} but {} is {}",
                            action.name, expected, action.connection, actual
                        ),
                    );
                }
                Err(e) => return ActionOutcome::failure(1, e.to_string()),
                Ok(_) => {}
            }
        }

        let statements: Vec<&str> = if action.batch_mode {
            body.split(';')
                .map(str::trim)
                .filter(|stmt| !stmt.is_empty())
                .collect()
        } else {
            vec![body.as_str()]
        };

        let mut lines = Vec::new();
        for statement in statements {
            let (query, params) = args.bind_query(statement);
            match conn.query_all(&query, &params).await {
                Ok(rows) => lines.extend(rows),
                Err(e) => {
                    return ActionOutcome {
                        rc: 1,
                        stdout: lines,
                        stderr: vec![e.to_string()],
                        error: Some(format!("statement action {} failed: {}", action.name, e)),
                    }
                }
            }
        }
        ActionOutcome::success(lines)
    }
}
