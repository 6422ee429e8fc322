// Condition Context
// Read-only snapshot of completed steps for condition evaluation

use crate::expression::evaluator::Value;

use std::collections::HashMap;

/// What a condition can see of one completed step.
#[derive(Debug, Clone, Default)]
pub struct StepSnapshot {
    /// Terminal state, lowercased ("done" or "skipped").
    pub state: String,
    /// Aggregate return code.
    pub rc: i32,
    /// Captured standard output, joined with newlines.
    pub stdout: String,
    /// Captured standard error, joined with newlines.
    pub stderr: String,
}

/// Immutable view of the run handed to the condition evaluator. Only steps
/// that already reached a terminal state appear here.
#[derive(Debug, Clone, Default)]
pub struct RunSnapshot {
    pub steps: HashMap<String, StepSnapshot>,
}

impl RunSnapshot {
    /// Resolve a dotted reference (`steps.<name>.<field>`).
    pub fn resolve(&self, path: &[String]) -> Option<Value> {
        match path {
            [root, name, field] if root == "steps" => {
                let step = self.steps.get(name)?;
                match field.as_str() {
                    "state" => Some(Value::Str(step.state.clone())),
                    "rc" => Some(Value::Number(step.rc as f64)),
                    "stdout" => Some(Value::Str(step.stdout.clone())),
                    "stderr" => Some(Value::Str(step.stderr.clone())),
                    _ => None,
                }
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot() -> RunSnapshot {
        let mut steps = HashMap::new();
        steps.insert(
            "resync".to_string(),
            StepSnapshot {
                state: "done".to_string(),
                rc: 0,
                stdout: "42 rows".to_string(),
                stderr: String::new(),
            },
        );
        RunSnapshot { steps }
    }

    fn path(parts: &[&str]) -> Vec<String> {
        parts.iter().map(|p| p.to_string()).collect()
    }

    #[test]
    fn resolves_known_fields() {
        let ctx = snapshot();
        assert_eq!(
            ctx.resolve(&path(&["steps", "resync", "rc"])),
            Some(Value::Number(0.0))
        );
        assert_eq!(
            ctx.resolve(&path(&["steps", "resync", "state"])),
            Some(Value::Str("done".into()))
        );
    }

    #[test]
    fn unknown_steps_and_fields_resolve_to_nothing() {
        let ctx = snapshot();
        assert!(ctx.resolve(&path(&["steps", "ghost", "rc"])).is_none());
        assert!(ctx.resolve(&path(&["steps", "resync", "pid"])).is_none());
        assert!(ctx.resolve(&path(&["vars", "resync", "rc"])).is_none());
        assert!(ctx.resolve(&path(&["resync"])).is_none());
    }
}
