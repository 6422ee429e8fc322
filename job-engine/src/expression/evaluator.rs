// Condition Evaluator
// Evaluates parsed conditions against a run snapshot

use crate::expression::context::RunSnapshot;
use crate::expression::lexer::{LexError, Lexer};
use crate::expression::parser::{BinaryOp, Expr, ParseError, Parser};

use thiserror::Error;

use std::fmt;

/// Evaluation error; a malformed condition skips its step but never aborts
/// the run.
#[derive(Debug, Error)]
pub enum EvalError {
    #[error(transparent)]
    Lex(#[from] LexError),
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error("unknown reference '{0}'")]
    UnknownReference(String),
    #[error("operator '{op}' needs numeric operands, got {left} and {right}")]
    NotNumeric {
        op: BinaryOp,
        left: String,
        right: String,
    },
    #[error("expected a boolean, got {0}")]
    NotBoolean(String),
}

/// Value produced while evaluating a condition.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Number(f64),
    Str(String),
}

impl Value {
    fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            Value::Str(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, ""),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Number(n) => write!(f, "{}", n),
            Value::Str(s) => write!(f, "{}", s),
        }
    }
}

/// Evaluate one condition source string to a boolean.
pub fn evaluate(source: &str, snapshot: &RunSnapshot) -> Result<bool, EvalError> {
    let tokens = Lexer::tokenize(source)?;
    let expr = Parser::parse(tokens)?;
    let value = eval(&expr, snapshot)?;
    value
        .as_bool()
        .ok_or_else(|| EvalError::NotBoolean(value.to_string()))
}

fn eval(expr: &Expr, snapshot: &RunSnapshot) -> Result<Value, EvalError> {
    match expr {
        Expr::Literal(value) => Ok(value.clone()),
        Expr::Reference(path) => snapshot
            .resolve(path)
            .ok_or_else(|| EvalError::UnknownReference(path.join("."))),
        Expr::Not(inner) => {
            let value = eval(inner, snapshot)?;
            let b = value
                .as_bool()
                .ok_or_else(|| EvalError::NotBoolean(value.to_string()))?;
            Ok(Value::Bool(!b))
        }
        Expr::Binary { op, left, right } => match op {
            BinaryOp::And | BinaryOp::Or => {
                let lhs = eval(left, snapshot)?;
                let lhs = lhs
                    .as_bool()
                    .ok_or_else(|| EvalError::NotBoolean(lhs.to_string()))?;
                // Short circuit so the right side never evaluates when the
                // left side already decides.
                match (op, lhs) {
                    (BinaryOp::And, false) => return Ok(Value::Bool(false)),
                    (BinaryOp::Or, true) => return Ok(Value::Bool(true)),
                    _ => {}
                }
                let rhs = eval(right, snapshot)?;
                let rhs = rhs
                    .as_bool()
                    .ok_or_else(|| EvalError::NotBoolean(rhs.to_string()))?;
                Ok(Value::Bool(rhs))
            }
            BinaryOp::Eq => Ok(Value::Bool(loose_eq(
                &eval(left, snapshot)?,
                &eval(right, snapshot)?,
            ))),
            BinaryOp::Ne => Ok(Value::Bool(!loose_eq(
                &eval(left, snapshot)?,
                &eval(right, snapshot)?,
            ))),
            BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => {
                let lhs = eval(left, snapshot)?;
                let rhs = eval(right, snapshot)?;
                let (Some(l), Some(r)) = (lhs.as_number(), rhs.as_number()) else {
                    return Err(EvalError::NotNumeric {
                        op: *op,
                        left: lhs.to_string(),
                        right: rhs.to_string(),
                    });
                };
                Ok(Value::Bool(match op {
                    BinaryOp::Lt => l < r,
                    BinaryOp::Le => l <= r,
                    BinaryOp::Gt => l > r,
                    _ => l >= r,
                }))
            }
            BinaryOp::Contains => {
                let haystack = eval(left, snapshot)?.to_string();
                let needle = eval(right, snapshot)?.to_string();
                Ok(Value::Bool(haystack.contains(&needle)))
            }
        },
    }
}

/// Equality is numeric when both sides look numeric, textual otherwise.
fn loose_eq(left: &Value, right: &Value) -> bool {
    if let (Some(l), Some(r)) = (left.as_number(), right.as_number()) {
        return l == r;
    }
    left.to_string() == right.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expression::context::StepSnapshot;

    fn snapshot() -> RunSnapshot {
        let mut ctx = RunSnapshot::default();
        ctx.steps.insert(
            "resync".to_string(),
            StepSnapshot {
                state: "done".to_string(),
                rc: 0,
                stdout: "42 rows resynced\nall shards in sync".to_string(),
                stderr: String::new(),
            },
        );
        ctx.steps.insert(
            "audit".to_string(),
            StepSnapshot {
                state: "done".to_string(),
                rc: 3,
                stdout: String::new(),
                stderr: "3 mismatches".to_string(),
            },
        );
        ctx
    }

    fn check(source: &str) -> bool {
        evaluate(source, &snapshot()).unwrap()
    }

    #[test]
    fn equality_is_numeric_when_possible() {
        assert!(check("steps.resync.rc == 0"));
        assert!(check("steps.audit.rc != 0"));
        assert!(check("steps.resync.state == 'done'"));
    }

    #[test]
    fn numeric_comparisons() {
        assert!(check("steps.audit.rc > 0"));
        assert!(check("steps.audit.rc >= 3"));
        assert!(check("steps.resync.rc <= 0"));
        assert!(!check("steps.audit.rc < 3"));
    }

    #[test]
    fn contains_matches_substrings() {
        assert!(check("steps.resync.stdout contains 'in sync'"));
        assert!(!check("steps.resync.stdout contains 'replica lost'"));
        assert!(check("steps.audit.stderr contains 'mismatch'"));
    }

    #[test]
    fn boolean_connectives_and_grouping() {
        assert!(check("steps.resync.rc == 0 && steps.audit.rc == 3"));
        assert!(check("steps.resync.rc == 1 || steps.audit.rc == 3"));
        assert!(check("not (steps.resync.rc == 1)"));
        assert!(check("(steps.resync.rc == 1 or true) and steps.audit.rc >= 0"));
    }

    #[test]
    fn short_circuit_skips_the_right_side() {
        // The right side references an unknown step; it must never evaluate.
        assert!(!evaluate("false && steps.ghost.rc == 0", &snapshot()).unwrap());
        assert!(evaluate("true || steps.ghost.rc == 0", &snapshot()).unwrap());
    }

    #[test]
    fn unknown_references_are_errors() {
        assert!(matches!(
            evaluate("steps.ghost.rc == 0", &snapshot()),
            Err(EvalError::UnknownReference(path)) if path == "steps.ghost.rc"
        ));
    }

    #[test]
    fn non_boolean_results_are_errors() {
        assert!(matches!(
            evaluate("steps.resync.rc", &snapshot()),
            Err(EvalError::NotBoolean(_))
        ));
    }

    #[test]
    fn malformed_expressions_are_errors_not_panics() {
        assert!(evaluate("steps..rc == 0", &snapshot()).is_err());
        assert!(evaluate("== 0", &snapshot()).is_err());
        assert!(evaluate("steps.resync.rc ==", &snapshot()).is_err());
    }

    #[test]
    fn ordering_on_text_is_an_error() {
        assert!(matches!(
            evaluate("steps.resync.stdout > 1", &snapshot()),
            Err(EvalError::NotNumeric { .. })
        ));
    }
}
