// Conditional gates: skips, malformed expressions, snapshot visibility.

mod common;

use common::{config, handler, step, FakeExecutor};
use job_engine::StepState;

use std::sync::Arc;

#[tokio::test]
async fn a_false_condition_skips_the_step_but_satisfies_dependents() {
    let executor = Arc::new(FakeExecutor::new());
    let mut gated = step("gated", &["first"]);
    gated.when = vec!["steps.first.rc != 0".to_string()];

    let mut run = handler(
        config(
            vec![
                ("first", step("first", &[])),
                ("gated", gated),
                ("last", step("last", &["gated"])),
            ],
            2,
        ),
        executor.clone(),
    );
    run.run_steps().await.unwrap();

    assert_eq!(run.steps().get("gated").unwrap().state(), StepState::Skipped);
    assert_eq!(run.steps().get("last").unwrap().state(), StepState::Done);
    assert!(executor.events_for("gated").is_empty());
    assert_eq!(executor.events_for("last").len(), 1);
}

#[tokio::test]
async fn a_malformed_condition_skips_only_its_own_step() {
    let executor = Arc::new(FakeExecutor::new());
    let mut broken = step("broken", &[]);
    broken.when = vec!["steps.broken.rc ==".to_string()];

    let mut run = handler(
        config(
            vec![("broken", broken), ("healthy", step("healthy", &[]))],
            2,
        ),
        executor.clone(),
    );
    run.run_steps().await.unwrap();

    assert_eq!(
        run.steps().get("broken").unwrap().state(),
        StepState::Skipped
    );
    assert_eq!(
        run.steps().get("healthy").unwrap().state(),
        StepState::Done
    );
}

#[tokio::test]
async fn an_unknown_reference_counts_as_malformed() {
    let executor = Arc::new(FakeExecutor::new());
    let mut gated = step("gated", &[]);
    gated.when = vec!["steps.ghost.rc == 0".to_string()];

    let mut run = handler(config(vec![("gated", gated)], 1), executor.clone());
    run.run_steps().await.unwrap();

    assert_eq!(run.steps().get("gated").unwrap().state(), StepState::Skipped);
}

#[tokio::test]
async fn conditions_see_completed_step_output() {
    let executor = Arc::new(FakeExecutor::new());
    let mut gated = step("gated", &["probe"]);
    // The executor double prints "ran <action>" for every action.
    gated.when = vec!["steps.probe.stdout contains 'ran probe'".to_string()];

    let mut run = handler(
        config(vec![("probe", step("probe", &[])), ("gated", gated)], 2),
        executor.clone(),
    );
    run.run_steps().await.unwrap();

    assert_eq!(run.steps().get("gated").unwrap().state(), StepState::Done);
    assert_eq!(executor.events_for("gated").len(), 1);
}

#[tokio::test]
async fn every_gate_must_hold() {
    let executor = Arc::new(FakeExecutor::new());
    let mut gated = step("gated", &["probe"]);
    gated.when = vec![
        "steps.probe.rc == 0".to_string(),
        "steps.probe.stdout contains 'no such line'".to_string(),
    ];

    let mut run = handler(
        config(vec![("probe", step("probe", &[])), ("gated", gated)], 2),
        executor.clone(),
    );
    run.run_steps().await.unwrap();

    assert_eq!(run.steps().get("gated").unwrap().state(), StepState::Skipped);
}
