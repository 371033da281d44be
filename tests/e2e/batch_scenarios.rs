//! Scenarios 1-5 from the canonical scenario table, run through `BatchExecutor`
//! with a single queued story (batch machinery wraps one `Executor`, so these
//! also cover the single-story path end to end).

use crate::helpers::{fast_config, story, MockClaude, Recorder};
use serial_test::serial;
use std::sync::Arc;
use std::time::{Duration, Instant};
use storyweave::engine::{BatchExecutor, EngineConfig, EngineEvent};
use storyweave::models::{ExecutionStatus, StepStatus};

/// Scenario 1: happy path, single story, every step succeeds on the first try.
#[test]
#[serial]
fn happy_path_runs_all_four_steps_to_completion() {
    let _mock = MockClaude::succeeds();
    let recorder = Recorder::new();
    let batch = Arc::new(BatchExecutor::new(fast_config(), recorder.clone()));
    batch.add_to_queue(story("2-1-happy-path", false));

    let outcome = batch.start().expect("queue had pending work");
    assert_eq!(outcome.total, 1);
    assert_eq!(outcome.success, 1);
    assert_eq!(outcome.failed, 0);

    let queue = batch.get_queue();
    let execution = queue.items[0].execution.as_ref().expect("ran to completion");
    assert_eq!(execution.status, ExecutionStatus::Completed);
    assert_eq!(execution.current, 3);
    for step in &execution.steps {
        assert_eq!(step.status, StepStatus::Success);
    }

    assert!(matches!(
        recorder.events().first(),
        Some(EngineEvent::ExecutionStarted { .. })
    ));
}

/// Scenario 2: `file_exists: true` auto-skips `CreateStory` without a `StepStarted`
/// for it, and the remaining three steps proceed normally.
#[test]
#[serial]
fn an_existing_story_file_auto_skips_create_story() {
    let _mock = MockClaude::succeeds();
    let recorder = Recorder::new();
    let batch = Arc::new(BatchExecutor::new(fast_config(), recorder.clone()));
    batch.add_to_queue(story("2-2-auto-skip", true));

    batch.start();

    let queue = batch.get_queue();
    let execution = queue.items[0].execution.as_ref().unwrap();
    assert_eq!(execution.steps[0].status, StepStatus::Skipped);
    assert_eq!(execution.steps[1].status, StepStatus::Success);

    let step_zero_started = recorder.events().into_iter().any(|event| {
        matches!(
            event,
            EngineEvent::StepStarted { step_index: 0, .. }
        )
    });
    assert!(!step_zero_started);
}

/// Scenario 3: the child fails once then succeeds; exactly one retry happens and
/// the step ends `Success`, never `Failed`.
#[test]
#[serial]
fn a_transient_failure_is_retried_into_success() {
    let dir = tempfile::tempdir().unwrap();
    let _mock = MockClaude::fails_then_succeeds(2, dir.path());
    let recorder = Recorder::new();
    let config = EngineConfig {
        retries: 1,
        timeout_secs: 5,
        ..EngineConfig::default()
    };
    let batch = Arc::new(BatchExecutor::new(config, recorder.clone()));
    batch.add_to_queue(story("2-3-retry-then-success", true));

    batch.start();

    let queue = batch.get_queue();
    let execution = queue.items[0].execution.as_ref().unwrap();
    assert_eq!(execution.steps[1].status, StepStatus::Success);

    let retry_notice = recorder.events().into_iter().any(|event| {
        matches!(
            event,
            EngineEvent::StepOutput { step_index: 1, is_stderr: true, line }
                if line.contains("Retrying in 2 seconds (attempt 2/2)")
        )
    });
    assert!(retry_notice);

    let failed_completions = recorder
        .events()
        .into_iter()
        .filter(|event| {
            matches!(
                event,
                EngineEvent::StepCompleted {
                    step_index: 1,
                    status: StepStatus::Failed,
                    ..
                }
            )
        })
        .count();
    assert_eq!(failed_completions, 0);
}

/// Scenario 4: the child fails on every attempt; the step ends `Failed`, and
/// later steps never start.
#[test]
#[serial]
fn a_permanent_failure_stops_the_execution_before_later_steps() {
    let _mock = MockClaude::fails(1);
    let recorder = Recorder::new();
    let config = EngineConfig {
        retries: 1,
        timeout_secs: 5,
        ..EngineConfig::default()
    };
    let batch = Arc::new(BatchExecutor::new(config, recorder.clone()));
    batch.add_to_queue(story("2-4-permanent-failure", true));

    batch.start();

    let queue = batch.get_queue();
    let execution = queue.items[0].execution.as_ref().unwrap();
    assert_eq!(execution.status, ExecutionStatus::Failed);
    assert_eq!(execution.steps[1].status, StepStatus::Failed);
    assert_eq!(execution.steps[2].status, StepStatus::Pending);
    assert_eq!(execution.steps[3].status, StepStatus::Pending);
}

/// Scenario 5: pausing at a step boundary, then cancelling shortly after, ends the
/// execution `Cancelled` promptly -- the `PauseController`'s cancel wakes a parked
/// waiter immediately rather than waiting out the poll interval.
#[test]
#[serial]
fn cancel_while_paused_at_a_step_boundary_ends_the_run_cancelled_promptly() {
    // Each step takes long enough to give a wide, reliable window to land the
    // pause on a step boundary rather than mid-attempt.
    let _mock = MockClaude::install("sleep 0.3\nexit 0");
    let recorder = Recorder::new();
    let config = EngineConfig {
        retries: 0,
        timeout_secs: 5,
        ..EngineConfig::default()
    };
    let batch = Arc::new(BatchExecutor::new(config, recorder.clone()));
    batch.add_to_queue(story("2-5-cancel-during-pause", true));

    let controller = Arc::clone(&batch);
    let control_thread = std::thread::spawn(move || {
        std::thread::sleep(Duration::from_millis(350));
        controller.pause();
        std::thread::sleep(Duration::from_millis(50));
        let cancel_sent_at = Instant::now();
        controller.cancel();
        cancel_sent_at
    });

    batch.start();
    let cancel_sent_at = control_thread.join().unwrap();

    let queue = batch.get_queue();
    assert_eq!(queue.status, storyweave::models::QueueStatus::Idle);

    // `cancel()` itself is synchronous (just flag-setting), so by the time
    // `batch.start()` has returned the whole run is long since wound down; the
    // real assertion is that it wound down promptly rather than running the
    // remaining steps to completion.
    assert!(cancel_sent_at.elapsed() < Duration::from_secs(2));
}
