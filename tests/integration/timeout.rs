use crate::helpers::{story, MockClaude, Recorder};
use serial_test::serial;
use std::sync::Arc;
use storyweave::engine::{EngineConfig, EngineEvent, Executor};
use storyweave::models::{ExecutionStatus, StepStatus};

#[test]
#[serial]
fn a_step_that_outlives_its_timeout_is_killed_and_reported() {
    let _mock = MockClaude::hangs();
    let recorder = Recorder::new();
    let config = EngineConfig {
        retries: 0,
        timeout_secs: 1,
        ..EngineConfig::default()
    };
    let executor = Arc::new(Executor::new(config, recorder.clone()));

    let start = std::time::Instant::now();
    let execution = executor.execute(story("1-6-timeout", true));
    // Loose upper bound: the child is killed promptly after the 1s deadline, not
    // left to run out its full 600s sleep.
    assert!(start.elapsed() < std::time::Duration::from_secs(10));

    assert_eq!(execution.status, ExecutionStatus::Failed);
    assert_eq!(execution.steps[1].status, StepStatus::Failed);
    assert_eq!(execution.steps[1].error.as_deref(), Some("timeout after 1s"));

    assert!(matches!(
        recorder.events().last(),
        Some(EngineEvent::ExecutionCompleted {
            status: ExecutionStatus::Failed,
            ..
        })
    ));
}
