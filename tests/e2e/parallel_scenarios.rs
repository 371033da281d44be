//! The same canonical behaviors, exercised through the worker-pool variant:
//! several stories in flight across workers, each still following its own
//! ordered four-step execution and observing the pool-wide `PauseController`.

use crate::helpers::{story, MockClaude, Recorder};
use serial_test::serial;
use std::sync::Arc;
use std::time::Duration;
use storyweave::engine::{EngineConfig, ParallelExecutor};
use storyweave::models::{ExecutionStatus, StepStatus};

#[test]
#[serial]
fn several_stories_complete_independently_across_worker_threads() {
    let _mock = MockClaude::succeeds();
    let config = EngineConfig {
        retries: 0,
        timeout_secs: 5,
        max_workers: 3,
        ..EngineConfig::default()
    };
    let pool = Arc::new(ParallelExecutor::new(config, Recorder::new()));
    pool.start();

    for key in ["3-1-a", "3-1-b", "3-1-c"] {
        pool.submit(story(key, false));
    }

    let mut seen = Vec::new();
    for _ in 0..3 {
        let result = pool
            .recv_result_timeout(Duration::from_secs(5))
            .expect("every submitted job eventually reports a result");
        assert_eq!(result.execution.status, ExecutionStatus::Completed);
        for step in &result.execution.steps {
            assert_eq!(step.status, StepStatus::Success);
        }
        seen.push(result.key);
    }
    seen.sort();
    assert_eq!(seen, vec!["3-1-a", "3-1-b", "3-1-c"]);

    let (completed, failed, total) = pool.get_progress();
    assert_eq!(completed, 3);
    assert_eq!(failed, 0);
    assert_eq!(total, 3);

    pool.shutdown();
}

#[test]
#[serial]
fn cancelling_the_pool_stops_jobs_not_yet_dequeued_but_lets_in_flight_jobs_report() {
    let _mock = MockClaude::install("sleep 0.3\nexit 0");
    let config = EngineConfig {
        retries: 0,
        timeout_secs: 5,
        max_workers: 1,
        ..EngineConfig::default()
    };
    let pool = Arc::new(ParallelExecutor::new(config, Recorder::new()));
    pool.start();

    pool.submit(story("3-2-in-flight", true));
    // Give the single worker a moment to actually dequeue and start the first job
    // before the rest are queued up behind it and the cancel lands.
    std::thread::sleep(Duration::from_millis(50));
    pool.cancel();
    pool.submit(story("3-2-never-starts", true));

    let first = pool
        .recv_result_timeout(Duration::from_secs(5))
        .expect("the already-dequeued job still reports its own (cancelled) result");
    assert_eq!(first.key, "3-2-in-flight");
    assert_eq!(first.execution.status, ExecutionStatus::Cancelled);

    let second = pool.recv_result_timeout(Duration::from_millis(500));
    assert!(second.is_none(), "the never-dequeued job must not run at all");

    pool.shutdown();
}

#[test]
#[serial]
fn pausing_the_pool_holds_a_job_a_free_worker_dequeues_after_the_pause() {
    let _mock = MockClaude::install("sleep 0.08\nexit 0");
    let config = EngineConfig {
        retries: 0,
        timeout_secs: 5,
        max_workers: 2,
        ..EngineConfig::default()
    };
    let pool = Arc::new(ParallelExecutor::new(config, Recorder::new()));
    pool.start();

    pool.submit(story("3-4-already-running", true));
    // Give one worker time to dequeue and begin the first job before pausing.
    std::thread::sleep(Duration::from_millis(50));
    pool.pause();

    // Submitted only now, with the pool already paused: the other (still idle)
    // worker dequeues this one fresh. It must hold at its very first step
    // boundary rather than resetting the pool-wide controller its own Executor
    // shares with the worker still running the first job.
    pool.submit(story("3-4-dequeued-after-pause", true));

    let stuck = pool.recv_result_timeout(Duration::from_millis(400));
    assert!(
        stuck.is_none(),
        "neither job should complete while the pool is paused, including the one \
         dequeued by a worker that only just picked it up"
    );

    pool.resume();

    let first = pool
        .recv_result_timeout(Duration::from_secs(5))
        .expect("first job completes once resumed");
    let second = pool
        .recv_result_timeout(Duration::from_secs(5))
        .expect("second job completes once resumed");

    let mut keys = vec![first.key, second.key];
    keys.sort();
    assert_eq!(
        keys,
        vec!["3-4-already-running", "3-4-dequeued-after-pause"]
    );

    pool.shutdown();
}
